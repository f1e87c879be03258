// Copyright (c) Contributors to the winsshfs project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/winsshfs/winsshfs

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use rstest::rstest;

use super::build_mount_command;
use crate::mount::{AuthMethod, MountRequest};

fn password_request() -> MountRequest {
    MountRequest {
        user: "bob".into(),
        host: "h".into(),
        folder: "/x".into(),
        mount_point: "Z:".into(),
        port: 22,
        name: "Share".into(),
        auth: AuthMethod::Password("p".into()),
    }
}

#[rstest]
fn test_password_argument_vector() {
    let command = build_mount_command(Path::new("sshfs-win.exe"), &password_request());

    assert_eq!(command.executable, OsString::from("sshfs-win.exe"));
    let expected: Vec<OsString> = vec![
        "bob@h:/x".into(),
        "Z:".into(),
        "-p22".into(),
        "-oidmap=user".into(),
        "-ouid=-1".into(),
        "-ogid=-1".into(),
        "-oumask=000".into(),
        "-ocreate_umask=000".into(),
        "-ovolname=Share".into(),
        "-omax_readahead=1GB".into(),
        "-oStrictHostKeyChecking=no".into(),
        "-oUserKnownHostsFile=/dev/null".into(),
        "-oallow_other".into(),
        "-olarge_read".into(),
        "-okernel_cache".into(),
        "-oPreferredAuthentications=password".into(),
        "-opassword_stdin".into(),
    ];
    assert_eq!(command.args, expected);
}

#[rstest]
fn test_password_never_appears_in_arguments() {
    let command = build_mount_command(Path::new("sshfs-win.exe"), &password_request());
    // the secret travels over stdin, not the command line
    assert!(!command.args.iter().any(|arg| arg.to_string_lossy() == "p"));
}

#[rstest]
fn test_key_file_path_uses_forward_slashes() {
    let mut request = password_request();
    request.auth = AuthMethod::KeyFile(PathBuf::from(r"C:\Users\bob\.ssh\id_rsa"));

    let command = build_mount_command(Path::new("sshfs-win.exe"), &request);
    let args: Vec<String> = command
        .args
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    assert!(args.contains(&"-oPreferredAuthentications=publickey".to_string()));
    assert!(args.contains(&"-oIdentityFile=\"C:/Users/bob/.ssh/id_rsa\"".to_string()));
    assert!(!args.iter().any(|arg| arg.contains('\\')));
    assert!(!args.contains(&"-opassword_stdin".to_string()));
}

#[rstest]
fn test_port_and_volume_name_come_from_request() {
    let mut request = password_request();
    request.port = 2222;
    request.name = "Backups".into();

    let command = build_mount_command(Path::new("sshfs-win.exe"), &request);
    let args: Vec<String> = command
        .args
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    assert!(args.contains(&"-p2222".to_string()));
    assert!(args.contains(&"-ovolname=Backups".to_string()));
}
