// Copyright (c) Contributors to the winsshfs project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/winsshfs/winsshfs

use std::ffi::OsString;
use std::path::Path;

use crate::mount::{AuthMethod, MountRequest};

#[cfg(test)]
#[path = "./bootstrap_test.rs"]
mod bootstrap_test;

/// A helper invocation that has been constructed but not yet launched.
pub struct Command {
    pub executable: OsString,
    pub args: Vec<OsString>,
}

/// Construct the mount helper command for a request.
///
/// The argument vector encodes the remote endpoint, the local mount
/// point and a fixed set of filesystem behavior options. Depending on
/// the request's authentication method, flags selecting password or
/// public key authentication are appended; in password mode the secret
/// itself is not part of the vector and must be written to the launched
/// process' stdin instead.
pub fn build_mount_command(helper: &Path, request: &MountRequest) -> Command {
    let mut args: Vec<OsString> = vec![
        format!(
            "{}@{}:{}",
            request.user, request.host, request.folder
        )
        .into(),
        request.mount_point.clone().into(),
        format!("-p{}", request.port).into(),
        "-oidmap=user".into(),
        "-ouid=-1".into(),
        "-ogid=-1".into(),
        "-oumask=000".into(),
        "-ocreate_umask=000".into(),
        format!("-ovolname={}", request.name).into(),
        "-omax_readahead=1GB".into(),
        "-oStrictHostKeyChecking=no".into(),
        "-oUserKnownHostsFile=/dev/null".into(),
        "-oallow_other".into(),
        "-olarge_read".into(),
        "-okernel_cache".into(),
    ];

    match &request.auth {
        AuthMethod::Password(_) => {
            args.push("-oPreferredAuthentications=password".into());
            args.push("-opassword_stdin".into());
        }
        AuthMethod::KeyFile(key_file) => {
            args.push("-oPreferredAuthentications=publickey".into());
            // the helper only understands forward slashes in identity paths
            let key_file = key_file.to_string_lossy().replace('\\', "/");
            args.push(format!("-oIdentityFile=\"{key_file}\"").into());
        }
    }

    Command {
        executable: helper.as_os_str().to_owned(),
        args,
    }
}
