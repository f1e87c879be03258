// Copyright (c) Contributors to the winsshfs project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/winsshfs/winsshfs

use std::io;

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Diagnostic, Debug, Error)]
#[diagnostic(
    url(
        "https://github.com/winsshfs/winsshfs/blob/main/docs/error_codes.md#{}",
        self.code().unwrap_or_else(|| Box::new("winsshfs::generic"))
    )
)]
pub enum Error {
    #[error("Process not found")]
    ProcessNotFound,
    #[error("Mount helper failed: {message}")]
    MountFailed { message: String },
    #[error("Mount helper exited abnormally with code {code}")]
    MountExited { code: i32 },
    #[error("Mount helper did not hand off within {0} seconds")]
    MountTimeout(u64),
    #[error("Failed to kill process tree of {pid}: {message}")]
    KillFailed { pid: u32, message: String },
    #[error("Failed to spawn process {process}")]
    ProcessSpawnError {
        process: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot load config, lock has been poisoned: {0}")]
    LockPoisonedRead(String),
    #[error("Cannot update config, lock has been poisoned: {0}")]
    LockPoisonedWrite(String),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl Error {
    pub fn process_spawn_error(process: impl Into<String>, err: io::Error) -> Error {
        Error::ProcessSpawnError {
            process: process.into(),
            source: err,
        }
    }
}
