// Copyright (c) Contributors to the winsshfs project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/winsshfs/winsshfs

//! Access to the operating system's process table

use async_trait::async_trait;

use crate::{Error, Result};

#[cfg(test)]
#[path = "./proc_test.rs"]
mod proc_test;

/// The process table operations needed to supervise mount workers.
///
/// The worker process is never owned by this program, so everything it
/// needs to know about the worker goes through external inspection of
/// the process table.
#[async_trait]
pub trait ProcessTable: Send + Sync {
    /// Find the single child of `parent` running the managed worker image.
    async fn find_child(&self, parent: u32) -> Result<u32>;

    /// Report whether a process with this id is present in the table.
    ///
    /// A failed query counts as not present.
    async fn is_alive(&self, pid: u32) -> bool;

    /// Forcibly terminate the process and all of its descendants.
    async fn kill_tree(&self, pid: u32) -> Result<()>;
}

/// Process table access through the Windows command line tools.
pub struct WinProcessTable {
    process_name: String,
}

impl WinProcessTable {
    /// Create a table filtering child lookups on the given image name.
    pub fn new(process_name: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
        }
    }
}

#[async_trait]
impl ProcessTable for WinProcessTable {
    async fn find_child(&self, parent: u32) -> Result<u32> {
        let filter = format!(
            "(name=\"{}\" and parentprocessid={})",
            self.process_name, parent
        );
        let mut cmd = tokio::process::Command::new("wmic");
        cmd.args(["process", "where", &filter, "get", "processid", "/value"]);
        tracing::debug!("{:?}", cmd);
        let out = match cmd.output().await {
            Ok(out) => out,
            Err(err) => {
                tracing::debug!(?err, parent, "process table query failed");
                return Err(Error::ProcessNotFound);
            }
        };
        if !out.status.success() {
            return Err(Error::ProcessNotFound);
        }
        parse_pid_record(&String::from_utf8_lossy(&out.stdout))
    }

    async fn is_alive(&self, pid: u32) -> bool {
        let mut cmd = tokio::process::Command::new("tasklist");
        cmd.args(["/FI", &format!("PID eq {pid}")]);
        match cmd.output().await {
            Ok(out) if out.status.success() => {
                String::from_utf8_lossy(&out.stdout).contains(&pid.to_string())
            }
            _ => false,
        }
    }

    async fn kill_tree(&self, pid: u32) -> Result<()> {
        let mut cmd = tokio::process::Command::new("taskkill");
        cmd.args(["/PID", &pid.to_string(), "/T", "/F"]);
        tracing::debug!("{:?}", cmd);
        let out = cmd
            .output()
            .await
            .map_err(|err| Error::process_spawn_error("taskkill", err))?;
        if !out.status.success() {
            return Err(Error::KillFailed {
                pid,
                message: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Parse the pid out of a `ProcessId=<integer>` query record.
///
/// The query tooling pads its output with carriage returns and blank
/// lines, so anything around the one key=value line is ignored. Missing
/// or malformed records are a resolution failure, never a panic.
pub(crate) fn parse_pid_record(output: &str) -> Result<u32> {
    let (_, value) = output
        .lines()
        .map(str::trim)
        .find_map(|line| line.split_once('='))
        .ok_or(Error::ProcessNotFound)?;
    value.trim().parse().map_err(|_| Error::ProcessNotFound)
}
