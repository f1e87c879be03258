// Copyright (c) Contributors to the winsshfs project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/winsshfs/winsshfs

//! Establishing and supervising remote mounts

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::proc::{ProcessTable, WinProcessTable};
use crate::{Error, Result, bootstrap, monitor};

#[cfg(test)]
#[path = "./mount_test.rs"]
mod mount_test;

/// How a mount authenticates against the remote host.
#[derive(Clone, Debug)]
pub enum AuthMethod {
    /// Password authentication, the secret is written to the helper's stdin
    Password(String),
    /// Public key authentication using an identity file on disk
    KeyFile(PathBuf),
}

/// Everything needed to bring up one remote mount.
#[derive(Clone, Debug)]
pub struct MountRequest {
    pub user: String,
    pub host: String,
    /// The folder on the remote host to be mounted
    pub folder: String,
    /// The local mount target, typically a drive letter
    pub mount_point: String,
    pub port: u16,
    /// Display name used as the mounted volume's label
    pub name: String,
    pub auth: AuthMethod,
}

/// Lifecycle notifications delivered for a managed mount.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MountEvent {
    /// The mount was explicitly terminated
    Exit,
    /// The worker process disappeared from the process table
    NotFound,
}

/// State of one supervised mount, shared between the manager's
/// registry and the caller's [`Mount`] handle.
pub(crate) struct ManagedMount {
    pid: u32,
    events: mpsc::UnboundedSender<MountEvent>,
    monitor: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ManagedMount {
    pub(crate) fn new(pid: u32, events: mpsc::UnboundedSender<MountEvent>) -> Self {
        Self {
            pid,
            events,
            monitor: Mutex::new(None),
        }
    }

    pub(crate) fn pid(&self) -> u32 {
        self.pid
    }

    /// Hand this mount its liveness monitor task.
    pub(crate) fn set_monitor(&self, task: tokio::task::JoinHandle<()>) {
        *lock(&self.monitor) = Some(task);
    }

    /// Take the liveness monitor task out of its slot, if it is still there.
    ///
    /// The slot can be emptied exactly once, either by the monitor
    /// noticing the worker is gone or by an explicit terminate,
    /// whichever comes first.
    pub(crate) fn take_monitor(&self) -> Option<tokio::task::JoinHandle<()>> {
        lock(&self.monitor).take()
    }

    pub(crate) fn notify(&self, event: MountEvent) {
        // the caller may have dropped their handle, in which case
        // there is nobody left to tell
        let _ = self.events.send(event);
    }
}

/// A supervised mount as returned from [`MountManager::spawn`].
///
/// The handle shares the supervised state with the manager's registry
/// and additionally owns the receiving end of the mount's event channel.
pub struct Mount {
    shared: Arc<ManagedMount>,
    events: mpsc::UnboundedReceiver<MountEvent>,
}

impl Mount {
    /// The resolved process id of the long-lived worker.
    pub fn pid(&self) -> u32 {
        self.shared.pid
    }

    /// Wait for the next lifecycle event of this mount.
    pub async fn next_event(&mut self) -> Option<MountEvent> {
        self.events.recv().await
    }

    /// Return the next lifecycle event if one is already pending.
    pub fn try_next_event(&mut self) -> Option<MountEvent> {
        self.events.try_recv().ok()
    }
}

/// Owns every supervised mount and coordinates their lifecycle.
pub struct MountManager {
    table: Arc<dyn ProcessTable>,
    helper: PathBuf,
    spawn_timeout: Duration,
    poll_interval: Duration,
    misses_before_lost: u32,
    mounts: Mutex<Vec<Arc<ManagedMount>>>,
}

impl MountManager {
    /// Create a manager using the Windows process table tooling.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(WinProcessTable::new(config.helper.process_name.clone())),
            config,
        )
    }

    /// Create a manager with an explicit process table implementation.
    pub fn new(table: Arc<dyn ProcessTable>, config: &Config) -> Self {
        Self {
            table,
            helper: config.helper.binary.clone(),
            spawn_timeout: Duration::from_secs(config.helper.spawn_timeout_secs),
            poll_interval: Duration::from_millis(config.monitor.interval_ms),
            misses_before_lost: config.monitor.misses_before_lost,
            mounts: Mutex::new(Vec::new()),
        }
    }

    /// Launch the mount helper for a request and supervise the worker.
    ///
    /// The launched process only negotiates the mount and then hands
    /// off to the long-lived worker before exiting, so the worker's pid
    /// is discovered in two hops: the launcher's child is looked up
    /// while waiting for the hand-off, and once the launcher has exited
    /// cleanly that intermediate's child is the worker. The returned
    /// handle is registered with this manager and its worker is
    /// liveness-checked until the mount ends.
    pub async fn spawn(&self, request: &MountRequest) -> Result<Mount> {
        let command = bootstrap::build_mount_command(&self.helper, request);
        let helper_name = command.executable.to_string_lossy().to_string();

        let mut cmd = tokio::process::Command::new(&command.executable);
        cmd.args(&command.args);
        cmd.stdout(std::process::Stdio::null());
        cmd.stderr(std::process::Stdio::piped());
        if matches!(request.auth, AuthMethod::Password(_)) {
            cmd.stdin(std::process::Stdio::piped());
        } else {
            cmd.stdin(std::process::Stdio::null());
        }
        tracing::debug!("{:?}", cmd);
        let mut child = cmd
            .spawn()
            .map_err(|err| Error::process_spawn_error(helper_name.clone(), err))?;

        if let AuthMethod::Password(password) = &request.auth {
            // the helper reads the secret as one line from its input
            // before negotiating the connection
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(format!("{password}\n").as_bytes())
                    .await
                    .map_err(|err| Error::process_spawn_error(helper_name.clone(), err))?;
            }
        }

        let launcher_pid = child.id().ok_or(Error::ProcessNotFound)?;

        // the launcher forks its worker chain almost immediately, so the
        // first discovery hop runs while we wait for the hand-off; its
        // result is only trusted once the launcher has exited cleanly
        let first_hop = {
            let table = Arc::clone(&self.table);
            tokio::spawn(async move { table.find_child(launcher_pid).await })
        };

        let handoff = wait_for_handoff(&mut child, &helper_name);
        let status = match tokio::time::timeout(self.spawn_timeout, handoff).await {
            Ok(status) => status?,
            Err(_elapsed) => {
                let _ = child.start_kill();
                first_hop.abort();
                return Err(Error::MountTimeout(self.spawn_timeout.as_secs()));
            }
        };
        match status.code() {
            Some(0) => {}
            code => {
                return Err(Error::MountExited {
                    code: code.unwrap_or(-1),
                });
            }
        }

        let intermediate = match first_hop.await {
            Ok(found) => found?,
            Err(_join) => return Err(Error::ProcessNotFound),
        };
        let pid = self.table.find_child(intermediate).await?;

        let (events_send, events_recv) = mpsc::unbounded_channel();
        let shared = Arc::new(ManagedMount::new(pid, events_send));
        let watch = monitor::watch(
            Arc::clone(&self.table),
            Arc::clone(&shared),
            self.poll_interval,
            self.misses_before_lost,
        );
        shared.set_monitor(tokio::spawn(watch));
        lock(&self.mounts).push(Arc::clone(&shared));

        tracing::info!(pid, mount_point = %request.mount_point, "mount established");
        Ok(Mount {
            shared,
            events: events_recv,
        })
    }

    /// Tear down one mount and drop it from the registry.
    ///
    /// The kill is best effort: a failure is logged and the bookkeeping
    /// proceeds regardless, so the handle always ends up deregistered
    /// with its `Exit` event raised. Terminating a mount that has
    /// already been removed only repeats the kill attempt and event.
    pub async fn terminate(&self, mount: &Mount) {
        self.terminate_shared(&mount.shared).await
    }

    /// Tear down every mount registered at the time of the call.
    ///
    /// All terminations run concurrently and this only returns once
    /// each of them has completed. Mounts spawned after the registry
    /// snapshot was taken are untouched.
    pub async fn terminate_all(&self) {
        let snapshot: Vec<_> = lock(&self.mounts).to_vec();
        join_all(
            snapshot
                .iter()
                .map(|shared| self.terminate_shared(shared)),
        )
        .await;
    }

    /// The worker pids of all currently registered mounts.
    pub fn pids(&self) -> Vec<u32> {
        lock(&self.mounts).iter().map(|m| m.pid).collect()
    }

    async fn terminate_shared(&self, shared: &Arc<ManagedMount>) {
        let pid = shared.pid;
        if let Err(err) = self.table.kill_tree(pid).await {
            tracing::warn!(pid, ?err, "failed to kill mount process tree");
        }
        if let Some(task) = shared.take_monitor() {
            task.abort();
        }
        lock(&self.mounts).retain(|m| m.pid != pid);
        shared.notify(MountEvent::Exit);
        tracing::info!(pid, "mount terminated");
    }
}

/// Wait for the launcher to exit, failing fast on any diagnostics.
///
/// The helper writes to its error stream only when the mount cannot be
/// established, so the first bytes seen there end the wait with the raw
/// text as the failure message.
async fn wait_for_handoff(
    child: &mut tokio::process::Child,
    helper_name: &str,
) -> Result<std::process::ExitStatus> {
    let status = match child.stderr.take() {
        Some(mut err_stream) => {
            let mut buf = vec![0u8; 4096];
            tokio::select! {
                read = err_stream.read(&mut buf) => match read {
                    Ok(n) if n > 0 => {
                        let message = String::from_utf8_lossy(&buf[..n]).trim().to_string();
                        return Err(Error::MountFailed { message });
                    }
                    // EOF or a broken pipe: nothing was diagnosed, wait for the exit
                    _ => child.wait().await,
                },
                status = child.wait() => status,
            }
        }
        None => child.wait().await,
    };
    status.map_err(|err| Error::process_spawn_error(helper_name, err))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // a panic elsewhere never leaves the registry unusable
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
