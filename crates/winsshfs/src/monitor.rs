// Copyright (c) Contributors to the winsshfs project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/winsshfs/winsshfs

//! Liveness monitoring of mount worker processes

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;

use crate::mount::{ManagedMount, MountEvent};
use crate::proc::ProcessTable;

#[cfg(test)]
#[path = "./monitor_test.rs"]
mod monitor_test;

/// Default number of milliseconds between liveness checks.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

/// Poll the process table until the worker disappears.
///
/// This is the recurring liveness check of one managed mount. The
/// worker is not a child of this program, so its death can only be
/// observed by it going missing from the process table. Once it has
/// been missing for `misses_before_lost` consecutive checks the mount's
/// `NotFound` event is raised exactly once and the check stops for
/// good; it never restarts. A failed table query counts as a miss,
/// a successful check resets the count.
pub(crate) async fn watch(
    table: Arc<dyn ProcessTable>,
    mount: Arc<ManagedMount>,
    poll_interval: Duration,
    misses_before_lost: u32,
) {
    let pid = mount.pid();
    let misses_before_lost = misses_before_lost.max(1);
    let interval = tokio::time::interval(poll_interval.max(Duration::from_millis(1)));
    let mut ticks = IntervalStream::new(interval);
    // a tokio interval yields its first tick immediately, but the
    // first check belongs one full interval after the mount came up
    let _ = ticks.next().await;

    let mut misses = 0u32;
    while ticks.next().await.is_some() {
        if table.is_alive(pid).await {
            misses = 0;
            continue;
        }
        misses += 1;
        tracing::debug!(pid, misses, "worker not found in process table");
        if misses >= misses_before_lost {
            // the slot must be empty before the notification goes out,
            // a terminate racing in must not cancel this task again
            let _task = mount.take_monitor();
            mount.notify(MountEvent::NotFound);
            tracing::info!(pid, "worker process is gone, stopping liveness checks");
            break;
        }
    }
}
