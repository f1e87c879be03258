// Copyright (c) Contributors to the winsshfs project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/winsshfs/winsshfs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::watch;
use crate::fixtures::{FakeProcessTable, init_logging};
use crate::mount::{ManagedMount, MountEvent};
use crate::proc::ProcessTable;

#[tokio::test]
async fn test_not_found_fires_once_then_stops() {
    init_logging();
    let table = Arc::new(FakeProcessTable::default());
    // the worker is never present in the table
    let (send, mut recv) = mpsc::unbounded_channel();
    let mount = Arc::new(ManagedMount::new(123, send));

    let task = tokio::spawn(watch(
        Arc::clone(&table) as Arc<dyn ProcessTable>,
        Arc::clone(&mount),
        Duration::from_millis(10),
        1,
    ));

    assert_eq!(recv.recv().await, Some(MountEvent::NotFound));
    task.await.unwrap();

    // the check is one-shot terminal: no further polls happen
    let checks = table.checks();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(table.checks(), checks);
    assert!(recv.try_recv().is_err());
}

#[tokio::test]
async fn test_live_worker_is_left_alone() {
    init_logging();
    let table = Arc::new(FakeProcessTable::default());
    table.set_default_alive(true);
    let (send, mut recv) = mpsc::unbounded_channel();
    let mount = Arc::new(ManagedMount::new(123, send));

    let task = tokio::spawn(watch(
        Arc::clone(&table) as Arc<dyn ProcessTable>,
        Arc::clone(&mount),
        Duration::from_millis(10),
        1,
    ));

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(recv.try_recv().is_err());
    assert!(table.checks() >= 2);
    task.abort();
}

#[tokio::test]
async fn test_single_transient_miss_is_absorbed() {
    init_logging();
    let table = Arc::new(FakeProcessTable::default());
    // one miss, a recovery, then two consecutive misses
    table.script_alive([false, true, false, false]);
    let (send, mut recv) = mpsc::unbounded_channel();
    let mount = Arc::new(ManagedMount::new(9, send));

    tokio::spawn(watch(
        Arc::clone(&table) as Arc<dyn ProcessTable>,
        Arc::clone(&mount),
        Duration::from_millis(10),
        2,
    ));

    assert_eq!(recv.recv().await, Some(MountEvent::NotFound));
    // the isolated first miss did not fire; only the consecutive pair did
    assert_eq!(table.checks(), 4);
    assert!(recv.try_recv().is_err());
}

#[tokio::test]
async fn test_detection_releases_the_monitor_slot() {
    init_logging();
    let table = Arc::new(FakeProcessTable::default());
    let (send, mut recv) = mpsc::unbounded_channel();
    let mount = Arc::new(ManagedMount::new(7, send));

    let task = tokio::spawn(watch(
        Arc::clone(&table) as Arc<dyn ProcessTable>,
        Arc::clone(&mount),
        Duration::from_millis(50),
        1,
    ));
    mount.set_monitor(task);

    assert_eq!(recv.recv().await, Some(MountEvent::NotFound));
    // the slot was already released on the detection path, so a
    // termination racing in afterwards finds nothing left to cancel
    assert!(mount.take_monitor().is_none());
}
