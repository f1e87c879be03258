// Copyright (c) Contributors to the winsshfs project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/winsshfs/winsshfs

//! Shared helpers for the crate's tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::proc::ProcessTable;
use crate::{Error, Result};

pub fn init_logging() {
    let sub = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::TRACE)
        .without_time()
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(sub);
}

/// A scripted process table.
///
/// Child lookups answer from a queue of prepared results, liveness
/// checks consume a scripted sequence of answers and fall back to a
/// default once it runs dry, and kills are recorded instead of touching
/// any real process.
#[derive(Default)]
pub struct FakeProcessTable {
    children: Mutex<VecDeque<Result<u32>>>,
    alive_script: Mutex<VecDeque<bool>>,
    default_alive: AtomicBool,
    fail_kills: AtomicBool,
    kills: Mutex<Vec<u32>>,
    checks: AtomicUsize,
}

impl FakeProcessTable {
    pub fn queue_child(&self, result: Result<u32>) {
        self.children.lock().unwrap().push_back(result);
    }

    pub fn script_alive(&self, answers: impl IntoIterator<Item = bool>) {
        self.alive_script.lock().unwrap().extend(answers);
    }

    pub fn set_default_alive(&self, alive: bool) {
        self.default_alive.store(alive, Ordering::SeqCst);
    }

    pub fn fail_kills(&self) {
        self.fail_kills.store(true, Ordering::SeqCst);
    }

    /// Every pid that a kill was requested for, in request order.
    pub fn kills(&self) -> Vec<u32> {
        self.kills.lock().unwrap().clone()
    }

    /// The total number of liveness checks made so far.
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessTable for FakeProcessTable {
    async fn find_child(&self, _parent: u32) -> Result<u32> {
        self.children
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(Error::ProcessNotFound))
    }

    async fn is_alive(&self, _pid: u32) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        match self.alive_script.lock().unwrap().pop_front() {
            Some(answer) => answer,
            None => self.default_alive.load(Ordering::SeqCst),
        }
    }

    async fn kill_tree(&self, pid: u32) -> Result<()> {
        self.kills.lock().unwrap().push(pid);
        if self.fail_kills.load(Ordering::SeqCst) {
            return Err(Error::KillFailed {
                pid,
                message: "scripted kill failure".into(),
            });
        }
        Ok(())
    }
}
