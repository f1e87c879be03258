// Copyright (c) Contributors to the winsshfs project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/winsshfs/winsshfs

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::Result;

#[cfg(test)]
#[path = "./config_test.rs"]
mod config_test;

static CONFIG: OnceCell<RwLock<Arc<Config>>> = OnceCell::new();

/// Configuration for launching and locating the mount helper.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Helper {
    /// The helper binary invoked to establish a mount
    pub binary: PathBuf,

    /// Image name of the long-lived worker in the process table
    ///
    /// Both hops of the pid discovery filter on this name.
    pub process_name: String,

    /// Maximum number of seconds to wait for the launcher to hand
    /// off to the worker and exit
    pub spawn_timeout_secs: u64,
}

impl Default for Helper {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("sshfs-win.exe"),
            process_name: "sshfs.exe".into(),
            spawn_timeout_secs: 300,
        }
    }
}

/// Configuration for the per-mount liveness checks.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Monitor {
    /// Milliseconds between liveness checks of a mounted worker
    pub interval_ms: u64,

    /// Consecutive failed checks before a worker is reported gone
    ///
    /// Values above one absorb transient process table query failures
    /// at the cost of slower detection.
    pub misses_before_lost: u32,
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            interval_ms: crate::monitor::DEFAULT_POLL_INTERVAL_MS,
            misses_before_lost: 1,
        }
    }
}

/// Configuration values for winsshfs.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    // These sub-types should aim to only have one level of
    // values within them, otherwise they become impossible to address
    // with environment variables.
    pub helper: Helper,
    pub monitor: Monitor,
}

impl Config {
    /// Get the current loaded config, loading it if needed
    pub fn current() -> Result<Arc<Self>> {
        get_config()
    }

    /// Load the config from disk, even if it's already been loaded before
    pub fn load() -> Result<Self> {
        load_config()
    }

    /// Make this config the current global one
    pub fn make_current(self) -> Result<Arc<Self>> {
        // Note we don't know if we won the race to set the value here,
        // so we still need to try to update it.
        let config = CONFIG.get_or_try_init(|| -> Result<RwLock<Arc<Config>>> {
            Ok(RwLock::new(Arc::new(self.clone())))
        })?;

        let mut lock = config
            .write()
            .map_err(|err| crate::Error::LockPoisonedWrite(err.to_string()))?;
        *Arc::make_mut(&mut lock) = self;
        Ok(Arc::clone(&lock))
    }
}

/// Get the current winsshfs config, fetching it from disk if needed.
pub fn get_config() -> Result<Arc<Config>> {
    let config = CONFIG.get_or_try_init(|| -> Result<RwLock<Arc<Config>>> {
        Ok(RwLock::new(Arc::new(load_config()?)))
    })?;
    let lock = config
        .read()
        .map_err(|err| crate::Error::LockPoisonedRead(err.to_string()))?;
    Ok(Arc::clone(&*lock))
}

/// Load the winsshfs configuration from disk, even if it has already been loaded.
///
/// This includes the default, user, and system configurations (if they exist).
pub fn load_config() -> Result<Config> {
    use config::{Config as RawConfig, File};

    let mut config_builder = RawConfig::builder()
        // the system config can be in any supported format: toml, yaml, json, ini, etc
        .add_source(File::with_name("/etc/winsshfs").required(false));

    if let Some(user_config) = dirs::config_dir().map(|d| d.join("winsshfs/winsshfs")) {
        config_builder = config_builder
            .add_source(File::with_name(&format!("{}", user_config.display())).required(false));
    }

    for (var, value) in std::env::vars() {
        let Some(tail) = var.strip_prefix("WINSSHFS_") else {
            continue;
        };
        let Some((section, name)) = tail.split_once('_') else {
            // typically, a value with no section is not a configuration
            // value, and can be skipped (eg: WINSSHFS_LOG)
            continue;
        };

        let key = format!("{}.{}", section.to_lowercase(), name.to_lowercase());
        config_builder = config_builder.set_override(key, value)?;
    }

    let config = config_builder.build()?;
    Ok(Config::deserialize(config)?)
}
