//! Resource governor
//!
//! Samples the process's resident memory and the size of the page cache
//! directory. Exceeding the memory ceiling latches a tripped flag that the
//! supervisory loop turns into a graceful shutdown; exceeding the cache
//! ceiling purges the cache.

use crate::config::GovernorConfig;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessesToUpdate, System};

struct MemorySampler {
    system: System,
    pid: Option<Pid>,
    last: Option<(Instant, u64)>,
}

impl MemorySampler {
    fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
            last: None,
        }
    }

    /// Resident bytes, re-sampled at most once per `interval`
    fn resident(&mut self, interval: Duration) -> u64 {
        if let Some((at, bytes)) = self.last {
            if at.elapsed() < interval {
                return bytes;
            }
        }

        let bytes = match self.pid {
            Some(pid) => {
                self.system
                    .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
                self.system.process(pid).map(|p| p.memory()).unwrap_or(0)
            }
            None => 0,
        };
        self.last = Some((Instant::now(), bytes));
        bytes
    }
}

/// Advisory memory and cache limits
pub struct ResourceGovernor {
    memory_ceiling: u64,
    cache_ceiling: u64,
    cache_dir: PathBuf,
    sample_interval: Duration,
    sampler: Mutex<MemorySampler>,
    tripped: AtomicBool,
}

impl ResourceGovernor {
    pub fn new(config: &GovernorConfig) -> Self {
        Self {
            memory_ceiling: config.memory_ceiling_bytes(),
            cache_ceiling: config.cache_ceiling_bytes(),
            cache_dir: config.cache_dir.clone(),
            sample_interval: config.sample_interval(),
            sampler: Mutex::new(MemorySampler::new()),
            tripped: AtomicBool::new(false),
        }
    }

    /// Current resident memory of this process in bytes
    pub fn resident_memory(&self) -> u64 {
        self.sampler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .resident(self.sample_interval)
    }

    /// Checks resident memory against the ceiling
    ///
    /// A positive result also latches the tripped flag.
    pub fn over_memory_limit(&self) -> bool {
        let resident = self.resident_memory();
        if resident <= self.memory_ceiling {
            return false;
        }

        if !self.tripped.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                "Resident memory {} MiB exceeds ceiling {} MiB; stopping admissions",
                resident / (1024 * 1024),
                self.memory_ceiling / (1024 * 1024)
            );
        }
        true
    }

    /// True once the memory ceiling has been exceeded
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// Checks the cache directory against its ceiling, purging it when over
    ///
    /// Performs blocking filesystem I/O.
    pub fn over_cache_limit(&self) -> bool {
        let size = dir_size(&self.cache_dir);
        if size <= self.cache_ceiling {
            return false;
        }

        tracing::warn!(
            "Cache {} is {} bytes (ceiling {}); purging",
            self.cache_dir.display(),
            size,
            self.cache_ceiling
        );
        if let Err(e) = purge_dir(&self.cache_dir) {
            tracing::warn!("Failed to purge cache {}: {}", self.cache_dir.display(), e);
        }
        true
    }
}

/// Total size of regular files under `root`; missing directories count as empty
fn dir_size(root: &Path) -> u64 {
    let mut total = 0;
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if meta.is_dir() {
                pending.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    total
}

/// Removes everything inside `root`, keeping the directory itself
fn purge_dir(root: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
        } else {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}
