//! Process Stats
//!
//! Uptime and memory of the running process, read through sysinfo.

use std::time::Instant;
use sysinfo::System;

/// Point-in-time view of the current process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSnapshot {
    /// Seconds since the service started
    pub uptime_secs: f64,
    /// Resident memory in whole megabytes
    pub memory_used_mb: u64,
    /// Virtual memory in whole megabytes
    pub memory_total_mb: u64,
}

/// Collect process stats using `started_at` as the uptime origin.
///
/// Memory reads as zero on platforms where sysinfo cannot see the process.
pub fn collect_process_stats(started_at: Instant) -> ProcessSnapshot {
    let uptime_secs = started_at.elapsed().as_secs_f64();

    let mut memory_used_mb = 0;
    let mut memory_total_mb = 0;

    match sysinfo::get_current_pid() {
        Ok(pid) => {
            let mut sys = System::new();
            sys.refresh_process(pid);
            if let Some(process) = sys.process(pid) {
                memory_used_mb = bytes_to_mb(process.memory());
                memory_total_mb = bytes_to_mb(process.virtual_memory());
            }
        }
        Err(e) => tracing::warn!("failed to get current process ID for memory stats: {}", e),
    }

    ProcessSnapshot {
        uptime_secs,
        memory_used_mb,
        memory_total_mb,
    }
}

/// Round bytes to the nearest whole megabyte.
fn bytes_to_mb(bytes: u64) -> u64 {
    (bytes + 512 * 1024) / (1024 * 1024)
}
