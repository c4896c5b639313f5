// Copyright (c) 2022 Huawei Technologies Co.,Ltd. All rights reserved.
//
// sysMaster is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan
// PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//         http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY
// KIND, EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO
// NON-INFRINGEMENT, MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Boundary to the event loop that owns the manager.

use nix::time::{clock_gettime, ClockId};

const USEC_PER_SEC: u64 = 1_000_000;
const NSEC_PER_USEC: u64 = 1_000;

/// Hooks the engine arms on the owning event loop.
///
/// The engine never blocks and never sleeps. It asks the loop for one-shot
/// wakeups instead: a dispatch wakeup whenever the run queue becomes
/// non-empty, and a monotonic one-shot timer per job with a timeout. The
/// loop calls back into [`JobManager::dispatch_run_queue`] and
/// [`JobManager::dispatch_timer`] when the sources fire.
///
/// [`JobManager::dispatch_run_queue`]: crate::job::JobManager::dispatch_run_queue
/// [`JobManager::dispatch_timer`]: crate::job::JobManager::dispatch_timer
pub trait EventLoop {
    /// The run queue went from empty to non-empty; schedule one dispatch pass.
    fn arm_dispatch(&self);

    /// Arm a one-shot monotonic timer for the given job.
    fn arm_timer(&self, job_id: u32, deadline_usec: u64);

    /// Drop the timer for the given job, if armed.
    fn disarm_timer(&self, job_id: u32);
}

/// CLOCK_MONOTONIC, in microseconds.
pub(crate) fn monotonic_usec() -> u64 {
    match clock_gettime(ClockId::CLOCK_MONOTONIC) {
        Ok(ts) => ts.tv_sec() as u64 * USEC_PER_SEC + ts.tv_nsec() as u64 / NSEC_PER_USEC,
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_moves_forward() {
        let a = monotonic_usec();
        let b = monotonic_usec();
        assert!(a > 0);
        assert!(b >= a);
    }
}
