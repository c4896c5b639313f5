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

use std::cell::RefCell;

/// Read-only view of the manager's job counters.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct JobStatSnapshot {
    /// jobs installed so far; never decreases
    pub n_installed_jobs: usize,
    /// installed jobs currently in the running state
    pub n_running_jobs: usize,
    /// jobs finished with `failed` or `invalid` so far
    pub n_failed_jobs: usize,
}

#[derive(Debug)]
pub(super) struct JobStat {
    data: RefCell<JobStatData>,
}

impl JobStat {
    pub(super) fn new() -> JobStat {
        JobStat {
            data: RefCell::new(JobStatData::new()),
        }
    }

    pub(super) fn clear(&self) {
        self.data.borrow_mut().clear();
    }

    pub(super) fn installed_inc(&self) {
        let overflow = value_try_add(&mut self.data.borrow_mut().n_installed, 1);
        assert!(!overflow);
    }

    pub(super) fn running_inc(&self) {
        let overflow = value_try_add(&mut self.data.borrow_mut().n_running, 1);
        assert!(!overflow);
    }

    pub(super) fn running_dec(&self) {
        let overflow = value_try_sub(&mut self.data.borrow_mut().n_running, 1);
        assert!(!overflow, "running counter out of balance");
    }

    pub(super) fn failed_inc(&self) {
        let overflow = value_try_add(&mut self.data.borrow_mut().n_failed, 1);
        assert!(!overflow);
    }

    pub(super) fn snapshot(&self) -> JobStatSnapshot {
        let data = self.data.borrow();
        JobStatSnapshot {
            n_installed_jobs: data.n_installed,
            n_running_jobs: data.n_running,
            n_failed_jobs: data.n_failed,
        }
    }
}

#[derive(Debug)]
struct JobStatData {
    n_installed: usize, // history
    n_running: usize,   // snapshot
    n_failed: usize,    // history
}

// the declaration "pub(self)" is for identification only.
impl JobStatData {
    pub(self) fn new() -> JobStatData {
        JobStatData {
            n_installed: 0,
            n_running: 0,
            n_failed: 0,
        }
    }

    pub(self) fn clear(&mut self) {
        *self = JobStatData {
            n_installed: 0,
            n_running: 0,
            n_failed: 0,
        };
    }
}

fn value_try_add(value: &mut usize, add: usize) -> bool {
    let (v, o) = value.overflowing_add(add);
    if !o {
        *value = v;
    }
    o
}

fn value_try_sub(value: &mut usize, sub: usize) -> bool {
    let (v, o) = value.overflowing_sub(sub);
    if !o {
        *value = v;
    }
    o
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_independently() {
        let stat = JobStat::new();
        stat.installed_inc();
        stat.installed_inc();
        stat.running_inc();
        stat.failed_inc();

        let s = stat.snapshot();
        assert_eq!(s.n_installed_jobs, 2);
        assert_eq!(s.n_running_jobs, 1);
        assert_eq!(s.n_failed_jobs, 1);

        stat.running_dec();
        assert_eq!(stat.snapshot().n_running_jobs, 0);
        // installed and failed are history, not snapshots
        assert_eq!(stat.snapshot().n_installed_jobs, 2);
        assert_eq!(stat.snapshot().n_failed_jobs, 1);
    }
}
