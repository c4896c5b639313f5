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

use super::entry::Job;
use super::kind::JobKind;
use crate::unit::UnitObj;
use std::cell::RefCell;
use std::rc::Rc;

/// Per-unit job storage: at most one regular job and one nop job at a time.
///
/// The two slots are deliberately separate fields. `nop` is observer-only
/// and never merges with the regular kinds, so the case analysis stays
/// explicit.
pub(super) struct JobUnit {
    // key
    unit: Rc<dyn UnitObj>,

    // data
    job: RefCell<Option<Rc<Job>>>,     // regular slot
    nop_job: RefCell<Option<Rc<Job>>>, // nop slot
}

impl JobUnit {
    pub(super) fn new(unit: Rc<dyn UnitObj>) -> JobUnit {
        JobUnit {
            unit,
            job: RefCell::new(None),
            nop_job: RefCell::new(None),
        }
    }

    #[allow(dead_code)]
    pub(super) fn unit(&self) -> &Rc<dyn UnitObj> {
        &self.unit
    }

    /// The occupant of the slot a job of the given kind would use.
    pub(super) fn slot(&self, kind: JobKind) -> Option<Rc<Job>> {
        self.slot_cell(kind).borrow().as_ref().map(Rc::clone)
    }

    pub(super) fn regular(&self) -> Option<Rc<Job>> {
        self.job.borrow().as_ref().map(Rc::clone)
    }

    pub(super) fn set_slot(&self, job: Rc<Job>) {
        let cell = self.slot_cell(job.kind());
        let old = cell.borrow_mut().replace(job);
        assert!(old.is_none(), "a unit owns at most one job per slot");
    }

    pub(super) fn clear_slot(&self, job: &Rc<Job>) {
        let cell = self.slot_cell(job.kind());
        let old = cell.borrow_mut().take();
        match old {
            Some(o) => assert!(Rc::ptr_eq(&o, job), "slot occupant mismatch"),
            None => unreachable!("clearing an empty job slot"),
        }
    }

    pub(super) fn is_empty(&self) -> bool {
        self.job.borrow().is_none() && self.nop_job.borrow().is_none()
    }

    fn slot_cell(&self, kind: JobKind) -> &RefCell<Option<Rc<Job>>> {
        match kind {
            JobKind::Nop => &self.nop_job,
            _ => &self.job,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::entry::JobFlags;
    use super::*;
    use crate::unit::test_utils::{as_obj, TestUnit};

    #[test]
    fn slots_are_independent() {
        let unit = TestUnit::new("test1.service");
        let ju = JobUnit::new(as_obj(&unit));
        assert!(ju.is_empty());

        let start = Rc::new(Job::new(1, as_obj(&unit), JobKind::Start, JobFlags::empty()));
        let nop = Rc::new(Job::new(2, as_obj(&unit), JobKind::Nop, JobFlags::empty()));

        ju.set_slot(Rc::clone(&start));
        assert!(ju.slot(JobKind::Nop).is_none());
        ju.set_slot(Rc::clone(&nop));

        assert_eq!(ju.slot(JobKind::Start).unwrap().id(), 1);
        assert_eq!(ju.slot(JobKind::Stop).unwrap().id(), 1); // same class, same slot
        assert_eq!(ju.slot(JobKind::Nop).unwrap().id(), 2);
        assert!(!ju.is_empty());

        ju.clear_slot(&start);
        assert!(ju.slot(JobKind::Start).is_none());
        assert!(ju.slot(JobKind::Nop).is_some());
        ju.clear_slot(&nop);
        assert!(ju.is_empty());
    }

    #[test]
    #[should_panic]
    fn double_occupancy_is_refused() {
        let unit = TestUnit::new("test1.service");
        let ju = JobUnit::new(as_obj(&unit));
        let a = Rc::new(Job::new(1, as_obj(&unit), JobKind::Start, JobFlags::empty()));
        let b = Rc::new(Job::new(2, as_obj(&unit), JobKind::Stop, JobFlags::empty()));
        ju.set_slot(a);
        ju.set_slot(b);
    }
}
