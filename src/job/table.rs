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
use super::junit::JobUnit;
use crate::error::{Error, Result};
use crate::unit::UnitObj;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub(super) struct JobTable {
    // owned objects
    // key: job-id | unit-name, value: job | per-unit slots
    t_id: RefCell<HashMap<u32, Rc<Job>>>, // guarantee the uniqueness of job-id
    t_unit: RefCell<HashMap<String, Rc<JobUnit>>>,
}

impl JobTable {
    pub(super) fn new() -> JobTable {
        JobTable {
            t_id: RefCell::new(HashMap::new()),
            t_unit: RefCell::new(HashMap::new()),
        }
    }

    pub(super) fn clear(&self) {
        self.t_id.borrow_mut().clear();
        self.t_unit.borrow_mut().clear();
    }

    /// Place a job into the id index and its unit's slot. The caller has
    /// already decided the slot is free to take it.
    pub(super) fn insert(&self, job: Rc<Job>) -> Result<()> {
        // check job-id
        let id = job.id();
        if self.t_id.borrow().contains_key(&id) {
            return Err(Error::Internal);
        }

        // table-unit
        let ju = self.unit_entry_pad(job.unit());
        if ju.slot(job.kind()).is_some() {
            return Err(Error::Exists);
        }
        ju.set_slot(Rc::clone(&job));

        // table-id
        self.t_id.borrow_mut().insert(id, job);

        Ok(())
    }

    /// Detach a job from its slot and the id index; garbage-collects the
    /// unit entry once both slots are empty.
    pub(super) fn remove(&self, job: &Rc<Job>) {
        let removed = self.t_id.borrow_mut().remove(&job.id());
        assert!(removed.is_some(), "removing a job that is not installed");

        let name = job.unit().id();
        let ju = self
            .unit_entry(&name)
            .expect("installed job without a unit entry");
        ju.clear_slot(job);
        if ju.is_empty() {
            self.t_unit.borrow_mut().remove(&name);
        }
    }

    pub(super) fn get(&self, id: u32) -> Option<Rc<Job>> {
        self.t_id.borrow().get(&id).map(Rc::clone)
    }

    /// The regular-slot job of the named unit, if any.
    pub(super) fn regular_job(&self, unit_name: &str) -> Option<Rc<Job>> {
        self.unit_entry(unit_name).and_then(|ju| ju.regular())
    }

    pub(super) fn unit_entry(&self, unit_name: &str) -> Option<Rc<JobUnit>> {
        self.t_unit.borrow().get(unit_name).map(Rc::clone)
    }

    pub(super) fn unit_entry_pad(&self, unit: &Rc<dyn UnitObj>) -> Rc<JobUnit> {
        let mut t_unit = self.t_unit.borrow_mut();
        let ju = t_unit
            .entry(unit.id())
            .or_insert_with(|| Rc::new(JobUnit::new(Rc::clone(unit))));
        Rc::clone(ju)
    }

    /// All installed jobs, in id order. Serialization and coldplug want a
    /// deterministic walk.
    pub(super) fn jobs_sorted(&self) -> Vec<Rc<Job>> {
        let mut jobs: Vec<Rc<Job>> = self.t_id.borrow().values().map(Rc::clone).collect();
        jobs.sort_by_key(|j| j.id());
        jobs
    }

    pub(super) fn len(&self) -> usize {
        self.t_id.borrow().len()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.t_id.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::super::entry::JobFlags;
    use super::super::kind::JobKind;
    use super::*;
    use crate::unit::test_utils::{as_obj, TestUnit};

    #[test]
    fn insert_remove_lookup() {
        let table = JobTable::new();
        let unit = TestUnit::new("test1.service");

        let job = Rc::new(Job::new(1, as_obj(&unit), JobKind::Start, JobFlags::empty()));
        table.insert(Rc::clone(&job)).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(1).unwrap().id(), 1);
        assert_eq!(table.regular_job("test1.service").unwrap().id(), 1);
        assert!(table.regular_job("test2.service").is_none());

        table.remove(&job);
        assert!(table.is_empty());
        assert!(table.get(1).is_none());
        assert!(table.unit_entry("test1.service").is_none());
    }

    #[test]
    fn occupied_slot_is_rejected() {
        let table = JobTable::new();
        let unit = TestUnit::new("test1.service");

        let a = Rc::new(Job::new(1, as_obj(&unit), JobKind::Start, JobFlags::empty()));
        let b = Rc::new(Job::new(2, as_obj(&unit), JobKind::Stop, JobFlags::empty()));
        table.insert(a).unwrap();
        assert!(matches!(table.insert(b), Err(Error::Exists)));

        // the nop slot is separate
        let n = Rc::new(Job::new(3, as_obj(&unit), JobKind::Nop, JobFlags::empty()));
        table.insert(n).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn duplicate_id_is_internal_error() {
        let table = JobTable::new();
        let unit1 = TestUnit::new("test1.service");
        let unit2 = TestUnit::new("test2.service");

        let a = Rc::new(Job::new(7, as_obj(&unit1), JobKind::Start, JobFlags::empty()));
        let b = Rc::new(Job::new(7, as_obj(&unit2), JobKind::Start, JobFlags::empty()));
        table.insert(a).unwrap();
        assert!(matches!(table.insert(b), Err(Error::Internal)));
    }

    #[test]
    fn jobs_sorted_by_id() {
        let table = JobTable::new();
        for (id, name) in [(3u32, "c.service"), (1, "a.service"), (2, "b.service")] {
            let unit = TestUnit::new(name);
            table
                .insert(Rc::new(Job::new(
                    id,
                    as_obj(&unit),
                    JobKind::Start,
                    JobFlags::empty(),
                )))
                .unwrap();
        }
        let ids: Vec<u32> = table.jobs_sorted().iter().map(|j| j.id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
