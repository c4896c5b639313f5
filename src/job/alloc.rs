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

use super::entry::{Job, JobFlags};
use super::kind::JobKind;
use crate::unit::UnitObj;
use std::cell::RefCell;
use std::rc::Rc;

pub(super) struct JobAlloc {
    // owned objects
    data: RefCell<JobAllocData>,
}

impl JobAlloc {
    pub(super) fn new() -> JobAlloc {
        JobAlloc {
            data: RefCell::new(JobAllocData::new()),
        }
    }

    pub(super) fn clear(&self) {
        self.data.borrow_mut().clear();
    }

    pub(super) fn alloc(&self, unit: &Rc<dyn UnitObj>, kind: JobKind, flags: JobFlags) -> Rc<Job> {
        let id = self.data.borrow_mut().alloc_id();
        Rc::new(Job::new(id, Rc::clone(unit), kind, flags))
    }

    /// Re-create a job under its serialized id, keeping the allocator above
    /// every id seen so far.
    pub(super) fn alloc_with_id(
        &self,
        id: u32,
        unit: &Rc<dyn UnitObj>,
        kind: JobKind,
        flags: JobFlags,
    ) -> Rc<Job> {
        self.data.borrow_mut().bump_floor(id);
        Rc::new(Job::new(id, Rc::clone(unit), kind, flags))
    }
}

#[derive(Debug)]
struct JobAllocData {
    // status
    next_id: u32,
}

// the declaration "pub(self)" is for identification only.
impl JobAllocData {
    pub(self) fn new() -> JobAllocData {
        JobAllocData { next_id: 1 }
    }

    pub(self) fn clear(&mut self) {
        self.next_id = 1;
    }

    pub(self) fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    pub(self) fn bump_floor(&mut self, id: u32) {
        if id >= self.next_id {
            self.next_id = id.wrapping_add(1);
        }
    }
}
