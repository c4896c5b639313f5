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

//! Programmable stand-ins for the external collaborators, used by the
//! engine's tests: a scriptable unit, a name-keyed unit registry and an
//! event loop that records what the engine arms.

use crate::error::{Error, Result};
use crate::events::EventLoop;
use crate::unit::{EmergencyAction, UnitActiveState, UnitDb, UnitObj, UnitRelationAtom};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Scripted outcome of a unit primitive.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug)]
pub enum StubAction {
    /// `Ok(())`: asynchronous operation in progress.
    Queued,
    Already,
    Again,
    BadRequest,
    NoExec,
    AssertFailed,
    NotSupported,
    Failed,
}

impl StubAction {
    fn to_result(self) -> Result<()> {
        match self {
            StubAction::Queued => Ok(()),
            StubAction::Already => Err(Error::UnitActionEAlready),
            StubAction::Again => Err(Error::UnitActionEAgain),
            StubAction::BadRequest => Err(Error::UnitActionEBadR),
            StubAction::NoExec => Err(Error::UnitActionENoExec),
            StubAction::AssertFailed => Err(Error::UnitActionEProto),
            StubAction::NotSupported => Err(Error::UnitActionEOpNotSupp),
            StubAction::Failed => Err(Error::UnitActionEFailed),
        }
    }
}

/// A unit whose state, primitive outcomes and dependency edges are set by
/// the test.
pub struct TestUnit {
    name: String,
    state: Cell<UnitActiveState>,
    on_start: Cell<StubAction>,
    on_stop: Cell<StubAction>,
    on_reload: Cell<StubAction>,
    job_timeout: Cell<u64>,
    timeout_action: Cell<EmergencyAction>,
    deps: RefCell<HashMap<UnitRelationAtom, Vec<String>>>,

    /// primitive invocation counters
    pub start_calls: Cell<u32>,
    ///
    pub stop_calls: Cell<u32>,
    ///
    pub reload_calls: Cell<u32>,
    ///
    pub on_failure_calls: Cell<u32>,
}

impl TestUnit {
    ///
    pub fn new(name: &str) -> Rc<TestUnit> {
        Rc::new(TestUnit {
            name: String::from(name),
            state: Cell::new(UnitActiveState::InActive),
            on_start: Cell::new(StubAction::Queued),
            on_stop: Cell::new(StubAction::Queued),
            on_reload: Cell::new(StubAction::Queued),
            job_timeout: Cell::new(0),
            timeout_action: Cell::new(EmergencyAction::None),
            deps: RefCell::new(HashMap::new()),
            start_calls: Cell::new(0),
            stop_calls: Cell::new(0),
            reload_calls: Cell::new(0),
            on_failure_calls: Cell::new(0),
        })
    }

    ///
    pub fn set_state(&self, state: UnitActiveState) {
        self.state.set(state);
    }

    ///
    pub fn set_start(&self, action: StubAction) {
        self.on_start.set(action);
    }

    ///
    pub fn set_stop(&self, action: StubAction) {
        self.on_stop.set(action);
    }

    ///
    pub fn set_reload(&self, action: StubAction) {
        self.on_reload.set(action);
    }

    ///
    pub fn set_job_timeout(&self, usec: u64) {
        self.job_timeout.set(usec);
    }

    ///
    pub fn set_timeout_action(&self, action: EmergencyAction) {
        self.timeout_action.set(action);
    }

    ///
    pub fn set_deps(&self, atom: UnitRelationAtom, names: &[&str]) {
        self.deps
            .borrow_mut()
            .insert(atom, names.iter().map(|n| String::from(*n)).collect());
    }
}

impl UnitObj for TestUnit {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        self.name.clone()
    }

    fn active_state(&self) -> UnitActiveState {
        self.state.get()
    }

    fn start(&self) -> Result<()> {
        self.start_calls.set(self.start_calls.get() + 1);
        self.on_start.get().to_result()
    }

    fn stop(&self) -> Result<()> {
        self.stop_calls.set(self.stop_calls.get() + 1);
        self.on_stop.get().to_result()
    }

    fn reload(&self) -> Result<()> {
        self.reload_calls.set(self.reload_calls.get() + 1);
        self.on_reload.get().to_result()
    }

    fn job_timeout(&self) -> u64 {
        self.job_timeout.get()
    }

    fn job_timeout_action(&self) -> EmergencyAction {
        self.timeout_action.get()
    }

    fn start_on_failure(&self) {
        self.on_failure_calls.set(self.on_failure_calls.get() + 1);
    }

    fn deps(&self, atom: UnitRelationAtom) -> Vec<String> {
        self.deps.borrow().get(&atom).cloned().unwrap_or_default()
    }
}

/// Name-keyed registry of test units.
#[derive(Default)]
pub struct TestDb {
    units: RefCell<HashMap<String, Rc<TestUnit>>>,
}

impl TestDb {
    ///
    pub fn new() -> Rc<TestDb> {
        Rc::new(TestDb::default())
    }

    ///
    pub fn insert(&self, unit: &Rc<TestUnit>) {
        self.units
            .borrow_mut()
            .insert(unit.id(), Rc::clone(unit));
    }
}

impl UnitDb for TestDb {
    fn get(&self, id: &str) -> Option<Rc<dyn UnitObj>> {
        self.units
            .borrow()
            .get(id)
            .map(|u| Rc::clone(u) as Rc<dyn UnitObj>)
    }
}

/// An event loop that records what the engine arms instead of running it.
#[derive(Default)]
pub struct TestLoop {
    ///
    pub dispatches: Cell<u32>,
    timers: RefCell<HashMap<u32, u64>>,
}

impl TestLoop {
    ///
    pub fn new() -> Rc<TestLoop> {
        Rc::new(TestLoop::default())
    }

    ///
    pub fn armed_timer(&self, job_id: u32) -> Option<u64> {
        self.timers.borrow().get(&job_id).copied()
    }
}

impl EventLoop for TestLoop {
    fn arm_dispatch(&self) {
        self.dispatches.set(self.dispatches.get() + 1);
    }

    fn arm_timer(&self, job_id: u32, deadline_usec: u64) {
        self.timers.borrow_mut().insert(job_id, deadline_usec);
    }

    fn disarm_timer(&self, job_id: u32) {
        self.timers.borrow_mut().remove(&job_id);
    }
}

/// The unit handle the engine operates on.
pub fn as_obj(unit: &Rc<TestUnit>) -> Rc<dyn UnitObj> {
    Rc::clone(unit) as Rc<dyn UnitObj>
}
