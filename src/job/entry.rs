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

use super::kind::{JobKind, JobMode, JobResult, JobState};
use crate::error::Error;
use crate::unit::{UnitActiveState, UnitObj};
use bitflags::bitflags;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

bitflags! {
    /// Client-visible job attributes. Merging two jobs ORs these together.
    pub struct JobFlags: u8 {
        /// the client explicitly asked for this job and wants it to prevail
        /// over non-override peers
        const OVERRIDE = 1 << 0;
        /// refuses to be canceled by a conflicting later job
        const IRREVERSIBLE = 1 << 1;
        /// bypass the before/after runnability predicate
        const IGNORE_ORDER = 1 << 2;
    }
}

impl JobFlags {
    /// The flags a job mode implies for every job it installs.
    pub fn from_mode(mode: JobMode) -> JobFlags {
        let mut flags = JobFlags::empty();
        if mode == JobMode::IgnoreDependencies {
            flags |= JobFlags::IGNORE_ORDER;
        }
        if mode == JobMode::ReplaceIrreversible {
            flags |= JobFlags::IRREVERSIBLE;
        }
        flags
    }
}

/// A directed, annotated link recording that the `subject` job's success
/// logically depends on the `object` job. Maintained for the transaction
/// layer; never traversed for scheduling. `subject == None` stands for the
/// anchor job the client explicitly asked for.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct JobDependency {
    ///
    pub subject: Option<u32>,
    ///
    pub object: u32,
    /// failure of the object matters to the subject
    pub matters: bool,
    /// the subject conflicts with the object
    pub conflicts: bool,
}

/// Public snapshot of a job.
#[derive(Clone, Debug)]
pub struct JobInfo {
    ///
    pub id: u32,
    /// name of the unit the job operates on
    pub unit: String,
    ///
    pub kind: JobKind,
    ///
    pub state: JobState,
    ///
    pub flags: JobFlags,
    /// terminal result, recorded at finish
    pub result: Option<JobResult>,
}

impl JobInfo {
    pub(super) fn map(job: &Job) -> JobInfo {
        JobInfo {
            id: job.id(),
            unit: job.unit().id(),
            kind: job.kind(),
            state: job.state(),
            flags: job.flags(),
            result: job.result(),
        }
    }
}

pub(super) struct Job {
    // key: input
    id: u32,

    // config: input
    unit: Rc<dyn UnitObj>,
    kind: Cell<JobKind>, // patched restart -> start on success
    flags: Cell<JobFlags>,

    // status: self-generated
    state: Cell<JobState>,
    result: Cell<Option<JobResult>>,
    begin_usec: Cell<u64>,
    clients: RefCell<Vec<String>>,

    // bookkeeping bits
    installed: Cell<bool>,
    in_run_queue: Cell<bool>,
    in_dbus_queue: Cell<bool>,
    sent_dbus_new_signal: Cell<bool>,
    reloaded: Cell<bool>,
    timer_armed: Cell<bool>,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Job {
    // nothing
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("unit", &self.unit.id())
            .field("kind", &self.kind)
            .field("flags", &self.flags)
            .field("state", &self.state)
            .field("result", &self.result)
            .finish()
    }
}

impl Job {
    pub(super) fn new(id: u32, unit: Rc<dyn UnitObj>, kind: JobKind, flags: JobFlags) -> Job {
        Job {
            id,
            unit,
            kind: Cell::new(kind),
            flags: Cell::new(flags),
            state: Cell::new(JobState::Waiting),
            result: Cell::new(None),
            begin_usec: Cell::new(0),
            clients: RefCell::new(Vec::new()),
            installed: Cell::new(false),
            in_run_queue: Cell::new(false),
            in_dbus_queue: Cell::new(false),
            sent_dbus_new_signal: Cell::new(false),
            reloaded: Cell::new(false),
            timer_armed: Cell::new(false),
        }
    }

    pub(super) fn id(&self) -> u32 {
        self.id
    }

    pub(super) fn unit(&self) -> &Rc<dyn UnitObj> {
        &self.unit
    }

    pub(super) fn kind(&self) -> JobKind {
        self.kind.get()
    }

    pub(super) fn change_kind(&self, kind: JobKind) {
        log::debug!(
            "Converting job {}/{} -> {}/{}",
            self.unit.id(),
            self.kind.get(),
            self.unit.id(),
            kind
        );
        self.kind.set(kind);
    }

    pub(super) fn flags(&self) -> JobFlags {
        self.flags.get()
    }

    pub(super) fn merge_flags(&self, other: JobFlags) {
        self.flags.set(self.flags.get() | other);
    }

    pub(super) fn state(&self) -> JobState {
        self.state.get()
    }

    pub(super) fn set_state(&self, state: JobState) {
        self.state.set(state);
    }

    pub(super) fn result(&self) -> Option<JobResult> {
        self.result.get()
    }

    pub(super) fn set_result(&self, result: JobResult) {
        self.result.set(Some(result));
    }

    pub(super) fn begin_usec(&self) -> u64 {
        self.begin_usec.get()
    }

    pub(super) fn set_begin_usec(&self, usec: u64) {
        self.begin_usec.set(usec);
    }

    pub(super) fn clients(&self) -> Vec<String> {
        self.clients.borrow().clone()
    }

    pub(super) fn add_client(&self, client: &str) {
        let mut clients = self.clients.borrow_mut();
        if !clients.iter().any(|c| c == client) {
            clients.push(String::from(client));
        }
    }

    pub(super) fn installed(&self) -> bool {
        self.installed.get()
    }

    pub(super) fn set_installed(&self, installed: bool) {
        self.installed.set(installed);
    }

    pub(super) fn in_run_queue(&self) -> bool {
        self.in_run_queue.get()
    }

    pub(super) fn set_in_run_queue(&self, queued: bool) {
        self.in_run_queue.set(queued);
    }

    pub(super) fn in_dbus_queue(&self) -> bool {
        self.in_dbus_queue.get()
    }

    pub(super) fn set_in_dbus_queue(&self, queued: bool) {
        self.in_dbus_queue.set(queued);
    }

    pub(super) fn sent_dbus_new_signal(&self) -> bool {
        self.sent_dbus_new_signal.get()
    }

    pub(super) fn set_sent_dbus_new_signal(&self, sent: bool) {
        self.sent_dbus_new_signal.set(sent);
    }

    pub(super) fn reloaded(&self) -> bool {
        self.reloaded.get()
    }

    pub(super) fn set_reloaded(&self, reloaded: bool) {
        self.reloaded.set(reloaded);
    }

    pub(super) fn timer_armed(&self) -> bool {
        self.timer_armed.get()
    }

    pub(super) fn set_timer_armed(&self, armed: bool) {
        self.timer_armed.set(armed);
    }
}

/// Invoke the unit primitive corresponding to the job kind.
///
/// `Ok(())` means an asynchronous operation is in progress and the unit
/// will report completion later. `Err(None)` means the primitive wants to
/// be retried (the job goes back to waiting). `Err(Some(result))` ends the
/// job with the given result.
pub(super) fn job_trigger_unit(
    unit: &Rc<dyn UnitObj>,
    kind: JobKind,
) -> std::result::Result<(), Option<JobResult>> {
    let ret = match kind {
        JobKind::Start => unit.start(),
        JobKind::Stop | JobKind::Restart => unit.stop(),
        JobKind::Reload => unit.reload(),
        JobKind::VerifyActive => match unit.active_state() {
            s if s.is_active_or_reloading() => Err(Error::UnitActionEAlready),
            UnitActiveState::Activating => Err(Error::UnitActionEAgain),
            _ => Err(Error::UnitActionEBadR),
        },
        JobKind::Nop => Err(Error::UnitActionEAlready), // do nothing
        _ => unreachable!("compound job kinds are collapsed before running"),
    };

    match ret {
        Ok(_) => Ok(()),
        Err(err) => Err(job_trigger_err_to_result(err)),
    }
}

fn job_trigger_err_to_result(err: Error) -> Option<JobResult> {
    match err {
        Error::UnitActionEAgain => None, // re-trigger again
        Error::UnitActionEAlready => Some(JobResult::Done), // over already
        Error::UnitActionEBadR => Some(JobResult::Skipped), // cannot (yet) do this
        Error::UnitActionENoExec => Some(JobResult::Invalid),
        Error::UnitActionEProto => Some(JobResult::Assert),
        Error::UnitActionEOpNotSupp => Some(JobResult::UnSupported),
        _ => Some(JobResult::Failed),
    }
}

/// Log the human-readable outcome of a finished job, preferring the unit
/// kind's own message table over the generic fallbacks.
pub(super) fn job_log_status_message(unit: &Rc<dyn UnitObj>, kind: JobKind, result: JobResult) {
    let format = match unit.status_message(kind, result) {
        Some(f) => f,
        None => match job_fallback_status_message(kind, result) {
            Some(f) => String::from(f),
            None => return,
        },
    };

    let message = format.replace("%s", &unit.description());
    if result == JobResult::Done {
        log::info!("{}", message);
    } else {
        log::error!("{}", message);
    }
}

fn job_fallback_status_message(kind: JobKind, result: JobResult) -> Option<&'static str> {
    use JobKind::*;
    use JobResult::*;
    match (kind, result) {
        (Start, Done) => Some("Started %s."),
        (Start, TimeOut) => Some("Timed out starting %s."),
        (Start, Failed) => Some("Failed to start %s."),
        (Start, Dependency) => Some("Dependency failed for %s."),
        (Start, Assert) => Some("Assertion failed for %s."),
        (Start, UnSupported) => Some("Starting of %s not supported."),
        (Stop, Done) | (Restart, Done) => Some("Stopped %s."),
        (Stop, Failed) | (Restart, Failed) => Some("Stopped (with error) %s."),
        (Stop, TimeOut) | (Restart, TimeOut) => Some("Timed out stopping %s."),
        (Reload, Done) => Some("Reloaded %s."),
        (Reload, Failed) => Some("Reload failed for %s."),
        (Reload, TimeOut) => Some("Timed out reloading %s."),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::test_utils::{as_obj, StubAction, TestUnit};

    #[test]
    fn flags_merge_by_or() {
        let job = Job::new(
            1,
            as_obj(&TestUnit::new("test1.service")),
            JobKind::Start,
            JobFlags::OVERRIDE,
        );
        job.merge_flags(JobFlags::IRREVERSIBLE);
        assert!(job.flags().contains(JobFlags::OVERRIDE));
        assert!(job.flags().contains(JobFlags::IRREVERSIBLE));
        assert!(!job.flags().contains(JobFlags::IGNORE_ORDER));
    }

    #[test]
    fn flags_from_mode() {
        assert_eq!(
            JobFlags::from_mode(JobMode::IgnoreDependencies),
            JobFlags::IGNORE_ORDER
        );
        assert_eq!(
            JobFlags::from_mode(JobMode::ReplaceIrreversible),
            JobFlags::IRREVERSIBLE
        );
        assert_eq!(JobFlags::from_mode(JobMode::Replace), JobFlags::empty());
    }

    #[test]
    fn trigger_maps_sentinels() {
        let unit = TestUnit::new("test1.service");
        let obj = as_obj(&unit);

        unit.set_start(StubAction::Queued);
        assert_eq!(job_trigger_unit(&obj, JobKind::Start), Ok(()));

        unit.set_start(StubAction::Already);
        assert_eq!(
            job_trigger_unit(&obj, JobKind::Start),
            Err(Some(JobResult::Done))
        );

        unit.set_start(StubAction::Again);
        assert_eq!(job_trigger_unit(&obj, JobKind::Start), Err(None));

        unit.set_start(StubAction::BadRequest);
        assert_eq!(
            job_trigger_unit(&obj, JobKind::Start),
            Err(Some(JobResult::Skipped))
        );

        unit.set_start(StubAction::NoExec);
        assert_eq!(
            job_trigger_unit(&obj, JobKind::Start),
            Err(Some(JobResult::Invalid))
        );

        unit.set_start(StubAction::AssertFailed);
        assert_eq!(
            job_trigger_unit(&obj, JobKind::Start),
            Err(Some(JobResult::Assert))
        );

        unit.set_start(StubAction::NotSupported);
        assert_eq!(
            job_trigger_unit(&obj, JobKind::Start),
            Err(Some(JobResult::UnSupported))
        );

        unit.set_start(StubAction::Failed);
        assert_eq!(
            job_trigger_unit(&obj, JobKind::Start),
            Err(Some(JobResult::Failed))
        );

        // restart drives the stop primitive first
        unit.set_stop(StubAction::Queued);
        assert_eq!(job_trigger_unit(&obj, JobKind::Restart), Ok(()));
        assert_eq!(unit.stop_calls.get(), 1);
        assert_eq!(unit.start_calls.get(), 8);
    }

    #[test]
    fn trigger_synthesizes_verify_and_nop() {
        let unit = TestUnit::new("test1.service");
        let obj = as_obj(&unit);

        unit.set_state(UnitActiveState::Active);
        assert_eq!(
            job_trigger_unit(&obj, JobKind::VerifyActive),
            Err(Some(JobResult::Done))
        );

        unit.set_state(UnitActiveState::Activating);
        assert_eq!(job_trigger_unit(&obj, JobKind::VerifyActive), Err(None));

        unit.set_state(UnitActiveState::InActive);
        assert_eq!(
            job_trigger_unit(&obj, JobKind::VerifyActive),
            Err(Some(JobResult::Skipped))
        );

        assert_eq!(
            job_trigger_unit(&obj, JobKind::Nop),
            Err(Some(JobResult::Done))
        );
        assert_eq!(unit.start_calls.get(), 0);
        assert_eq!(unit.stop_calls.get(), 0);
    }

    #[test]
    fn fallback_status_messages() {
        assert_eq!(
            job_fallback_status_message(JobKind::Start, JobResult::Done),
            Some("Started %s.")
        );
        assert_eq!(
            job_fallback_status_message(JobKind::Restart, JobResult::Done),
            Some("Stopped %s.")
        );
        assert_eq!(
            job_fallback_status_message(JobKind::Start, JobResult::Canceled),
            None
        );
        assert_eq!(
            job_fallback_status_message(JobKind::Nop, JobResult::Done),
            None
        );
    }
}
