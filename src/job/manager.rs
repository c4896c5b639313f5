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

use super::alloc::JobAlloc;
use super::entry::{self, Job, JobDependency, JobFlags, JobInfo};
use super::kind::{self, JobKind, JobMode, JobResult, JobState};
use super::notify::{JobNotify, JobSignal};
use super::rentry::{self, JobFrame};
use super::stat::{JobStat, JobStatSnapshot};
use super::table::JobTable;
use crate::error::{Error, Result};
use crate::events::{monotonic_usec, EventLoop};
use crate::unit::{EmergencyAction, UnitDb, UnitObj, UnitRelationAtom};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::rc::Rc;

/// The job engine.
///
/// One value tree per manager, no globals. All state is owned by this
/// struct and mutated from the single event-loop thread; external
/// producers reach it only through the operation surface below.
pub struct JobManager {
    // associated objects
    events: Rc<dyn EventLoop>,
    db: Rc<dyn UnitDb>,

    // owned objects
    ja: JobAlloc,
    jobs: JobTable,
    run_queue: RefCell<VecDeque<Rc<Job>>>,
    notify: JobNotify,
    deps: RefCell<Vec<JobDependency>>,
    pending_finished: RefCell<Vec<Rc<Job>>>,

    // status
    n_reloading: Cell<u32>,

    // statistics
    stat: JobStat,
}

impl JobManager {
    ///
    pub fn new(eventsr: &Rc<dyn EventLoop>, dbr: &Rc<dyn UnitDb>) -> JobManager {
        JobManager {
            events: Rc::clone(eventsr),
            db: Rc::clone(dbr),
            ja: JobAlloc::new(),
            jobs: JobTable::new(),
            run_queue: RefCell::new(VecDeque::new()),
            notify: JobNotify::new(),
            deps: RefCell::new(Vec::new()),
            pending_finished: RefCell::new(Vec::new()),
            n_reloading: Cell::new(0),
            stat: JobStat::new(),
        }
    }

    /// Install a job for the unit, reconciling it against whatever the
    /// unit's slot already holds. Returns the id of the job that now
    /// represents the request: a fresh one, or the incumbent it was merged
    /// into.
    pub fn install(
        &self,
        unit: &Rc<dyn UnitObj>,
        kind: JobKind,
        mode: JobMode,
        flags: JobFlags,
    ) -> Result<u32> {
        let kind = kind::collapse(kind, unit.active_state());
        let flags = flags | JobFlags::from_mode(mode);

        let slot_was_empty = self
            .jobs
            .unit_entry(&unit.id())
            .map_or(true, |ju| ju.slot(kind).is_none());

        let new = self.ja.alloc(unit, kind, flags);
        let job = self.do_install(new, mode)?;

        self.notify.enqueue(&job);
        self.start_timer(&job);
        if job.state() == JobState::Waiting {
            self.add_to_run_queue(&job);
        }

        let id = job.id();
        if slot_was_empty && kind != JobKind::Nop && kind::is_redundant(kind, unit.active_state())
        {
            // the desired effect already holds; nop stays out of this and
            // travels the run queue
            self.finish_and_invalidate(&job, JobResult::Done, true, true);
        }

        Ok(id)
    }

    /// Cancel the job, finishing it with result `canceled`.
    pub fn cancel(&self, id: u32, recursive: bool) -> Result<()> {
        let job = self.jobs.get(id).ok_or(Error::NotExisted)?;
        self.finish_and_invalidate(&job, JobResult::Canceled, recursive, false);
        Ok(())
    }

    /// Finish the job with the given result. Normally called by unit code
    /// once an asynchronous primitive reaches a terminal state.
    pub fn finish(&self, id: u32, result: JobResult, recursive: bool, already: bool) -> Result<()> {
        let job = self.jobs.get(id).ok_or(Error::NotExisted)?;
        self.finish_and_invalidate(&job, result, recursive, already);
        Ok(())
    }

    ///
    pub fn get_jobinfo(&self, id: u32) -> Option<JobInfo> {
        self.jobs.get(id).map(|job| JobInfo::map(&job))
    }

    /// The earliest deadline attached to the job: its own timer or the
    /// unit-supplied one, whichever comes first.
    pub fn get_timeout(&self, id: u32) -> Option<u64> {
        let job = self.jobs.get(id)?;
        let timer = if job.timer_armed() {
            Some(job.begin_usec().saturating_add(job.unit().job_timeout()))
        } else {
            None
        };
        match (timer, job.unit().get_timeout()) {
            (Some(x), Some(y)) => Some(x.min(y)),
            (Some(x), None) => Some(x),
            (None, Some(y)) => Some(y),
            (None, None) => None,
        }
    }

    /// One dispatch pass: try to run every queued job. Jobs that are not
    /// runnable yet stay installed and off the queue; the completion of an
    /// ordering neighbor puts them back.
    pub fn dispatch_run_queue(&self) {
        loop {
            let job = self.run_queue.borrow_mut().pop_front();
            let job = match job {
                Some(job) => {
                    job.set_in_run_queue(false);
                    job
                }
                None => break,
            };
            self.run_and_invalidate(&job);
        }
    }

    /// The per-job timeout fired. Finishes the job with result `timeout`
    /// and hands back the emergency action the unit declared for this
    /// case, for the embedding manager to execute.
    pub fn dispatch_timer(&self, id: u32) -> Option<(EmergencyAction, Option<String>)> {
        let job = self.jobs.get(id)?;
        let unit = Rc::clone(job.unit());
        log::warn!("Job {}/{} timed out.", unit.id(), job.kind());

        job.set_timer_armed(false); // the one-shot has fired
        self.finish_and_invalidate(&job, JobResult::TimeOut, true, false);

        Some((unit.job_timeout_action(), unit.job_timeout_reboot_arg()))
    }

    /// Record a dependency link between two installed jobs. The engine
    /// keeps the list for the transaction layer and drops links as their
    /// endpoints go away; it never schedules from them.
    pub fn dependency_new(
        &self,
        subject: Option<u32>,
        object: u32,
        matters: bool,
        conflicts: bool,
    ) -> Result<()> {
        if let Some(s) = subject {
            self.jobs.get(s).ok_or(Error::NotExisted)?;
        }
        self.jobs.get(object).ok_or(Error::NotExisted)?;

        self.deps.borrow_mut().push(JobDependency {
            subject,
            object,
            matters,
            conflicts,
        });
        Ok(())
    }

    /// The dependency links the job participates in, as subject or object.
    pub fn job_dependencies(&self, id: u32) -> Vec<JobDependency> {
        self.deps
            .borrow()
            .iter()
            .filter(|l| l.subject == Some(id) || l.object == id)
            .copied()
            .collect()
    }

    /// Track a client subscribed to the job; preserved across live-reload.
    pub fn subscribe(&self, id: u32, client: &str) -> Result<()> {
        let job = self.jobs.get(id).ok_or(Error::NotExisted)?;
        job.add_client(client);
        Ok(())
    }

    /// Write every installed job to the stream as reload entries.
    pub fn serialize(&self, w: &mut dyn Write) -> Result<()> {
        for job in self.jobs.jobs_sorted() {
            rentry::serialize_job(&job, w)?;
        }
        Ok(())
    }

    /// Rebuild jobs from a serialized stream. A job whose unit is gone or
    /// whose slot is already occupied is dropped with a log line; the rest
    /// of the stream is still consumed.
    pub fn deserialize(&self, r: &mut dyn BufRead) -> Result<()> {
        loop {
            match rentry::deserialize_job(r) {
                Ok(Some(frame)) => {
                    if let Err(e) = self.install_deserialized(&frame) {
                        log::debug!(
                            "Not installing deserialized job {} for unit {}: {}",
                            frame.id,
                            frame.unit,
                            e
                        );
                    }
                }
                Ok(None) => break,
                Err(Error::Input) => {
                    log::debug!("Skipping malformed job block in serialization stream.");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// After deserialization: requeue waiting jobs and re-arm timers from
    /// the preserved begin timestamps.
    pub fn coldplug(&self) {
        for job in self.jobs.jobs_sorted() {
            if job.state() == JobState::Waiting {
                self.add_to_run_queue(&job);
            }

            if job.begin_usec() == 0 || job.unit().job_timeout() == 0 {
                continue;
            }

            if job.timer_armed() {
                self.events.disarm_timer(job.id());
            }
            self.events
                .arm_timer(job.id(), job.begin_usec().saturating_add(job.unit().job_timeout()));
            job.set_timer_armed(true);
        }
    }

    /// Enter a live-reload section: client signals are held back and jobs
    /// carried over from the previous manager instance are preserved on
    /// finish.
    pub fn begin_reload(&self) {
        self.n_reloading.set(self.n_reloading.get() + 1);
    }

    /// Leave the live-reload section, releasing the removal signals of
    /// every carried-over job that finished while it lasted.
    pub fn end_reload(&self) {
        let n = self.n_reloading.get();
        assert!(n > 0, "end_reload without begin_reload");
        self.n_reloading.set(n - 1);

        if self.n_reloading.get() == 0 {
            let pending = std::mem::take(&mut *self.pending_finished.borrow_mut());
            for job in pending {
                self.notify.send_removed(&job);
            }
        }
    }

    /// Hand accumulated client notifications to the IPC adapter. Held back
    /// entirely while a live-reload is in progress.
    pub fn flush_signals(&self) -> Vec<JobSignal> {
        if self.n_reloading.get() > 0 {
            return Vec::new();
        }
        self.notify.flush()
    }

    ///
    pub fn stat(&self) -> JobStatSnapshot {
        self.stat.snapshot()
    }

    ///
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    ///
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Whether any job, regular or nop, is installed for the unit.
    pub fn has_job(&self, unit_name: &str) -> bool {
        self.jobs.unit_entry(unit_name).is_some()
    }

    ///
    pub fn has_stop_job(&self, unit_name: &str) -> bool {
        self.jobs
            .regular_job(unit_name)
            .map_or(false, |j| matches!(j.kind(), JobKind::Stop))
    }

    ///
    pub fn has_start_like_job(&self, unit_name: &str) -> bool {
        self.jobs
            .regular_job(unit_name)
            .map_or(false, |j| matches!(j.kind(), JobKind::Start | JobKind::Restart))
    }

    /// Drop every job and queue without finishing anything. Used when the
    /// embedding manager tears the engine down.
    pub fn clear(&self) {
        for job in self.run_queue.borrow_mut().drain(..) {
            job.set_in_run_queue(false);
        }
        self.notify.clear();
        for job in self.jobs.jobs_sorted() {
            if job.timer_armed() {
                self.events.disarm_timer(job.id());
                job.set_timer_armed(false);
            }
            job.set_installed(false);
        }
        self.jobs.clear();
        self.deps.borrow_mut().clear();
        self.pending_finished.borrow_mut().clear();
        self.ja.clear();
        self.stat.clear();
    }

    fn do_install(&self, new: Rc<Job>, mode: JobMode) -> Result<Rc<Job>> {
        assert!(!new.installed());
        assert_eq!(new.state(), JobState::Waiting);

        loop {
            let ju = self.jobs.unit_entry_pad(new.unit());
            let uj = match ju.slot(new.kind()) {
                Some(uj) => uj,
                None => {
                    // install the job
                    self.jobs.insert(Rc::clone(&new))?;
                    new.set_installed(true);
                    self.stat.installed_inc();
                    log::debug!(
                        "Installed new job {}/{} as {}",
                        new.unit().id(),
                        new.kind(),
                        new.id()
                    );
                    return Ok(new);
                }
            };

            if kind::is_conflicting(uj.kind(), new.kind()) {
                if uj.flags().contains(JobFlags::IRREVERSIBLE) || mode == JobMode::Fail {
                    return Err(Error::Conflict);
                }
                self.finish_and_invalidate(&uj, JobResult::Canceled, false, false);
                continue; // the slot is now empty
            }

            // not conflicting, i.e. mergeable
            if uj.state() == JobState::Waiting
                || (kind::allows_late_merge(new.kind()) && kind::is_superset(uj.kind(), new.kind()))
            {
                self.merge_into_installed(&uj, &new);
                log::debug!(
                    "Merged into installed job {}/{} as {}",
                    uj.unit().id(),
                    uj.kind(),
                    uj.id()
                );
                return Ok(uj);
            }

            // already running and not safe to merge into; patch the
            // incumbent into the merged job and re-run it
            self.merge_into_installed(&uj, &new);
            log::debug!(
                "Merged into running job, re-running: {}/{} as {}",
                uj.unit().id(),
                uj.kind(),
                uj.id()
            );
            self.set_state(&uj, JobState::Waiting);
            return Ok(uj);
        }
    }

    fn merge_into_installed(&self, uj: &Rc<Job>, other: &Job) {
        assert!(uj.installed());

        if uj.kind() != JobKind::Nop {
            let merged = kind::merge_and_collapse(
                uj.kind(),
                other.kind(),
                uj.unit().active_state(),
            );
            match merged {
                Some(t) if t != uj.kind() => uj.change_kind(t),
                Some(_) => {}
                None => unreachable!("merging conflicting job kinds"),
            }
        } else {
            assert_eq!(other.kind(), JobKind::Nop);
        }

        uj.merge_flags(other.flags());
    }

    fn install_deserialized(&self, frame: &JobFrame) -> Result<()> {
        if !kind::job_kind_is_basic(frame.kind) {
            return Err(Error::Input);
        }

        let unit = self.db.get(&frame.unit).ok_or(Error::NotExisted)?;
        if let Some(ju) = self.jobs.unit_entry(&frame.unit) {
            if ju.slot(frame.kind).is_some() {
                return Err(Error::Exists);
            }
        }

        let job = self
            .ja
            .alloc_with_id(frame.id, &unit, frame.kind, frame.flags);
        job.set_state(frame.state);
        job.set_begin_usec(frame.begin_usec);
        job.set_sent_dbus_new_signal(frame.sent_dbus_new_signal);
        for client in frame.clients.iter() {
            job.add_client(client);
        }

        self.jobs.insert(Rc::clone(&job))?;
        job.set_installed(true);
        job.set_reloaded(true);
        if job.state() == JobState::Running {
            self.stat.running_inc();
        }

        log::debug!(
            "Reinstalled deserialized job {}/{} as {}",
            unit.id(),
            job.kind(),
            job.id()
        );
        Ok(())
    }

    fn run_and_invalidate(&self, job: &Rc<Job>) {
        assert!(job.installed());

        if job.state() != JobState::Waiting {
            return; // a prior pass already handled it
        }

        if !self.is_runnable(job) {
            // stays installed; the completion of a peer requeues it
            return;
        }

        self.set_state(job, JobState::Running);
        self.notify.enqueue(job);

        // driving the primitive can run arbitrary unit callbacks which may
        // cancel or replace this very job; hold the id, not the reference
        let id = job.id();
        let trigger = entry::job_trigger_unit(job.unit(), job.kind());

        let job = match self.jobs.get(id) {
            Some(job) => job,
            None => return,
        };
        match trigger {
            Ok(()) => {} // asynchronous completion will finish it
            Err(None) => self.set_state(&job, JobState::Waiting), // wants to be retried
            Err(Some(JobResult::Done)) => {
                self.finish_and_invalidate(&job, JobResult::Done, true, true)
            }
            Err(Some(result)) => self.finish_and_invalidate(&job, result, true, false),
        }
    }

    fn is_runnable(&self, job: &Rc<Job>) -> bool {
        assert!(job.installed());

        if job.flags().contains(JobFlags::IGNORE_ORDER) {
            return true;
        }

        if job.kind() == JobKind::Nop {
            return true;
        }

        let unit = job.unit();
        if matches!(
            job.kind(),
            JobKind::Start | JobKind::VerifyActive | JobKind::Reload
        ) {
            // the job is or might be starting something; wait for every
            // after-peer with work in flight, whatever that work is
            for other in unit.deps(UnitRelationAtom::After) {
                if self.jobs.regular_job(&other).is_some() {
                    return false;
                }
            }
        }

        // if something we precede is being stopped, it goes first
        for other in unit.deps(UnitRelationAtom::Before) {
            if let Some(peer) = self.jobs.regular_job(&other) {
                if matches!(peer.kind(), JobKind::Stop | JobKind::Restart) {
                    return false;
                }
            }
        }

        true
    }

    /// The propagation kernel. Records the result, patches restarts back
    /// into starts, uninstalls, cascades failure along requirement edges
    /// and requeues ordering neighbors.
    fn finish_and_invalidate(&self, job: &Rc<Job>, result: JobResult, recursive: bool, already: bool) {
        assert!(job.installed());

        let unit = Rc::clone(job.unit());
        let t = job.kind();

        job.set_result(result);
        log::debug!(
            "Job {}/{} finished, result={}",
            unit.id(),
            t,
            result
        );

        // a job that did nothing to its unit gets no status banner
        if !already {
            entry::job_log_status_message(&unit, t, result);
        }

        self.notify.enqueue(job);

        // patch restart jobs so that they become normal start jobs
        if result == JobResult::Done && t == JobKind::Restart {
            job.change_kind(JobKind::Start);
            self.set_state(job, JobState::Waiting);
            self.add_to_run_queue(job);
            self.requeue_neighbors(&unit);
            return;
        }

        if result == JobResult::Failed || result == JobResult::Invalid {
            self.stat.failed_inc();
        }

        self.uninstall(job);

        // remember jobs started before the reload
        if self.n_reloading.get() > 0 && job.reloaded() {
            self.pending_finished.borrow_mut().push(Rc::clone(job));
        }

        // fail depending jobs on failure
        if recursive && result != JobResult::Done {
            if t == JobKind::Start || t == JobKind::VerifyActive {
                self.fail_dependents(&unit, UnitRelationAtom::RequiredBy, false);
                self.fail_dependents(&unit, UnitRelationAtom::BoundBy, false);
                self.fail_dependents(&unit, UnitRelationAtom::RequiredByOverridable, true);
            } else if t == JobKind::Stop {
                self.fail_dependents(&unit, UnitRelationAtom::ConflictedBy, false);
            }
        }

        // canceled is a user action and failed is already handled by the
        // unit itself; neither fires the on-failure hook
        if result == JobResult::TimeOut || result == JobResult::Dependency {
            log::warn!("Job {}/{} failed with result '{}'.", unit.id(), t, result);
            unit.start_on_failure();
        }

        self.requeue_neighbors(&unit);
    }

    fn fail_dependents(&self, unit: &Rc<dyn UnitObj>, atom: UnitRelationAtom, skip_override: bool) {
        for other in unit.deps(atom) {
            let peer = match self.jobs.regular_job(&other) {
                Some(peer) => peer,
                None => continue,
            };
            if !matches!(peer.kind(), JobKind::Start | JobKind::VerifyActive) {
                continue;
            }
            if skip_override && peer.flags().contains(JobFlags::OVERRIDE) {
                continue;
            }
            self.finish_and_invalidate(&peer, JobResult::Dependency, true, false);
        }
    }

    /// Completion of a job on this unit is the only thing that can make an
    /// ordering-adjacent job runnable; put them all back on the queue.
    fn requeue_neighbors(&self, unit: &Rc<dyn UnitObj>) {
        for atom in [UnitRelationAtom::After, UnitRelationAtom::Before] {
            for other in unit.deps(atom) {
                if let Some(peer) = self.jobs.regular_job(&other) {
                    self.add_to_run_queue(&peer);
                }
            }
        }
    }

    fn uninstall(&self, job: &Rc<Job>) {
        assert!(job.installed());

        self.set_state(job, JobState::Waiting);
        self.jobs.remove(job);

        // daemon-reload should be transparent to job observers
        self.notify.dequeue(job);
        if self.n_reloading.get() == 0 {
            self.notify.send_removed(job);
        }

        job.set_installed(false);
        self.remove_from_run_queue(job);
        self.drop_timer(job);
        self.deps
            .borrow_mut()
            .retain(|l| l.subject != Some(job.id()) && l.object != job.id());
    }

    fn set_state(&self, job: &Rc<Job>, state: JobState) {
        if job.state() == state {
            return;
        }

        job.set_state(state);

        if !job.installed() {
            return;
        }

        match state {
            JobState::Running => self.stat.running_inc(),
            JobState::Waiting => self.stat.running_dec(),
        }
    }

    fn add_to_run_queue(&self, job: &Rc<Job>) {
        assert!(job.installed());

        if job.in_run_queue() {
            return;
        }

        let was_empty = self.run_queue.borrow().is_empty();
        self.run_queue.borrow_mut().push_front(Rc::clone(job));
        job.set_in_run_queue(true);

        if was_empty {
            self.events.arm_dispatch();
        }
    }

    fn remove_from_run_queue(&self, job: &Rc<Job>) {
        if !job.in_run_queue() {
            return;
        }

        self.run_queue.borrow_mut().retain(|j| !Rc::ptr_eq(j, job));
        job.set_in_run_queue(false);
    }

    fn start_timer(&self, job: &Rc<Job>) {
        if job.timer_armed() {
            return;
        }

        job.set_begin_usec(monotonic_usec());

        let timeout = job.unit().job_timeout();
        if timeout == 0 {
            return;
        }

        self.events
            .arm_timer(job.id(), job.begin_usec().saturating_add(timeout));
        job.set_timer_armed(true);
    }

    fn drop_timer(&self, job: &Rc<Job>) {
        if !job.timer_armed() {
            return;
        }

        self.events.disarm_timer(job.id());
        job.set_timer_armed(false);
    }
}
