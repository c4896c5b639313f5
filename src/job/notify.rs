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
use super::kind::JobResult;
use std::cell::RefCell;
use std::rc::Rc;

/// What happened to a job, as seen by subscribed clients.
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum JobSignalOp {
    New,
    Changed,
    Removed,
}

/// One queued client notification.
#[derive(Clone, Debug)]
pub struct JobSignal {
    ///
    pub op: JobSignalOp,
    ///
    pub id: u32,
    /// name of the unit the job operates on
    pub unit: String,
    /// bus object path of the job
    pub path: String,
    /// terminal result, carried by `Removed` signals
    pub result: Option<JobResult>,
}

/// The bus object path of a job. Existing clients depend on exactly this
/// encoding.
pub fn job_object_path(id: u32) -> String {
    format!("/org/freedesktop/systemd1/job/{}", id)
}

/// Queue of pending client notifications.
///
/// Jobs are queued for a `New`-or-`Changed` emission and drained when the
/// event loop goes idle; `Removed` is recorded at uninstall time, always
/// preceded by the job's `New` if that was never sent.
pub(super) struct JobNotify {
    // owned objects
    queue: RefCell<Vec<Rc<Job>>>,       // jobs with a pending new/changed signal
    signals: RefCell<Vec<JobSignal>>,   // emitted, not yet collected
}

impl JobNotify {
    pub(super) fn new() -> JobNotify {
        JobNotify {
            queue: RefCell::new(Vec::new()),
            signals: RefCell::new(Vec::new()),
        }
    }

    pub(super) fn clear(&self) {
        for job in self.queue.borrow_mut().drain(..) {
            job.set_in_dbus_queue(false);
        }
        self.signals.borrow_mut().clear();
    }

    /// Queue a `new`/`changed` emission for the job. The distinction is
    /// made at flush time from the job's sent-new bit.
    pub(super) fn enqueue(&self, job: &Rc<Job>) {
        assert!(job.installed());

        if job.in_dbus_queue() {
            return;
        }

        self.queue.borrow_mut().push(Rc::clone(job));
        job.set_in_dbus_queue(true);
    }

    /// Drop the job from the pending queue without emitting anything.
    pub(super) fn dequeue(&self, job: &Rc<Job>) {
        if !job.in_dbus_queue() {
            return;
        }

        self.queue.borrow_mut().retain(|j| !Rc::ptr_eq(j, job));
        job.set_in_dbus_queue(false);
    }

    /// Record the removal of a job. Clients that never saw the job get its
    /// `New` first so every `Removed` refers to a known object.
    pub(super) fn send_removed(&self, job: &Rc<Job>) {
        let mut signals = self.signals.borrow_mut();
        if !job.sent_dbus_new_signal() {
            signals.push(signal(JobSignalOp::New, job, None));
            job.set_sent_dbus_new_signal(true);
        }
        signals.push(signal(JobSignalOp::Removed, job, job.result()));
    }

    /// Drain the pending queue into concrete signals and hand everything
    /// accumulated so far to the caller.
    pub(super) fn flush(&self) -> Vec<JobSignal> {
        let queue = std::mem::take(&mut *self.queue.borrow_mut());
        for job in queue {
            job.set_in_dbus_queue(false);
            let op = if job.sent_dbus_new_signal() {
                JobSignalOp::Changed
            } else {
                job.set_sent_dbus_new_signal(true);
                JobSignalOp::New
            };
            self.signals.borrow_mut().push(signal(op, &job, None));
        }

        std::mem::take(&mut *self.signals.borrow_mut())
    }
}

fn signal(op: JobSignalOp, job: &Rc<Job>, result: Option<JobResult>) -> JobSignal {
    JobSignal {
        op,
        id: job.id(),
        unit: job.unit().id(),
        path: job_object_path(job.id()),
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::super::entry::JobFlags;
    use super::super::kind::JobKind;
    use super::*;
    use crate::unit::test_utils::{as_obj, TestUnit};

    fn installed_job(id: u32) -> Rc<Job> {
        let unit = TestUnit::new("test1.service");
        let job = Rc::new(Job::new(id, as_obj(&unit), JobKind::Start, JobFlags::empty()));
        job.set_installed(true);
        job
    }

    #[test]
    fn first_flush_is_new_then_changed() {
        let notify = JobNotify::new();
        let job = installed_job(1);

        notify.enqueue(&job);
        notify.enqueue(&job); // idempotent while queued
        let signals = notify.flush();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].op, JobSignalOp::New);
        assert_eq!(signals[0].path, "/org/freedesktop/systemd1/job/1");

        notify.enqueue(&job);
        let signals = notify.flush();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].op, JobSignalOp::Changed);
    }

    #[test]
    fn removed_is_preceded_by_unsent_new() {
        let notify = JobNotify::new();
        let job = installed_job(2);
        job.set_result(JobResult::Canceled);

        notify.enqueue(&job);
        notify.dequeue(&job);
        notify.send_removed(&job);

        let signals = notify.flush();
        let ops: Vec<JobSignalOp> = signals.iter().map(|s| s.op).collect();
        assert_eq!(ops, vec![JobSignalOp::New, JobSignalOp::Removed]);
        assert_eq!(signals[1].result, Some(JobResult::Canceled));
    }
}
