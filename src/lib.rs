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

//! sysjob is the job engine of a system service manager.
//!
//! A job is a request to drive one unit toward a declared goal (started,
//! stopped, reloaded, ...). The engine keeps at most one regular job and one
//! nop job installed per unit, merges or supersedes conflicting client
//! intents, gates dispatch on the before/after ordering graph, drives each
//! unit through its primitive operations, and cascades success and failure
//! along the requirement edges.
//!
//! The engine is single-threaded and owns no event loop of its own: timers
//! and dispatch wakeups are armed through the [`EventLoop`] boundary, units
//! are reached through the [`UnitObj`] vtable, and clients observe jobs via
//! the queued [`JobSignal`] stream.

pub mod error;
pub mod events;
pub mod job;
pub mod unit;

pub use crate::error::{Error, Result};
pub use crate::events::EventLoop;
pub use crate::job::{
    JobDependency, JobFlags, JobInfo, JobKind, JobManager, JobMode, JobResult, JobSignal,
    JobSignalOp, JobState, JobStatSnapshot,
};
pub use crate::unit::{EmergencyAction, UnitActiveState, UnitDb, UnitObj, UnitRelationAtom};
