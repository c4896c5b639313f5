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

//! The unit boundary: the engine sees each unit through a small vtable.
//!
//! Concrete unit kinds (service, socket, mount, ...) live outside the
//! engine. A unit implementation supplies its identity, its current
//! activation state, the three primitive operations, its per-job
//! configuration, and the edge sets of the dependency graph.

pub mod test_utils;

use crate::error::Result;
use std::rc::Rc;

/// Activation state of a unit, as reported by its vtable.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum UnitActiveState {
    /// unit is activated
    Active,
    /// unit is in reloading
    Reloading,
    /// unit is not active
    InActive,
    /// unit action is failed
    Failed,
    /// unit is in starting
    Activating,
    /// unit is in stopping
    DeActivating,
}

impl UnitActiveState {
    ///
    pub fn is_active_or_reloading(&self) -> bool {
        matches!(self, UnitActiveState::Active | UnitActiveState::Reloading)
    }

    ///
    pub fn is_inactive_or_failed(&self) -> bool {
        matches!(self, UnitActiveState::InActive | UnitActiveState::Failed)
    }

    ///
    pub fn is_inactive_or_deactivating(&self) -> bool {
        matches!(
            self,
            UnitActiveState::InActive | UnitActiveState::Failed | UnitActiveState::DeActivating
        )
    }
}

impl std::fmt::Display for UnitActiveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitActiveState::Active => write!(f, "active"),
            UnitActiveState::Reloading => write!(f, "reloading"),
            UnitActiveState::InActive => write!(f, "inactive"),
            UnitActiveState::Failed => write!(f, "failed"),
            UnitActiveState::Activating => write!(f, "activating"),
            UnitActiveState::DeActivating => write!(f, "deactivating"),
        }
    }
}

/// The dependency edge sets a unit exposes to the engine.
///
/// `After`/`Before` drive the runnability predicate; the remaining atoms
/// drive failure propagation on job completion.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum UnitRelationAtom {
    ///
    After,
    ///
    Before,
    ///
    RequiredBy,
    ///
    RequiredByOverridable,
    ///
    BoundBy,
    ///
    ConflictedBy,
}

/// Action a unit declares for the manager to take when its job times out.
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EmergencyAction {
    None,
    Reboot,
    RebootForce,
    RebootImmediate,
    Poweroff,
    PoweroffForce,
    PoweroffImmediate,
}

impl Default for EmergencyAction {
    fn default() -> Self {
        Self::None
    }
}

/// The vtable the engine drives a unit through.
///
/// The primitive operations return `Ok(())` to mean "asynchronous operation
/// in progress, I will report completion later", or one of the sentinel
/// `UnitActionE*` errors which the engine classifies into a job result.
pub trait UnitObj {
    /// Unique name of the unit, e.g. "foo.service".
    fn id(&self) -> String;

    /// Human-readable description for status messages.
    fn description(&self) -> String;

    ///
    fn active_state(&self) -> UnitActiveState;

    ///
    fn start(&self) -> Result<()>;

    ///
    fn stop(&self) -> Result<()>;

    ///
    fn reload(&self) -> Result<()>;

    /// Per-unit job timeout in microseconds; 0 disables the job timer.
    fn job_timeout(&self) -> u64 {
        0
    }

    ///
    fn job_timeout_action(&self) -> EmergencyAction {
        EmergencyAction::None
    }

    ///
    fn job_timeout_reboot_arg(&self) -> Option<String> {
        None
    }

    /// Unit-specific deadline, if the unit kind supplies one.
    fn get_timeout(&self) -> Option<u64> {
        None
    }

    /// Fired by the engine when a job for this unit ends with `timeout` or
    /// `dependency`; the unit decides what its on-failure units are.
    fn start_on_failure(&self) {}

    /// Names of the units related to this one through the given atom.
    fn deps(&self, atom: UnitRelationAtom) -> Vec<String>;

    /// Unit-kind specific status message format for the given job outcome,
    /// with `%s` standing for the unit description. `None` falls back to
    /// the generic messages.
    fn status_message(&self, _kind: crate::job::JobKind, _result: crate::job::JobResult) -> Option<String> {
        None
    }
}

/// Name lookup for unit handles, needed when deserialized jobs are rebound
/// to their units across a live-reload.
pub trait UnitDb {
    ///
    fn get(&self, id: &str) -> Option<Rc<dyn UnitObj>>;
}
