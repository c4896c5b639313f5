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

//! The job-type algebra: merge, collapse, conflict, superset and redundancy
//! over the enumerated job kinds, plus the string tables for every job
//! enum. Everything here is a pure function; collapse is the only operation
//! that consults the unit, and it does so through the activation state
//! alone.

use crate::error::Error;
use crate::unit::UnitActiveState;
use std::fmt;
use std::str::FromStr;

/// What a job asks of its unit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum JobKind {
    // basic kind
    /* mut: the stage of the unit can be changed */
    ///
    Start,
    ///
    Stop,
    ///
    Reload,
    ///
    Restart,

    /* non-mut: the stage of the unit can not be changed */
    ///
    VerifyActive,
    ///
    Nop,

    // compound kind, collapsed to a basic kind before installation
    ///
    TryReload,
    ///
    TryRestart,
    ///
    ReloadOrStart,
}

/// Installed jobs are either waiting for dispatch or running a primitive.
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum JobState {
    Waiting,
    Running,
}

/// Terminal classification of a finished job.
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum JobResult {
    Done,
    Canceled,
    TimeOut,
    Failed,
    Dependency,
    Skipped,
    Invalid,
    Assert,
    UnSupported,
}

/// How a client request treats work already in flight. The transaction
/// layer consumes most of these; the engine honors `fail`,
/// `replace-irreversibly` and `ignore-dependencies` at install time.
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum JobMode {
    Fail,
    Replace,
    ReplaceIrreversible,
    Isolate,
    Flush,
    IgnoreDependencies,
    IgnoreRequirements,
}

impl Default for JobMode {
    fn default() -> Self {
        Self::Replace
    }
}

pub(super) fn job_kind_is_basic(kind: JobKind) -> bool {
    match kind {
        JobKind::Start | JobKind::Stop | JobKind::Reload | JobKind::Restart => true,
        JobKind::VerifyActive | JobKind::Nop => true,
        JobKind::TryReload | JobKind::TryRestart | JobKind::ReloadOrStart => false,
    }
}

fn job_kind_is_merging(kind: JobKind) -> bool {
    matches!(
        kind,
        JobKind::Start | JobKind::VerifyActive | JobKind::Stop | JobKind::Reload | JobKind::Restart
    )
}

/// Merge two job kinds into the weakest kind that implies both, or `None`
/// if they are incompatible.
///
/// Merging is commutative, and associative once the result is collapsed
/// (`reload-or-start` lies outside this function's domain and must be
/// collapsed right away).
pub fn lookup_merge(a: JobKind, b: JobKind) -> Option<JobKind> {
    if a == b {
        return Some(a);
    }

    assert!(job_kind_is_merging(a) && job_kind_is_merging(b));

    use JobKind::*;
    match (a, b) {
        (Start, VerifyActive) | (VerifyActive, Start) => Some(Start),
        (Start, Reload) | (Reload, Start) => Some(ReloadOrStart),
        (Start, Restart) | (Restart, Start) => Some(Restart),
        (VerifyActive, Reload) | (Reload, VerifyActive) => Some(Reload),
        (VerifyActive, Restart) | (Restart, VerifyActive) => Some(Restart),
        (Reload, Restart) | (Restart, Reload) => Some(Restart),
        _ => None, // stop is incompatible with everything else
    }
}

///
pub fn is_mergeable(a: JobKind, b: JobKind) -> bool {
    !is_conflicting(a, b)
}

/// Two kinds conflict iff their merge result is incompatible.
pub fn is_conflicting(a: JobKind, b: JobKind) -> bool {
    a != b && (a == JobKind::Stop || b == JobKind::Stop)
}

/// Whether operation `a` already entails operation `b`.
pub fn is_superset(a: JobKind, b: JobKind) -> bool {
    lookup_merge(a, b) == Some(a)
}

/// Resolve a compound kind into a basic kind, given the unit's current
/// activation state.
pub fn collapse(kind: JobKind, state: UnitActiveState) -> JobKind {
    match kind {
        JobKind::TryRestart => {
            if state.is_inactive_or_deactivating() {
                JobKind::Nop
            } else {
                JobKind::Restart
            }
        }
        JobKind::TryReload => {
            if state.is_inactive_or_deactivating() {
                JobKind::Nop
            } else {
                JobKind::Reload
            }
        }
        JobKind::ReloadOrStart => {
            if state.is_inactive_or_deactivating() {
                JobKind::Start
            } else {
                JobKind::Reload
            }
        }
        _ => kind,
    }
}

/// The composed operation used at every install site.
pub fn merge_and_collapse(a: JobKind, b: JobKind, state: UnitActiveState) -> Option<JobKind> {
    lookup_merge(a, b).map(|t| collapse(t, state))
}

/// Whether it is OK to merge a job of this kind into an already running
/// job. Reloads cannot be merged this way: a daemon that has begun
/// consuming its old configuration cannot pick up the updated one by
/// having the intent folded in; it must be re-dispatched. Restarts can,
/// because a running restart means the unit has not stopped yet.
pub(super) fn allows_late_merge(kind: JobKind) -> bool {
    kind != JobKind::Reload
}

/// A job is redundant when its desired effect already holds for the unit.
pub fn is_redundant(kind: JobKind, state: UnitActiveState) -> bool {
    match kind {
        JobKind::Start => state.is_active_or_reloading(),
        JobKind::Stop => state.is_inactive_or_failed(),
        JobKind::VerifyActive => state.is_active_or_reloading(),
        JobKind::Reload => state == UnitActiveState::Reloading,
        JobKind::Restart => state == UnitActiveState::Activating,
        JobKind::Nop => true,
        _ => unreachable!("compound job kinds are collapsed before the redundancy check"),
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Start => write!(f, "start"),
            JobKind::VerifyActive => write!(f, "verify-active"),
            JobKind::Stop => write!(f, "stop"),
            JobKind::Reload => write!(f, "reload"),
            JobKind::ReloadOrStart => write!(f, "reload-or-start"),
            JobKind::Restart => write!(f, "restart"),
            JobKind::TryRestart => write!(f, "try-restart"),
            JobKind::TryReload => write!(f, "try-reload"),
            JobKind::Nop => write!(f, "nop"),
        }
    }
}

impl FromStr for JobKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(JobKind::Start),
            "verify-active" => Ok(JobKind::VerifyActive),
            "stop" => Ok(JobKind::Stop),
            "reload" => Ok(JobKind::Reload),
            "reload-or-start" => Ok(JobKind::ReloadOrStart),
            "restart" => Ok(JobKind::Restart),
            "try-restart" => Ok(JobKind::TryRestart),
            "try-reload" => Ok(JobKind::TryReload),
            "nop" => Ok(JobKind::Nop),
            _ => Err(Error::Parse {
                what: String::from(s),
                ty: "job type",
            }),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Waiting => write!(f, "waiting"),
            JobState::Running => write!(f, "running"),
        }
    }
}

impl FromStr for JobState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(JobState::Waiting),
            "running" => Ok(JobState::Running),
            _ => Err(Error::Parse {
                what: String::from(s),
                ty: "job state",
            }),
        }
    }
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobMode::Fail => write!(f, "fail"),
            JobMode::Replace => write!(f, "replace"),
            JobMode::ReplaceIrreversible => write!(f, "replace-irreversibly"),
            JobMode::Isolate => write!(f, "isolate"),
            JobMode::Flush => write!(f, "flush"),
            JobMode::IgnoreDependencies => write!(f, "ignore-dependencies"),
            JobMode::IgnoreRequirements => write!(f, "ignore-requirements"),
        }
    }
}

impl FromStr for JobMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail" => Ok(JobMode::Fail),
            "replace" => Ok(JobMode::Replace),
            "replace-irreversibly" => Ok(JobMode::ReplaceIrreversible),
            "isolate" => Ok(JobMode::Isolate),
            "flush" => Ok(JobMode::Flush),
            "ignore-dependencies" => Ok(JobMode::IgnoreDependencies),
            "ignore-requirements" => Ok(JobMode::IgnoreRequirements),
            _ => Err(Error::Parse {
                what: String::from(s),
                ty: "job mode",
            }),
        }
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobResult::Done => write!(f, "done"),
            JobResult::Canceled => write!(f, "canceled"),
            JobResult::TimeOut => write!(f, "timeout"),
            JobResult::Failed => write!(f, "failed"),
            JobResult::Dependency => write!(f, "dependency"),
            JobResult::Skipped => write!(f, "skipped"),
            JobResult::Invalid => write!(f, "invalid"),
            JobResult::Assert => write!(f, "assert"),
            JobResult::UnSupported => write!(f, "unsupported"),
        }
    }
}

impl FromStr for JobResult {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "done" => Ok(JobResult::Done),
            "canceled" => Ok(JobResult::Canceled),
            "timeout" => Ok(JobResult::TimeOut),
            "failed" => Ok(JobResult::Failed),
            "dependency" => Ok(JobResult::Dependency),
            "skipped" => Ok(JobResult::Skipped),
            "invalid" => Ok(JobResult::Invalid),
            "assert" => Ok(JobResult::Assert),
            "unsupported" => Ok(JobResult::UnSupported),
            _ => Err(Error::Parse {
                what: String::from(s),
                ty: "job result",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MERGING: [JobKind; 5] = [
        JobKind::Start,
        JobKind::VerifyActive,
        JobKind::Stop,
        JobKind::Reload,
        JobKind::Restart,
    ];

    const STATES: [UnitActiveState; 6] = [
        UnitActiveState::Active,
        UnitActiveState::Reloading,
        UnitActiveState::InActive,
        UnitActiveState::Failed,
        UnitActiveState::Activating,
        UnitActiveState::DeActivating,
    ];

    #[test]
    fn merge_matches_table() {
        use JobKind::*;
        assert_eq!(lookup_merge(Start, VerifyActive), Some(Start));
        assert_eq!(lookup_merge(Start, Stop), None);
        assert_eq!(lookup_merge(Start, Reload), Some(ReloadOrStart));
        assert_eq!(lookup_merge(VerifyActive, Reload), Some(Reload));
        assert_eq!(lookup_merge(VerifyActive, Stop), None);
        assert_eq!(lookup_merge(Stop, Reload), None);
        assert_eq!(lookup_merge(Restart, Start), Some(Restart));
        assert_eq!(lookup_merge(Restart, VerifyActive), Some(Restart));
        assert_eq!(lookup_merge(Restart, Stop), None);
        assert_eq!(lookup_merge(Restart, Reload), Some(Restart));
        for k in MERGING {
            assert_eq!(lookup_merge(k, k), Some(k));
        }
    }

    #[test]
    fn merge_is_commutative() {
        for a in MERGING {
            for b in MERGING {
                assert_eq!(lookup_merge(a, b), lookup_merge(b, a));
            }
        }
    }

    #[test]
    fn merge_and_collapse_is_associative() {
        // (a*b)*c == a*(b*c) at any fixed unit state, whenever both sides
        // are defined
        for state in STATES {
            for a in MERGING {
                for b in MERGING {
                    for c in MERGING {
                        let left = merge_and_collapse(a, b, state)
                            .and_then(|ab| merge_and_collapse(ab, c, state));
                        let right = merge_and_collapse(b, c, state)
                            .and_then(|bc| merge_and_collapse(a, bc, state));
                        if let (Some(l), Some(r)) = (left, right) {
                            assert_eq!(l, r, "({} * {}) * {} at {}", a, b, c, state);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn conflict_follows_merge() {
        for a in MERGING {
            for b in MERGING {
                assert_eq!(is_conflicting(a, b), lookup_merge(a, b).is_none());
            }
        }
    }

    #[test]
    fn superset_relation() {
        use JobKind::*;
        assert!(is_superset(Start, VerifyActive));
        assert!(is_superset(Reload, VerifyActive));
        assert!(is_superset(Restart, Start));
        assert!(is_superset(Restart, VerifyActive));
        assert!(is_superset(Restart, Reload));
        assert!(!is_superset(VerifyActive, Start));
        assert!(!is_superset(Start, Reload));
    }

    #[test]
    fn collapse_resolves_compounds() {
        use JobKind::*;
        use UnitActiveState::*;
        assert_eq!(collapse(TryRestart, InActive), Nop);
        assert_eq!(collapse(TryRestart, DeActivating), Nop);
        assert_eq!(collapse(TryRestart, Active), Restart);
        assert_eq!(collapse(TryRestart, Activating), Restart);
        assert_eq!(collapse(TryReload, Failed), Nop);
        assert_eq!(collapse(TryReload, Active), Reload);
        assert_eq!(collapse(ReloadOrStart, InActive), Start);
        assert_eq!(collapse(ReloadOrStart, Active), Reload);
        assert_eq!(collapse(Start, InActive), Start);
        assert_eq!(collapse(Stop, Active), Stop);
    }

    #[test]
    fn redundancy_against_unit_state() {
        use JobKind::*;
        use UnitActiveState::*;
        assert!(is_redundant(Start, Active));
        assert!(is_redundant(Start, Reloading));
        assert!(!is_redundant(Start, InActive));
        assert!(is_redundant(Stop, InActive));
        assert!(is_redundant(Stop, Failed));
        assert!(!is_redundant(Stop, Active));
        assert!(is_redundant(VerifyActive, Active));
        assert!(is_redundant(Reload, Reloading));
        assert!(!is_redundant(Reload, Active));
        assert!(is_redundant(Restart, Activating));
        assert!(!is_redundant(Restart, Active));
        assert!(is_redundant(Nop, InActive));
    }

    #[test]
    fn late_merge_excludes_reload() {
        assert!(allows_late_merge(JobKind::Start));
        assert!(allows_late_merge(JobKind::Restart));
        assert!(allows_late_merge(JobKind::VerifyActive));
        assert!(!allows_late_merge(JobKind::Reload));
    }

    #[test]
    fn string_tables_round_trip() {
        let kinds = [
            JobKind::Start,
            JobKind::VerifyActive,
            JobKind::Stop,
            JobKind::Reload,
            JobKind::ReloadOrStart,
            JobKind::Restart,
            JobKind::TryRestart,
            JobKind::TryReload,
            JobKind::Nop,
        ];
        for k in kinds {
            assert_eq!(k.to_string().parse::<JobKind>().unwrap(), k);
        }

        for s in [JobState::Waiting, JobState::Running] {
            assert_eq!(s.to_string().parse::<JobState>().unwrap(), s);
        }

        let modes = [
            JobMode::Fail,
            JobMode::Replace,
            JobMode::ReplaceIrreversible,
            JobMode::Isolate,
            JobMode::Flush,
            JobMode::IgnoreDependencies,
            JobMode::IgnoreRequirements,
        ];
        for m in modes {
            assert_eq!(m.to_string().parse::<JobMode>().unwrap(), m);
        }

        let results = [
            JobResult::Done,
            JobResult::Canceled,
            JobResult::TimeOut,
            JobResult::Failed,
            JobResult::Dependency,
            JobResult::Skipped,
            JobResult::Invalid,
            JobResult::Assert,
            JobResult::UnSupported,
        ];
        for r in results {
            assert_eq!(r.to_string().parse::<JobResult>().unwrap(), r);
        }

        assert!("reboot".parse::<JobKind>().is_err());
        assert!("".parse::<JobState>().is_err());
    }
}
