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

//! Error define. The crate uses one unified Error; unit primitives report
//! their outcome through the sentinel `UnitActionE*` variants, which the
//! engine maps to job results.

/// Reuse the Errno from the nix library, the common vocabulary between the
/// engine and the unit implementations.
pub use nix::errno::Errno;
use snafu::prelude::*;
#[allow(unused_imports)]
pub use snafu::ResultExt;

/// sysjob Error
#[allow(missing_docs)]
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Error parsing '{}' as {}", what, ty))]
    Parse {
        what: String,
        ty: &'static str,
    },

    #[snafu(display("IoError(sysjob)"))]
    Io {
        source: std::io::Error,
    },

    /// Job errno
    Input,
    Conflict,
    Exists,
    NotExisted,
    Internal,

    /// UnitAction Error
    #[snafu(display("EAgain(UnitActionError)"))]
    UnitActionEAgain,
    #[snafu(display("EAlready(UnitActionError)"))]
    UnitActionEAlready,
    #[snafu(display("EBadR(UnitActionError)"))]
    UnitActionEBadR,
    #[snafu(display("ENoExec(UnitActionError)"))]
    UnitActionENoExec,
    #[snafu(display("EProto(UnitActionError)"))]
    UnitActionEProto,
    #[snafu(display("EOpNotSupp(UnitActionError)"))]
    UnitActionEOpNotSupp,
    #[snafu(display("EFailed(UnitActionError)"))]
    UnitActionEFailed,
    #[snafu(display("EInval(UnitActionError)"))]
    UnitActionEInval,
    #[snafu(display("EBusy(UnitActionError)"))]
    UnitActionEBusy,
    #[snafu(display("ENoent(UnitActionError)"))]
    UnitActionENoent,
}

/// Convert to the standard linux error code
impl From<Error> for nix::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Parse { .. } => nix::Error::EINVAL,
            Error::Io { source: _ } => nix::Error::EIO,
            Error::Input => nix::Error::EINVAL,
            Error::Conflict => nix::Error::EBADR,
            Error::Exists => nix::Error::EEXIST,
            Error::NotExisted => nix::Error::ENOENT,
            Error::Internal => nix::Error::EIO,
            Error::UnitActionEAgain => nix::Error::EAGAIN,
            Error::UnitActionEAlready => nix::Error::EALREADY,
            Error::UnitActionEBadR => nix::Error::EBADR,
            Error::UnitActionENoExec => nix::Error::ENOEXEC,
            Error::UnitActionEProto => nix::Error::EPROTO,
            Error::UnitActionEOpNotSupp => nix::Error::ENOTSUP,
            Error::UnitActionEFailed => nix::Error::EIO,
            Error::UnitActionEInval => nix::Error::EINVAL,
            Error::UnitActionEBusy => nix::Error::EBUSY,
            Error::UnitActionENoent => nix::Error::ENOENT,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Error {
        Error::Io { source }
    }
}

/// new Result
pub type Result<T, E = Error> = std::result::Result<T, E>;
