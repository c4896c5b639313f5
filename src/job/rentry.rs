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

//! Reload entries: the text form every installed job takes across a
//! live-reload of the manager.
//!
//! Each job is a block of `key=value` lines terminated by a blank line:
//!
//! ```text
//! job-unit=foo.service
//! job-id=7
//! job-type=start
//! job-state=running
//! job-override=no
//! job-irreversible=no
//! job-sent-dbus-new-signal=yes
//! job-ignore-order=no
//! job-begin=12345678
//! subscribed=:1.42
//! ```
//!
//! `job-begin` is omitted while zero and `subscribed` repeats per client.
//! Readers tolerate unknown keys.

use super::entry::{Job, JobFlags};
use super::kind::{JobKind, JobState};
use crate::error::{Error, Result};
use std::io::{BufRead, Write};

/// A parsed job block, not yet bound to a unit handle.
pub(super) struct JobFrame {
    pub(super) unit: String,
    pub(super) id: u32,
    pub(super) kind: JobKind,
    pub(super) state: JobState,
    pub(super) flags: JobFlags,
    pub(super) sent_dbus_new_signal: bool,
    pub(super) begin_usec: u64,
    pub(super) clients: Vec<String>,
}

pub(super) fn serialize_job(job: &Job, w: &mut dyn Write) -> Result<()> {
    writeln!(w, "job-unit={}", job.unit().id())?;
    writeln!(w, "job-id={}", job.id())?;
    writeln!(w, "job-type={}", job.kind())?;
    writeln!(w, "job-state={}", job.state())?;
    writeln!(w, "job-override={}", yes_no(job.flags().contains(JobFlags::OVERRIDE)))?;
    writeln!(
        w,
        "job-irreversible={}",
        yes_no(job.flags().contains(JobFlags::IRREVERSIBLE))
    )?;
    writeln!(
        w,
        "job-sent-dbus-new-signal={}",
        yes_no(job.sent_dbus_new_signal())
    )?;
    writeln!(
        w,
        "job-ignore-order={}",
        yes_no(job.flags().contains(JobFlags::IGNORE_ORDER))
    )?;

    if job.begin_usec() > 0 {
        writeln!(w, "job-begin={}", job.begin_usec())?;
    }

    for client in job.clients() {
        writeln!(w, "subscribed={}", client)?;
    }

    // end marker
    writeln!(w)?;
    Ok(())
}

/// Read one job block. `Ok(None)` means the stream is exhausted;
/// `Err(Error::Input)` means the block was consumed but is unusable.
pub(super) fn deserialize_job(r: &mut dyn BufRead) -> Result<Option<JobFrame>> {
    let mut unit: Option<String> = None;
    let mut id: Option<u32> = None;
    let mut kind: Option<JobKind> = None;
    let mut state = JobState::Waiting;
    let mut flags = JobFlags::empty();
    let mut sent_dbus_new_signal = false;
    let mut begin_usec: u64 = 0;
    let mut clients = Vec::new();
    let mut seen = false;

    loop {
        let mut line = String::new();
        if r.read_line(&mut line)? == 0 {
            break; // EOF
        }

        let l = line.trim();
        if l.is_empty() {
            // end marker; blank lines before a block are skipped
            if seen {
                break;
            }
            continue;
        }
        seen = true;

        let (key, value) = match l.split_once('=') {
            Some((k, v)) => (k, v),
            None => (l, ""),
        };

        match key {
            "job-unit" => unit = Some(String::from(value)),
            "job-id" => match value.parse::<u32>() {
                Ok(v) => id = Some(v),
                Err(_) => log::debug!("Failed to parse job id value {}", value),
            },
            "job-type" => match value.parse::<JobKind>() {
                Ok(v) => kind = Some(v),
                Err(_) => log::debug!("Failed to parse job type {}", value),
            },
            "job-state" => match value.parse::<JobState>() {
                Ok(v) => state = v,
                Err(_) => log::debug!("Failed to parse job state {}", value),
            },
            "job-override" => flag_from(value, &mut flags, JobFlags::OVERRIDE, key),
            "job-irreversible" => flag_from(value, &mut flags, JobFlags::IRREVERSIBLE, key),
            "job-ignore-order" => flag_from(value, &mut flags, JobFlags::IGNORE_ORDER, key),
            "job-sent-dbus-new-signal" => match parse_boolean(value) {
                Some(v) => sent_dbus_new_signal |= v,
                None => log::debug!("Failed to parse job sent-dbus-new-signal flag {}", value),
            },
            "job-begin" => match value.parse::<u64>() {
                Ok(v) => begin_usec = v,
                Err(_) => log::debug!("Failed to parse job-begin value {}", value),
            },
            "subscribed" => clients.push(String::from(value)),
            _ => log::debug!("Unknown serialization key: {}", key),
        }
    }

    if !seen {
        return Ok(None);
    }

    Ok(Some(JobFrame {
        unit: unit.ok_or(Error::Input)?,
        id: id.ok_or(Error::Input)?,
        kind: kind.ok_or(Error::Input)?,
        state,
        flags,
        sent_dbus_new_signal,
        begin_usec,
        clients,
    }))
}

fn flag_from(value: &str, flags: &mut JobFlags, flag: JobFlags, key: &str) {
    match parse_boolean(value) {
        Some(true) => *flags |= flag,
        Some(false) => {}
        None => log::debug!("Failed to parse {} flag {}", key, value),
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

fn parse_boolean(s: &str) -> Option<bool> {
    match s {
        "1" | "yes" | "y" | "true" | "t" | "on" => Some(true),
        "0" | "no" | "n" | "false" | "f" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::test_utils::{as_obj, TestUnit};
    use std::rc::Rc;

    fn frame_of(text: &str) -> JobFrame {
        let mut r = text.as_bytes();
        deserialize_job(&mut r).unwrap().unwrap()
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let unit = TestUnit::new("test1.service");
        let job = Rc::new(Job::new(
            42,
            as_obj(&unit),
            JobKind::Start,
            JobFlags::OVERRIDE | JobFlags::IGNORE_ORDER,
        ));
        job.set_state(JobState::Running);
        job.set_begin_usec(123_456_789);
        job.set_sent_dbus_new_signal(true);
        job.add_client(":1.42");
        job.add_client(":1.43");

        let mut buf = Vec::new();
        serialize_job(&job, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("job-unit=test1.service\n"));
        assert!(text.contains("job-id=42\n"));
        assert!(text.contains("job-type=start\n"));
        assert!(text.contains("job-state=running\n"));
        assert!(text.contains("job-override=yes\n"));
        assert!(text.contains("job-irreversible=no\n"));
        assert!(text.contains("job-sent-dbus-new-signal=yes\n"));
        assert!(text.contains("job-ignore-order=yes\n"));
        assert!(text.contains("job-begin=123456789\n"));
        assert!(text.contains("subscribed=:1.42\n"));
        assert!(text.ends_with("\n\n"));

        let frame = frame_of(&text);
        assert_eq!(frame.unit, "test1.service");
        assert_eq!(frame.id, 42);
        assert_eq!(frame.kind, JobKind::Start);
        assert_eq!(frame.state, JobState::Running);
        assert_eq!(frame.flags, JobFlags::OVERRIDE | JobFlags::IGNORE_ORDER);
        assert!(frame.sent_dbus_new_signal);
        assert_eq!(frame.begin_usec, 123_456_789);
        assert_eq!(frame.clients, vec![":1.42", ":1.43"]);
    }

    #[test]
    fn begin_is_omitted_while_zero() {
        let unit = TestUnit::new("test1.service");
        let job = Rc::new(Job::new(1, as_obj(&unit), JobKind::Stop, JobFlags::empty()));

        let mut buf = Vec::new();
        serialize_job(&job, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(!text.contains("job-begin"));

        let frame = frame_of(&text);
        assert_eq!(frame.begin_usec, 0);
    }

    #[test]
    fn unknown_keys_are_tolerated() {
        let text = "job-unit=a.service\njob-id=3\njob-type=stop\njob-state=waiting\n\
                    job-color=green\nnonsense\n\n";
        let frame = frame_of(text);
        assert_eq!(frame.id, 3);
        assert_eq!(frame.kind, JobKind::Stop);
    }

    #[test]
    fn empty_stream_yields_none() {
        let mut r = "".as_bytes();
        assert!(deserialize_job(&mut r).unwrap().is_none());
        let mut r = "\n\n".as_bytes();
        assert!(deserialize_job(&mut r).unwrap().is_none());
    }

    #[test]
    fn missing_identity_is_rejected() {
        let mut r = "job-type=start\njob-state=waiting\n\n".as_bytes();
        assert!(deserialize_job(&mut r).is_err());
    }
}
