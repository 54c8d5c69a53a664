//! Small shared helpers: operator date/time parsing, button specs.

use chrono::{Duration, Local, NaiveDateTime, NaiveTime};

use crate::messaging::types::LinkButton;
use crate::{Error, Result};

/// Parse an operator-supplied schedule time against the current local clock.
///
/// Supported formats:
///   1) `HH:MM`             — today; tomorrow when the time already passed
///   2) `DD.MM.YYYY HH:MM`
///   3) `YYYY-MM-DD HH:MM`
pub fn parse_user_dt(s: &str) -> Result<NaiveDateTime> {
    parse_user_dt_at(s, Local::now().naive_local())
}

/// Same as [`parse_user_dt`] with an injected "now" (for tests and callers
/// that already hold a clock value).
pub fn parse_user_dt_at(s: &str, now: NaiveDateTime) -> Result<NaiveDateTime> {
    let s = s.trim();

    if let Ok(t) = NaiveTime::parse_from_str(s, "%H:%M") {
        let mut dt = now.date().and_time(t);
        if dt <= now {
            dt += Duration::days(1);
        }
        return Ok(dt);
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%d.%m.%Y %H:%M") {
        return Ok(dt);
    }

    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
        .map_err(|_| Error::InvalidInput(format!("unrecognized date/time: {s}")))
}

/// Parse a button spec, one `label | url` pair per line.
///
/// Lines without a pipe or with an empty side are skipped rather than
/// rejected; operators fix typos by re-sending the whole spec.
pub fn parse_buttons_spec(spec: &str) -> Vec<LinkButton> {
    spec.lines()
        .filter_map(|line| {
            let (label, url) = line.split_once('|')?;
            let label = label.trim();
            let url = url.trim();
            if label.is_empty() || url.is_empty() {
                return None;
            }
            Some(LinkButton {
                label: label.to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}
