//! STIX timestamps and their TypeQL datetime literal form.

use std::fmt;

use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::error::ValueError;

/// A parsed STIX timestamp (`YYYY-MM-DDThh:mm:ss[.s+]Z`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    datetime: PrimitiveDateTime,
    has_fraction: bool,
}

impl Timestamp {
    /// Parses a UTC STIX timestamp.
    ///
    /// Any number of fractional digits is accepted; only milliseconds survive.
    pub fn parse(raw: &str) -> Result<Self, ValueError> {
        let has_fraction = raw.contains('.');
        let parsed = if has_fraction {
            PrimitiveDateTime::parse(
                raw,
                format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]Z"),
            )
        } else {
            PrimitiveDateTime::parse(
                raw,
                format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z"),
            )
        };
        let datetime = parsed
            .map_err(|err| ValueError::new(format!("'{raw}' is not a STIX timestamp: {err}")))?;
        Ok(Self {
            datetime,
            has_fraction,
        })
    }

    /// The instant this timestamp names.
    pub fn instant(&self) -> OffsetDateTime {
        self.datetime.assume_utc()
    }

    /// Milliseconds, when the source carried a fractional part.
    pub fn millis(&self) -> Option<u16> {
        self.has_fraction.then(|| self.datetime.millisecond())
    }
}

impl fmt::Display for Timestamp {
    /// Writes the TypeQL literal: `YYYY-MM-DDThh:mm:ss[.fff]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dt = &self.datetime;
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            dt.year(),
            u8::from(dt.month()),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second()
        )?;
        if let Some(millis) = self.millis() {
            write!(f, ".{millis:03}")?;
        }
        Ok(())
    }
}
