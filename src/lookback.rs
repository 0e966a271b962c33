// ⏪ Lookback policies
// Turns "compare against what?" into a concrete reference date for the
// previous period.

use crate::error::{CompareError, CompareResult};
use crate::period::{parse_reference_date, GranularityMode};
use chrono::{Duration, Months, NaiveDate};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookback {
    /// Fixed number of days before the current date
    OffsetDays(u32),
    /// Whole units of the comparison granularity (days, weeks, months, years)
    CalendarUnits(u32),
    /// A specific date chosen by the caller
    Explicit(NaiveDate),
    /// The earliest date in the store ("All Time")
    Earliest,
}

/// Named offsets offered by the dashboard, in days
pub const PRESETS: [(&str, u32); 5] = [("7d", 7), ("1m", 30), ("3m", 90), ("6m", 180), ("1y", 365)];

impl Lookback {
    /// Default per mode: a week back for day/week views, the previous unit otherwise
    pub fn default_for(mode: GranularityMode) -> Self {
        match mode {
            GranularityMode::Daily | GranularityMode::Weekly => Lookback::OffsetDays(7),
            GranularityMode::Monthly | GranularityMode::Yearly => Lookback::CalendarUnits(1),
        }
    }

    /// Reference date of the previous period.
    ///
    /// `earliest` is only consulted for [`Lookback::Earliest`].
    pub fn resolve(
        &self,
        current: NaiveDate,
        mode: GranularityMode,
        earliest: Option<NaiveDate>,
    ) -> CompareResult<NaiveDate> {
        let resolved = match *self {
            Lookback::OffsetDays(days) => current.checked_sub_signed(Duration::days(days as i64)),
            Lookback::CalendarUnits(n) => match mode {
                GranularityMode::Daily => current.checked_sub_signed(Duration::days(n as i64)),
                GranularityMode::Weekly => {
                    current.checked_sub_signed(Duration::weeks(n as i64))
                }
                // chrono clamps to the last valid day (Mar 31 → Feb 29/28)
                GranularityMode::Monthly => current.checked_sub_months(Months::new(n)),
                GranularityMode::Yearly => n
                    .checked_mul(12)
                    .and_then(|months| current.checked_sub_months(Months::new(months))),
            },
            Lookback::Explicit(date) => Some(date),
            Lookback::Earliest => return earliest.ok_or(CompareError::EmptyStore),
        };

        resolved.ok_or_else(|| {
            CompareError::InvalidArgument(format!("lookback {:?} from {} is out of range", self, current))
        })
    }
}

impl FromStr for Lookback {
    type Err = CompareError;

    /// Accepts `7d`, `1m`, `3m`, `6m`, `1y`, `all`, `previous`, `<N>days`,
    /// `<N>units`, or a date
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_lowercase();

        if let Some((_, days)) = PRESETS.iter().find(|(name, _)| *name == token) {
            return Ok(Lookback::OffsetDays(*days));
        }

        match token.as_str() {
            "all" | "all-time" | "earliest" => return Ok(Lookback::Earliest),
            "previous" | "prev" => return Ok(Lookback::CalendarUnits(1)),
            _ => {}
        }

        if let Some(n) = token.strip_suffix("days").or_else(|| token.strip_suffix('d')) {
            if let Ok(days) = n.trim().parse::<u32>() {
                return Ok(Lookback::OffsetDays(days));
            }
        }
        if let Some(n) = token.strip_suffix("units").or_else(|| token.strip_suffix('u')) {
            if let Ok(units) = n.trim().parse::<u32>() {
                return Ok(Lookback::CalendarUnits(units));
            }
        }

        parse_reference_date(&token).map(Lookback::Explicit).map_err(|_| {
            CompareError::InvalidArgument(format!(
                "unknown lookback '{}' (expected 7d, 1m, 3m, 6m, 1y, all, previous, <N>days, <N>units or a date)",
                s
            ))
        })
    }
}
