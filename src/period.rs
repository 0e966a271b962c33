// 📅 Period Resolver
// Expands one reference date into the inclusive date range of its day, week,
// month or year.

use crate::error::{CompareError, CompareResult};
use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// GRANULARITY MODE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GranularityMode {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl GranularityMode {
    pub const ALL: [GranularityMode; 4] = [
        GranularityMode::Daily,
        GranularityMode::Weekly,
        GranularityMode::Monthly,
        GranularityMode::Yearly,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GranularityMode::Daily => "Daily",
            GranularityMode::Weekly => "Weekly",
            GranularityMode::Monthly => "Monthly",
            GranularityMode::Yearly => "Yearly",
        }
    }
}

impl fmt::Display for GranularityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GranularityMode {
    type Err = CompareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "day" | "d" => Ok(GranularityMode::Daily),
            "weekly" | "week" | "w" => Ok(GranularityMode::Weekly),
            "monthly" | "month" | "m" => Ok(GranularityMode::Monthly),
            "yearly" | "year" | "y" => Ok(GranularityMode::Yearly),
            other => Err(CompareError::InvalidArgument(format!(
                "unknown mode '{}' (expected daily, weekly, monthly or yearly)",
                other
            ))),
        }
    }
}

// ============================================================================
// WEEK POLICY
// ============================================================================

/// How a weekly period is laid out around its reference date.
/// One policy covers both sides of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeekPolicy {
    /// Calendar week Sunday..=Saturday containing the date
    #[default]
    SundayToSaturday,
    /// The date and the six days before it
    #[serde(rename = "trailing-7-days")]
    Trailing7Days,
}

impl FromStr for WeekPolicy {
    type Err = CompareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sunday-to-saturday" | "calendar" | "sun-sat" => Ok(WeekPolicy::SundayToSaturday),
            "trailing-7-days" | "trailing" | "rolling" => Ok(WeekPolicy::Trailing7Days),
            other => Err(CompareError::InvalidArgument(format!(
                "unknown week policy '{}' (expected calendar or trailing)",
                other
            ))),
        }
    }
}

// ============================================================================
// PERIOD
// ============================================================================

/// Inclusive date range `[start, end]` with `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPeriod")]
pub struct Period {
    start: NaiveDate,
    end: NaiveDate,
}

/// Wire shape of [`Period`], checked before it becomes one
#[derive(Deserialize)]
struct RawPeriod {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawPeriod> for Period {
    type Error = CompareError;

    fn try_from(raw: RawPeriod) -> Result<Self, Self::Error> {
        if raw.start > raw.end {
            return Err(CompareError::InvalidArgument(format!(
                "period starts {} after it ends {}",
                raw.start, raw.end
            )));
        }
        Ok(Period {
            start: raw.start,
            end: raw.end,
        })
    }
}

impl Period {
    /// Build a period from two endpoints in either order
    pub fn new(a: NaiveDate, b: NaiveDate) -> Self {
        if a <= b {
            Period { start: a, end: b }
        } else {
            Period { start: b, end: a }
        }
    }

    pub fn single_day(date: NaiveDate) -> Self {
        Period {
            start: date,
            end: date,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days covered, both ends included
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Iterate every date of the period in order
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    /// Short label in the unit of `mode`, as shown next to the comparison
    pub fn caption(&self, mode: GranularityMode) -> String {
        match mode {
            GranularityMode::Daily => self.start.format("%m/%d/%Y").to_string(),
            GranularityMode::Weekly => format!(
                "{} to {}",
                self.start.format("%m/%d/%Y"),
                self.end.format("%m/%d/%Y")
            ),
            GranularityMode::Monthly => self.start.format("%B %Y").to_string(),
            GranularityMode::Yearly => self.start.format("%Y").to_string(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

// ============================================================================
// RESOLUTION
// ============================================================================

fn days_before(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_sub_signed(Duration::days(days))
        .unwrap_or(NaiveDate::MIN)
}

fn days_after(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(days))
        .unwrap_or(NaiveDate::MAX)
}

/// Expand `reference` into the period of `mode` that contains it.
///
/// Never fails. Weeks that would run past chrono's first or last
/// representable day are clamped to it.
pub fn resolve_period(reference: NaiveDate, mode: GranularityMode, weeks: WeekPolicy) -> Period {
    match mode {
        GranularityMode::Daily => Period::single_day(reference),
        GranularityMode::Weekly => match weeks {
            WeekPolicy::SundayToSaturday => {
                let offset = reference.weekday().num_days_from_sunday() as i64;
                let start = days_before(reference, offset);
                Period {
                    start,
                    end: days_after(start, 6),
                }
            }
            WeekPolicy::Trailing7Days => Period {
                start: days_before(reference, 6),
                end: reference,
            },
        },
        GranularityMode::Monthly => {
            let start = reference.with_day(1).unwrap_or(reference);
            let end = start
                .checked_add_months(Months::new(1))
                .and_then(|next| next.pred_opt())
                .unwrap_or(NaiveDate::MAX);
            Period { start, end }
        }
        GranularityMode::Yearly => {
            let year = reference.year();
            Period {
                start: NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(NaiveDate::MIN),
                end: NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(NaiveDate::MAX),
            }
        }
    }
}

/// Resolve current and lookback periods under one shared week policy
pub fn resolve_pair(
    current: NaiveDate,
    lookback: NaiveDate,
    mode: GranularityMode,
    weeks: WeekPolicy,
) -> (Period, Period) {
    (
        resolve_period(current, mode, weeks),
        resolve_period(lookback, mode, weeks),
    )
}

/// Parse a caller-supplied reference date (`YYYY-MM-DD` or `MM/DD/YYYY`)
pub fn parse_reference_date(input: &str) -> CompareResult<NaiveDate> {
    let trimmed = input.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%m/%d/%Y"))
        .map_err(|_| CompareError::malformed_date(input))
}
