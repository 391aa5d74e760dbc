//! Named sampling frequencies (ts_type)

use crate::{Error, Result};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Timelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Sampling frequency tag, ordered from finest to coarsest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TsType {
    Minutely,
    Hourly,
    #[serde(rename = "3hourly")]
    ThreeHourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

fn ts_type_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d*)(minutely|hourly|daily|weekly|monthly|yearly)$")
            .expect("ts_type pattern is valid")
    })
}

impl TsType {
    /// Start of the sampling period containing `time`
    pub fn floor(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let date = time.date_naive();
        let start_of_day = |d: NaiveDate| Utc.from_utc_datetime(&d.and_time(Default::default()));
        match self {
            TsType::Minutely => time
                .with_second(0)
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(time),
            TsType::Hourly => start_of_day(date) + Duration::hours(time.hour() as i64),
            TsType::ThreeHourly => {
                start_of_day(date) + Duration::hours((time.hour() / 3 * 3) as i64)
            }
            TsType::Daily => start_of_day(date),
            TsType::Weekly => {
                let offset = date.weekday().num_days_from_monday() as i64;
                start_of_day(date - Duration::days(offset))
            }
            TsType::Monthly => start_of_day(date.with_day(1).unwrap_or(date)),
            TsType::Yearly => start_of_day(
                NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
            ),
        }
    }

    /// Start of the sampling period following the one starting at `period_start`
    pub fn next(&self, period_start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            TsType::Minutely => period_start + Duration::minutes(1),
            TsType::Hourly => period_start + Duration::hours(1),
            TsType::ThreeHourly => period_start + Duration::hours(3),
            TsType::Daily => period_start + Duration::days(1),
            TsType::Weekly => period_start + Duration::weeks(1),
            TsType::Monthly => period_start
                .checked_add_months(Months::new(1))
                .unwrap_or(period_start + Duration::days(31)),
            TsType::Yearly => period_start
                .checked_add_months(Months::new(12))
                .unwrap_or(period_start + Duration::days(366)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TsType::Minutely => "minutely",
            TsType::Hourly => "hourly",
            TsType::ThreeHourly => "3hourly",
            TsType::Daily => "daily",
            TsType::Weekly => "weekly",
            TsType::Monthly => "monthly",
            TsType::Yearly => "yearly",
        }
    }
}

impl fmt::Display for TsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TsType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        let caps = ts_type_regex().captures(&normalized).ok_or_else(|| {
            Error::configuration(format!("Invalid ts_type '{}'", s))
        })?;

        let multiple = match &caps[1] {
            "" => 1,
            digits => digits
                .parse::<u32>()
                .map_err(|_| Error::configuration(format!("Invalid ts_type '{}'", s)))?,
        };

        match (multiple, &caps[2]) {
            (1, "minutely") => Ok(TsType::Minutely),
            (1, "hourly") => Ok(TsType::Hourly),
            (3, "hourly") => Ok(TsType::ThreeHourly),
            (1, "daily") => Ok(TsType::Daily),
            (1, "weekly") => Ok(TsType::Weekly),
            (1, "monthly") => Ok(TsType::Monthly),
            (1, "yearly") => Ok(TsType::Yearly),
            _ => Err(Error::configuration(format!(
                "Unsupported ts_type multiple '{}'",
                s
            ))),
        }
    }
}
