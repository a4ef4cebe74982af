use crate::api::Error;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

type KWh = f64;
type KW = f64;

pub type AccountId = String;

/// Length of one quarter-hourly bucket.
pub const QUARTER_HOUR_MINUTES: i64 = 15;

#[derive(Clone)]
pub struct Api {
    pub api_url: String,
    pub username: String,
    pub password: String,
    /// Connect/read timeout applied by the transport.
    pub timeout: Option<std::time::Duration>,
}

impl Api {
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("api_url", &self.api_url)
            .field("username", &self.username)
            .field("password", &"********")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeteringPoint {
    pub id: String,
    /// Remaining provider fields, passed through untouched.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Measured quantities of one time bucket. `None` means the provider has no data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Consumption {
    pub metered_value: Option<KWh>,
    pub estimated_value: Option<KWh>,
    pub grid_usage_leftover_value: Option<KWh>,
    pub self_coverage_value: Option<KWh>,
    pub joint_tenancy_proportion_value: Option<KWh>,
    pub metered_peak_demand: Option<KW>,
    pub estimated_peak_demand: Option<KW>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Interval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Interval {
    /// Quarter hour reported by the provider at its end instant. `None` if the start would
    /// fall outside the representable range.
    pub fn quarter_hour_ending_at(end: NaiveDateTime) -> Option<Self> {
        end.checked_sub_signed(Duration::minutes(QUARTER_HOUR_MINUTES))
            .map(|start| Interval { start, end })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "period", rename_all = "snake_case")]
pub enum ConsumptionRecord {
    QuarterHourly {
        interval: Option<Interval>,
        #[serde(flatten)]
        consumption: Consumption,
    },
    Daily {
        day: Option<NaiveDate>,
        #[serde(flatten)]
        consumption: Consumption,
    },
    Monthly {
        start: Option<NaiveDate>,
        #[serde(flatten)]
        consumption: Consumption,
    },
    Yearly {
        year: Option<String>,
        #[serde(flatten)]
        consumption: Consumption,
    },
}

impl ConsumptionRecord {
    pub fn consumption(&self) -> &Consumption {
        match self {
            ConsumptionRecord::QuarterHourly { consumption, .. }
            | ConsumptionRecord::Daily { consumption, .. }
            | ConsumptionRecord::Monthly { consumption, .. }
            | ConsumptionRecord::Yearly { consumption, .. } => consumption,
        }
    }

    /// `true` when the provider reported no timestamp for this bucket.
    pub fn is_unanchored(&self) -> bool {
        match self {
            ConsumptionRecord::QuarterHourly { interval, .. } => interval.is_none(),
            ConsumptionRecord::Daily { day, .. } => day.is_none(),
            ConsumptionRecord::Monthly { start, .. } => start.is_none(),
            ConsumptionRecord::Yearly { year, .. } => year.is_none(),
        }
    }
}

/// Period kind of a consumption query; decides how a reported timestamp anchors a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    QuarterHour,
    Day,
    Month,
    Year,
}

fn quarter_hour(end: NaiveDateTime) -> Result<Interval, Error> {
    Interval::quarter_hour_ending_at(end)
        .ok_or_else(|| Error::MalformedResponse(format!("timestamp out of range: {}", end)))
}

impl Granularity {
    pub fn record(
        self,
        timestamp: Option<NaiveDateTime>,
        consumption: Consumption,
    ) -> Result<ConsumptionRecord, Error> {
        let record = match self {
            Granularity::QuarterHour => ConsumptionRecord::QuarterHourly {
                interval: timestamp.map(quarter_hour).transpose()?,
                consumption,
            },
            Granularity::Day => ConsumptionRecord::Daily {
                day: timestamp.map(|ts| ts.date()),
                consumption,
            },
            Granularity::Month => ConsumptionRecord::Monthly {
                start: timestamp.and_then(|ts| ts.date().with_day(1)),
                consumption,
            },
            Granularity::Year => ConsumptionRecord::Yearly {
                year: timestamp.map(|ts| ts.year().to_string()),
                consumption,
            },
        };
        Ok(record)
    }
}
