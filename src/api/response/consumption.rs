use crate::api::Error;
use crate::model::{Consumption, ConsumptionRecord, Granularity};
use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;

const ARRAY_FIELDS: [&str; 8] = [
    "meteredValues",
    "estimatedValues",
    "gridUsageLeftoverValues",
    "selfCoverageValues",
    "jointTenancyProportionValues",
    "meteredPeakDemands",
    "estimatedPeakDemands",
    "peakDemandTimes",
];

/// Parallel arrays of one consumption response; index `i` of every array is bucket `i`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionArrays {
    pub metered_values: Vec<Option<f64>>,
    pub estimated_values: Vec<Option<f64>>,
    pub grid_usage_leftover_values: Vec<Option<f64>>,
    pub self_coverage_values: Vec<Option<f64>>,
    pub joint_tenancy_proportion_values: Vec<Option<f64>>,
    pub metered_peak_demands: Vec<Option<f64>>,
    pub estimated_peak_demands: Vec<Option<f64>>,
    pub peak_demand_times: Vec<Option<String>>,
}

/* Day queries may answer with one object per register instead of a single object */
#[derive(Debug)]
pub struct ConsumptionResponse(Vec<ConsumptionArrays>);

fn arrays_from_value(value: Value) -> Result<ConsumptionArrays, Error> {
    let object = match value.as_object() {
        Some(object) => object,
        None => return Err(Error::MalformedResponse(format!("not an object: {}", value))),
    };

    for field in ARRAY_FIELDS {
        let problem = match object.get(field) {
            Some(Value::Array(_)) => continue,
            Some(other) => format!("{} is not an array: {}", field, other),
            None => format!("missing field {}", field),
        };
        return Err(Error::MalformedResponse(problem));
    }

    serde_json::from_value(value)
        .map_err(|e| Error::MalformedResponse(format!("consumption record: {}", e)))
}

impl ConsumptionResponse {
    /// Reads either a single consumption object or an array of them.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Array(objects) => objects
                .into_iter()
                .map(arrays_from_value)
                .collect::<Result<Vec<_>, _>>()
                .map(ConsumptionResponse),
            object => Ok(ConsumptionResponse(vec![arrays_from_value(object)?])),
        }
    }

    pub fn normalize(self, granularity: Granularity) -> Result<Vec<ConsumptionRecord>, Error> {
        let mut records = Vec::new();
        for arrays in self.0 {
            records.extend(arrays.normalize(granularity)?);
        }
        Ok(records)
    }
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, Error> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.naive_local()))
        .map_err(|e| Error::MalformedResponse(format!("invalid timestamp {:?}: {}", s, e)))
}

impl ConsumptionArrays {
    /// Checks that every value array is as long as `peakDemandTimes` and returns that length.
    fn validate(&self) -> Result<usize, Error> {
        let expected = self.peak_demand_times.len();
        let columns = [
            ("meteredValues", self.metered_values.len()),
            ("estimatedValues", self.estimated_values.len()),
            ("gridUsageLeftoverValues", self.grid_usage_leftover_values.len()),
            ("selfCoverageValues", self.self_coverage_values.len()),
            ("jointTenancyProportionValues", self.joint_tenancy_proportion_values.len()),
            ("meteredPeakDemands", self.metered_peak_demands.len()),
            ("estimatedPeakDemands", self.estimated_peak_demands.len()),
        ];

        match columns.iter().find(|(_, len)| *len != expected) {
            Some((name, len)) => Err(Error::MalformedResponse(format!(
                "{} has {} entries but peakDemandTimes has {}",
                name, len, expected
            ))),
            None => Ok(expected),
        }
    }

    pub fn normalize(self, granularity: Granularity) -> Result<Vec<ConsumptionRecord>, Error> {
        let len = self.validate()?;

        (0..len)
            .map(|i| -> Result<ConsumptionRecord, Error> {
                let timestamp = self.peak_demand_times[i]
                    .as_deref()
                    .map(parse_timestamp)
                    .transpose()?;
                let consumption = Consumption {
                    metered_value: self.metered_values[i],
                    estimated_value: self.estimated_values[i],
                    grid_usage_leftover_value: self.grid_usage_leftover_values[i],
                    self_coverage_value: self.self_coverage_values[i],
                    joint_tenancy_proportion_value: self.joint_tenancy_proportion_values[i],
                    metered_peak_demand: self.metered_peak_demands[i],
                    estimated_peak_demand: self.estimated_peak_demands[i],
                };
                granularity.record(timestamp, consumption)
            })
            .collect()
    }
}
