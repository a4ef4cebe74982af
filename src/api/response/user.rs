use crate::model;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/* The provider sends identifiers either as strings or as plain numbers */
fn identifier<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "unexpected identifier: {}",
            other
        ))),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(deserialize_with = "identifier")]
    pub account_id: model::AccountId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeteringPoint {
    #[serde(deserialize_with = "identifier")]
    pub metering_point_id: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl From<MeteringPoint> for model::MeteringPoint {
    fn from(point: MeteringPoint) -> Self {
        model::MeteringPoint {
            id: point.metering_point_id,
            details: point.details,
        }
    }
}
