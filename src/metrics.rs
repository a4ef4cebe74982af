use chrono::{Datelike, NaiveDate};
use prometheus::{Encoder, GaugeVec, TextEncoder};
use smartmeter_rs::model::{ConsumptionRecord, MeteringPoint};
use smartmeter_rs::{Error, MeterClient};

lazy_static! {
    static ref METERED_CONSUMPTION_GAUGE: GaugeVec = register_gauge_vec!(
        opts!(
            "metered_consumption",
            "metered consumption of the latest day with metered data (in kWh)",
        ),
        &["metering_point"],
    )
    .unwrap();
    static ref METERED_PEAK_DEMAND_GAUGE: GaugeVec = register_gauge_vec!(
        opts!(
            "metered_peak_demand",
            "metered peak demand of the latest day with metered data (in kW)",
        ),
        &["metering_point"],
    )
    .unwrap();
}

/// Latest daily record carrying a metered value.
fn latest_metered_day(records: &[ConsumptionRecord]) -> Option<&ConsumptionRecord> {
    records
        .iter()
        .rev()
        .find(|record| record.consumption().metered_value.is_some())
}

/// Read this month's daily consumption of `point` and feed the latest metered day to the gauges.
async fn collect_metering_point(
    client: &mut MeterClient,
    point: &MeteringPoint,
    today: NaiveDate,
) -> Result<(), Error> {
    let records = client
        .consumption_month(&point.id, today.year(), today.month())
        .await?;

    match latest_metered_day(&records) {
        Some(record) => {
            let consumption = record.consumption();
            if let Some(value) = consumption.metered_value {
                METERED_CONSUMPTION_GAUGE
                    .with_label_values(&[&point.id])
                    .set(value);
            }
            if let Some(peak) = consumption.metered_peak_demand {
                METERED_PEAK_DEMAND_GAUGE
                    .with_label_values(&[&point.id])
                    .set(peak);
            }
        }
        None => log::warn!("No metered consumption returned for {}", point.id),
    }
    Ok(())
}

/// Collect consumption of every metering point, updating Prometheus exporter registry.
pub async fn collect(client: &mut MeterClient, today: NaiveDate) -> Result<(), Error> {
    let points = client.all_metering_points().await?;

    for point in points {
        if let Err(e) = collect_metering_point(client, &point, today).await {
            log::error!("Unable to collect consumption of {}: {}", point.id, e);
        }
    }

    Ok(())
}

/// Read metrics from Prometheus exporter registry.
pub async fn read() -> Result<String, Error> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder
        .encode(&metric_families, &mut buffer)
        .or(Err(Error::FormatError))?;
    String::from_utf8(buffer).or(Err(Error::FormatError))
}
