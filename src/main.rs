#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prometheus;
#[macro_use]
extern crate rocket;

use chrono::NaiveDate;
use config::Config;
use rocket::http::ContentType;
use rocket::{Build, Rocket, State};
use serde::Serialize;
use smartmeter_rs::{api, Error, MeterClient};
use std::sync::Mutex;
use std::time::{Duration, Instant};

mod metrics;

const API_URL: &str = "https://smartmeter.netz-noe.at";

#[derive(Clone, serde::Deserialize)]
pub struct SmartmeterConfig {
    api_url: String,
    username: String,
    password: String,
    interval: u64,
    timeout: u64,
}

/// Structure containing state for API handlers.
pub struct StateData {
    /// One session shared by all handlers; the lock serializes every API call.
    client: tokio::sync::Mutex<MeterClient>,
    interval: u64,
    /// Timestamp of last successful metric collection via `metrics::collect()`
    timestamp: Mutex<Option<Instant>>,
}

impl StateData {
    /// Updates `timestamp` to `now()`.
    fn touch(&self) {
        if let Ok(mut ts) = self.timestamp.lock() {
            *ts = Some(Instant::now());
        } else {
            log::trace!("Unable to lock timestamp mutex, will refresh again")
        }
    }

    /// Checks whether `interval_seconds` elapsed since last `touch()`
    fn interval_elapsed(&self, interval_secs: u64) -> bool {
        let elapsed_opt = self
            .timestamp
            .lock()
            .ok()
            .and_then(|a| a.map(|b| b.elapsed().as_secs()));

        if let Some(elapsed) = elapsed_opt {
            elapsed > interval_secs
        } else {
            /* If there is None timestamp/elapsed, always return true to trigger action */
            true
        }
    }
}

pub fn read_settings() -> Result<SmartmeterConfig, config::ConfigError> {
    let mut settings = Config::default();
    settings
        .merge(config::Environment::with_prefix("SMARTMETER"))?
        .set_default("api_url", API_URL)?
        .set_default("interval", 900_i64)?
        .set_default("timeout", 30_i64)?;

    settings.try_into()
}

fn json<T: Serialize>(value: &T) -> Result<(ContentType, String), Error> {
    serde_json::to_string(value)
        .map(|body| (ContentType::JSON, body))
        .or(Err(Error::FormatError))
}

#[get("/metrics")]
async fn metrics_route(state: &State<StateData>) -> Result<String, Error> {
    if state.interval_elapsed(state.interval) {
        let today = chrono::Local::now().date_naive();
        metrics::collect(&mut *state.client.lock().await, today).await?;
        state.touch();
    } else {
        log::info!("interval time not yet elapsed since last run; returning cached result")
    }
    metrics::read().await
}

#[get("/metering-points")]
async fn metering_points_route(state: &State<StateData>) -> Result<(ContentType, String), Error> {
    let points = state.client.lock().await.all_metering_points().await?;
    json(&points)
}

#[get("/consumption/<meter_id>/year/<year>")]
async fn consumption_year_route(
    state: &State<StateData>,
    meter_id: &str,
    year: i32,
) -> Result<(ContentType, String), Error> {
    let records = state
        .client
        .lock()
        .await
        .consumption_year(meter_id, year)
        .await?;
    json(&records)
}

#[get("/consumption/<meter_id>/month/<year>/<month>")]
async fn consumption_month_route(
    state: &State<StateData>,
    meter_id: &str,
    year: i32,
    month: u32,
) -> Result<(ContentType, String), Error> {
    let records = state
        .client
        .lock()
        .await
        .consumption_month(meter_id, year, month)
        .await?;
    json(&records)
}

#[get("/consumption/<meter_id>/day/<day>")]
async fn consumption_day_route(
    state: &State<StateData>,
    meter_id: &str,
    day: &str,
) -> Result<(ContentType, String), Error> {
    let day = NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| Error::InvalidArgument(format!("{}: {}", day, e)))?;
    let records = state
        .client
        .lock()
        .await
        .consumption_day(meter_id, day)
        .await?;
    json(&records)
}

#[launch]
fn rocket() -> Rocket<Build> {
    env_logger::init();

    let settings = read_settings().expect("Configuration error");
    let api = api(settings.api_url, settings.username, settings.password)
        .with_timeout(Duration::from_secs(settings.timeout));
    let state = StateData {
        client: tokio::sync::Mutex::new(MeterClient::new(api)),
        interval: settings.interval,
        timestamp: Mutex::new(None),
    };

    rocket::build().manage(state).mount(
        "/",
        routes![
            metrics_route,
            metering_points_route,
            consumption_year_route,
            consumption_month_route,
            consumption_day_route
        ],
    )
}
