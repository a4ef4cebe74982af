pub mod endpoint;
pub mod error;
pub mod response;
pub mod session;

use crate::model;
use chrono::{Datelike, NaiveDate};
pub use error::Error;
use model::{ConsumptionRecord, Granularity};
use response::consumption::ConsumptionResponse;
use response::user;
use serde::de::DeserializeOwned;
use serde_json::Value;
pub use session::{ApiRequest, SessionManager, SessionState};

pub fn api(api_url: String, username: String, password: String) -> model::Api {
    model::Api {
        api_url,
        username,
        password,
        timeout: None,
    }
}

fn parse<T: DeserializeOwned>(endpoint: &endpoint::Endpoint, text: &str) -> Result<T, Error> {
    serde_json::from_str::<T>(text)
        .map_err(|e| Error::MalformedResponse(format!("{} ({}): {}", endpoint, e, text)))
}

/// Typed access to the smartmeter API on top of a [`SessionManager`].
pub struct MeterClient {
    session: SessionManager,
}

impl MeterClient {
    pub fn new(api: model::Api) -> Self {
        MeterClient {
            session: SessionManager::new(api),
        }
    }

    /// Creates a client and logs in right away, so bad credentials surface immediately.
    pub async fn login(api: model::Api) -> Result<Self, Error> {
        let mut client = MeterClient::new(api);
        client.session.authenticate().await?;
        Ok(client)
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    async fn get<T: DeserializeOwned>(&mut self, request: ApiRequest) -> Result<T, Error> {
        let text = self.session.execute(&request).await?;
        parse(request.endpoint, &text)
    }

    async fn consumption(
        &mut self,
        request: ApiRequest,
        granularity: Granularity,
    ) -> Result<Vec<ConsumptionRecord>, Error> {
        let value: Value = self.get(request).await?;
        let response = ConsumptionResponse::from_value(value)?;
        response.normalize(granularity)
    }

    /// Profile of the logged in user, as returned by the API.
    pub async fn basic_info(&mut self) -> Result<Value, Error> {
        self.get(ApiRequest::get(endpoint::BASIC_INFO)).await
    }

    pub async fn accounts(&mut self) -> Result<Vec<model::AccountId>, Error> {
        self.get::<Vec<user::Account>>(ApiRequest::get(endpoint::ACCOUNTS))
            .await
            .map(|accounts| accounts.into_iter().map(|a| a.account_id).collect())
    }

    pub async fn metering_points(
        &mut self,
        account_id: &str,
    ) -> Result<Vec<model::MeteringPoint>, Error> {
        let request = ApiRequest::get(endpoint::METERING_POINTS)
            .query("accountId", account_id);

        self.get::<Vec<user::MeteringPoint>>(request)
            .await
            .map(|points| points.into_iter().map(Into::into).collect())
    }

    /// Metering points of every account, in account order. Fails as a whole if any
    /// account fails.
    pub async fn all_metering_points(&mut self) -> Result<Vec<model::MeteringPoint>, Error> {
        let mut metering_points = Vec::new();

        for account_id in self.accounts().await? {
            metering_points.extend(self.metering_points(&account_id).await?);
        }

        Ok(metering_points)
    }

    /// Monthly records of `year`.
    ///
    /// Served by the month endpoint queried without a month. No separate yearly endpoint is
    /// known; whether the API has one has not been checked against the live service.
    pub async fn consumption_year(
        &mut self,
        meter_id: &str,
        year: i32,
    ) -> Result<Vec<ConsumptionRecord>, Error> {
        let request = ApiRequest::get(endpoint::CONSUMPTION_MONTH)
            .query("meterId", meter_id)
            .query("year", year);

        self.consumption(request, Granularity::Month).await
    }

    /// Daily records of one month.
    pub async fn consumption_month(
        &mut self,
        meter_id: &str,
        year: i32,
        month: u32,
    ) -> Result<Vec<ConsumptionRecord>, Error> {
        if !(1..=12).contains(&month) {
            return Err(Error::InvalidArgument(format!("no such month: {}", month)));
        }

        let request = ApiRequest::get(endpoint::CONSUMPTION_MONTH)
            .query("meterId", meter_id)
            .query("year", year)
            .query("month", month);

        self.consumption(request, Granularity::Day).await
    }

    /// Quarter-hourly records of one day.
    pub async fn consumption_day(
        &mut self,
        meter_id: &str,
        day: NaiveDate,
    ) -> Result<Vec<ConsumptionRecord>, Error> {
        /* the API expects unpadded components, e.g. 2023-3-5 */
        let day = format!("{}-{}-{}", day.year(), day.month(), day.day());
        let request = ApiRequest::get(endpoint::CONSUMPTION_DAY)
            .query("meterId", meter_id)
            .query("day", day);

        self.consumption(request, Granularity::QuarterHour).await
    }
}
