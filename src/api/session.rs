use crate::api::{endpoint, Error};
use crate::model;
use http::StatusCode;
use reqwest::Method;
use serde_json::Value;

use std::collections::HashMap;

/// Everything needed to send (and resend) one API call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub endpoint: &'static endpoint::Endpoint,
    pub query: Vec<(&'static str, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(endpoint: &'static endpoint::Endpoint) -> Self {
        ApiRequest {
            method: Method::GET,
            endpoint,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Failed,
}

enum Session {
    Unauthenticated,
    /* the client owns the cookie jar negotiated at login */
    Authenticated(reqwest::Client),
    Failed,
}

/// Holds one authenticated session against the provider.
///
/// Every call takes `&mut self`: a session serves one caller at a time. Callers sharing a
/// manager between tasks must put it behind a single lock, so that re-authentication after a
/// rejected request never runs twice at once.
pub struct SessionManager {
    api: model::Api,
    session: Session,
}

fn map_transport_err(error: reqwest::Error) -> Error {
    Error::TransportError(error.to_string())
}

/// Any failure to log in again while recovering an expired session is an authentication failure.
fn recovery_error(error: Error) -> Error {
    match error {
        Error::AuthError(_) => error,
        other => Error::AuthError(format!("re-authentication failed: {}", other)),
    }
}

impl SessionManager {
    pub fn new(api: model::Api) -> Self {
        SessionManager {
            api,
            session: Session::Unauthenticated,
        }
    }

    pub fn state(&self) -> SessionState {
        match self.session {
            Session::Unauthenticated => SessionState::Unauthenticated,
            Session::Authenticated(_) => SessionState::Authenticated,
            Session::Failed => SessionState::Failed,
        }
    }

    fn build_client(&self) -> Result<reqwest::Client, Error> {
        let builder = reqwest::ClientBuilder::new().cookie_store(true);
        match self.api.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
        .build()
        .or(Err(Error::InternalError))
    }

    async fn login(&self, client: &reqwest::Client) -> Result<(), Error> {
        let url = format!("{}{}", self.api.api_url, endpoint::LOGIN);
        let request_body = HashMap::from([
            ("user", self.api.username.to_owned()),
            ("pwd", self.api.password.to_owned()),
        ]);

        log::debug!("logging in as {}", self.api.username);

        let response = client
            .post(url)
            .json(&request_body)
            .send()
            .await
            .map_err(map_transport_err)?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => {
                let text = response.text().await.unwrap_or_default();
                log::trace!("login rejected with {}: {}", status, text);
                Err(Error::AuthError(text))
            }
        }
    }

    /// Logs in with a fresh cookie jar, replacing whatever session was held before.
    pub async fn authenticate(&mut self) -> Result<(), Error> {
        let client = self.build_client()?;

        match self.login(&client).await {
            Ok(()) => {
                self.session = Session::Authenticated(client);
                Ok(())
            }
            Err(e) => {
                self.session = Session::Failed;
                Err(e)
            }
        }
    }

    async fn client(&mut self) -> Result<reqwest::Client, Error> {
        if !matches!(self.session, Session::Authenticated(_)) {
            self.authenticate().await?;
        }

        match &self.session {
            Session::Authenticated(client) => Ok(client.clone()),
            _ => Err(Error::InternalError),
        }
    }

    async fn send(&mut self, request: &ApiRequest) -> Result<(StatusCode, String), Error> {
        let client = self.client().await?;
        let url = format!("{}{}", self.api.api_url, request.endpoint);

        let mut builder = client.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_transport_err)?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::TransportError(format!("Error reading API response: {}", e)))?;

        log::trace!(
            "endpoint: {}, query: {:?}, status: {}, response_text: {}",
            request.endpoint,
            request.query,
            status,
            text
        );

        Ok((status, text))
    }

    /// Sends `request` and returns the body of a 200 response.
    ///
    /// A 401 triggers exactly one re-authentication and one resend of the same request; the
    /// outcome of that resend is final.
    pub async fn execute(&mut self, request: &ApiRequest) -> Result<String, Error> {
        let (status, text) = match self.send(request).await? {
            (StatusCode::UNAUTHORIZED, _) => {
                log::info!(
                    "session rejected by {}, re-authenticating",
                    request.endpoint
                );
                self.authenticate().await.map_err(recovery_error)?;

                log::debug!("resending {} {}", request.method, request.endpoint);
                self.send(request).await?
            }
            response => response,
        };

        match status {
            StatusCode::OK => Ok(text),
            StatusCode::UNAUTHORIZED => Err(Error::AuthError(format!(
                "session rejected after re-authentication: {}",
                text
            ))),
            status => Err(Error::ApiError(status.as_u16(), text)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use mockito::{Matcher, Mock, Server, ServerGuard};
    use serde_json::json;

    async fn login_mock(server: &mut ServerGuard, status: usize, hits: usize) -> Mock {
        let body = match status {
            200 => "",
            _ => "invalid credentials",
        };
        server
            .mock("POST", endpoint::LOGIN)
            .match_body(Matcher::Json(json!({"user": "user", "pwd": "secret"})))
            .with_status(status)
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }

    fn manager(server: &ServerGuard) -> SessionManager {
        let api = crate::api::api(server.url(), "user".to_string(), "secret".to_string());
        SessionManager::new(api)
    }

    #[tokio::test]
    async fn authenticate_then_execute_without_relogin() {
        let mut server = Server::new_async().await;
        let login = login_mock(&mut server, 200, 1).await;
        let info = server
            .mock("GET", endpoint::BASIC_INFO)
            .with_status(200)
            .with_body(r#"{"firstname":"Max"}"#)
            .expect(2)
            .create_async()
            .await;

        let mut manager = manager(&server);
        assert_eq!(SessionState::Unauthenticated, manager.state());
        manager.authenticate().await.unwrap();
        assert_eq!(SessionState::Authenticated, manager.state());

        let request = ApiRequest::get(endpoint::BASIC_INFO);
        for _ in 0..2 {
            let body = manager.execute(&request).await.unwrap();
            assert_eq!(r#"{"firstname":"Max"}"#, body);
        }

        login.assert_async().await;
        info.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_login_is_auth_error() {
        let mut server = Server::new_async().await;
        let login = login_mock(&mut server, 403, 1).await;

        let mut manager = manager(&server);
        assert_eq!(
            Err(Error::AuthError("invalid credentials".to_string())),
            manager.authenticate().await
        );
        assert_eq!(SessionState::Failed, manager.state());
        login.assert_async().await;
    }

    #[tokio::test]
    async fn execute_logs_in_first_when_unauthenticated() {
        let mut server = Server::new_async().await;
        let login = login_mock(&mut server, 200, 1).await;
        let info = server
            .mock("GET", endpoint::BASIC_INFO)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let mut manager = manager(&server);
        let request = ApiRequest::get(endpoint::BASIC_INFO);
        manager.execute(&request).await.unwrap();
        assert_eq!(SessionState::Authenticated, manager.state());

        login.assert_async().await;
        info.assert_async().await;
    }

    #[tokio::test]
    async fn expired_session_is_renewed_and_request_replayed_once() {
        let mut server = Server::new_async().await;
        let login = login_mock(&mut server, 200, 2).await;
        let query = Matcher::AllOf(vec![
            Matcher::UrlEncoded("meterId".into(), "AT001".into()),
            Matcher::UrlEncoded("year".into(), "2023".into()),
        ]);
        let expired = server
            .mock("GET", endpoint::CONSUMPTION_MONTH)
            .match_query(query.clone())
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let replayed = server
            .mock("GET", endpoint::CONSUMPTION_MONTH)
            .match_query(query)
            .with_status(200)
            .with_body("[]")
            .expect(1)
            .create_async()
            .await;

        let mut manager = manager(&server);
        manager.authenticate().await.unwrap();
        let request = ApiRequest::get(endpoint::CONSUMPTION_MONTH)
            .query("meterId", "AT001")
            .query("year", 2023);
        assert_eq!("[]", manager.execute(&request).await.unwrap());
        assert_eq!(SessionState::Authenticated, manager.state());

        login.assert_async().await;
        expired.assert_async().await;
        replayed.assert_async().await;
    }

    #[tokio::test]
    async fn replay_resends_the_same_body() {
        let mut server = Server::new_async().await;
        let login = login_mock(&mut server, 200, 2).await;
        let body = json!({"meterId": "AT001"});
        let expired = server
            .mock("POST", endpoint::BASIC_INFO)
            .match_body(Matcher::Json(body.clone()))
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let replayed = server
            .mock("POST", endpoint::BASIC_INFO)
            .match_body(Matcher::Json(body.clone()))
            .with_status(200)
            .with_body("ok")
            .expect(1)
            .create_async()
            .await;

        let mut manager = manager(&server);
        let request = ApiRequest {
            method: Method::POST,
            ..ApiRequest::get(endpoint::BASIC_INFO)
        }
        .json(body);
        assert_eq!("ok", manager.execute(&request).await.unwrap());

        login.assert_async().await;
        expired.assert_async().await;
        replayed.assert_async().await;
    }

    #[tokio::test]
    async fn repeated_unauthorized_does_not_loop() {
        let mut server = Server::new_async().await;
        let login = login_mock(&mut server, 200, 2).await;
        let info = server
            .mock("GET", endpoint::BASIC_INFO)
            .with_status(401)
            .with_body("expired")
            .expect(2)
            .create_async()
            .await;

        let mut manager = manager(&server);
        manager.authenticate().await.unwrap();
        let request = ApiRequest::get(endpoint::BASIC_INFO);
        let result = manager.execute(&request).await;
        assert!(matches!(result, Err(Error::AuthError(_))));

        login.assert_async().await;
        info.assert_async().await;
    }

    #[tokio::test]
    async fn failed_reauthentication_propagates() {
        let mut server = Server::new_async().await;
        let first_login = login_mock(&mut server, 200, 1).await;
        let second_login = login_mock(&mut server, 403, 1).await;
        let info = server
            .mock("GET", endpoint::BASIC_INFO)
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let mut manager = manager(&server);
        manager.authenticate().await.unwrap();
        let request = ApiRequest::get(endpoint::BASIC_INFO);
        assert_eq!(
            Err(Error::AuthError("invalid credentials".to_string())),
            manager.execute(&request).await
        );
        assert_eq!(SessionState::Failed, manager.state());

        first_login.assert_async().await;
        second_login.assert_async().await;
        info.assert_async().await;
    }

    #[test]
    fn failed_recovery_is_always_auth_error() {
        let transport = Error::TransportError("connection reset".to_string());
        assert!(matches!(recovery_error(transport), Error::AuthError(_)));

        let rejected = Error::AuthError("invalid credentials".to_string());
        assert_eq!(rejected.clone(), recovery_error(rejected));
    }

    #[tokio::test]
    async fn failed_session_logs_in_again_on_next_request() {
        let mut server = Server::new_async().await;
        let rejected = login_mock(&mut server, 403, 1).await;
        let accepted = login_mock(&mut server, 200, 1).await;
        let info = server
            .mock("GET", endpoint::BASIC_INFO)
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let mut manager = manager(&server);
        assert!(manager.authenticate().await.is_err());
        assert_eq!(SessionState::Failed, manager.state());

        let request = ApiRequest::get(endpoint::BASIC_INFO);
        assert_eq!("{}", manager.execute(&request).await.unwrap());
        assert_eq!(SessionState::Authenticated, manager.state());

        rejected.assert_async().await;
        accepted.assert_async().await;
        info.assert_async().await;
    }

    #[tokio::test]
    async fn other_status_is_api_error_without_relogin() {
        let mut server = Server::new_async().await;
        let login = login_mock(&mut server, 200, 1).await;
        let info = server
            .mock("GET", endpoint::BASIC_INFO)
            .with_status(500)
            .with_body("maintenance")
            .expect(1)
            .create_async()
            .await;

        let mut manager = manager(&server);
        manager.authenticate().await.unwrap();
        let request = ApiRequest::get(endpoint::BASIC_INFO);
        assert_eq!(
            Err(Error::ApiError(500, "maintenance".to_string())),
            manager.execute(&request).await
        );

        login.assert_async().await;
        info.assert_async().await;
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let mut manager = SessionManager::new(
            crate::api::api(
                "http://127.0.0.1:9".to_string(),
                "user".to_string(),
                "secret".to_string(),
            )
            .with_timeout(std::time::Duration::from_secs(2)),
        );
        assert!(matches!(
            manager.authenticate().await,
            Err(Error::TransportError(_))
        ));
        assert_eq!(SessionState::Failed, manager.state());
    }
}
