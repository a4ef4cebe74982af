use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use std::io::Cursor;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Login rejected, or the session was still rejected after logging in again.
    #[error("authentication failed: {0}")]
    AuthError(String),
    /// Non-200 response, carrying status code and body.
    #[error("API responded with status {0}: {1}")]
    ApiError(u16, String),
    #[error("malformed API response: {0}")]
    MalformedResponse(String),
    #[error("transport error: {0}")]
    TransportError(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unable to format metrics")]
    FormatError,
    #[error("internal error")]
    InternalError,
}

fn html_response(status: Status, title: &str, detail: String) -> response::Result<'static> {
    let error = format!(
        "<html><body><h3>{} {}</h3><code>{}</code></body></html>",
        status.code, title, detail
    );
    Response::build()
        .status(status)
        .sized_body(error.len(), Cursor::new(error))
        .header(ContentType::new("text", "html"))
        .ok()
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        match self {
            Error::AuthError(s) => html_response(
                Status::Forbidden,
                "Forbidden",
                format!("Error while authenticating to smartmeter API: {}", s),
            ),
            Error::InvalidArgument(s) => html_response(Status::BadRequest, "Bad Request", s),
            Error::ApiError(..) | Error::MalformedResponse(_) | Error::TransportError(_) => {
                html_response(Status::BadGateway, "Bad Gateway", self.to_string())
            }
            _ => html_response(
                Status::InternalServerError,
                "Internal Server Error",
                format!("{:?}", self),
            ),
        }
    }
}
