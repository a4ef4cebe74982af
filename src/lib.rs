pub mod api;
pub mod model;

pub use api::{api, Error, MeterClient, SessionManager};
