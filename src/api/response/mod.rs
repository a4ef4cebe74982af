pub mod consumption;
pub mod user;
