pub mod auth;
pub mod headers;
