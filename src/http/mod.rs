//! The `http` module is the administrative REST surface.
//!
//! Routes live under `/api/v1` and every one of them requires a bearer token
//! carrying a permitted role.

pub mod routes;

pub use routes::{AppState, build_router, start_http_server};
