//! HTTP delivery boundary

pub mod http;

pub use http::{run, AppState};
