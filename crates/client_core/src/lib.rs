//! Headless client for the garage race app.
//!
//! The crate holds everything a front end needs short of drawing: the HTTP
//! client for the race backend, the reactive [`store::Store`], the garage and
//! winners view-models with their pagination, per-car [`track::Track`]
//! animation state and the [`app::App`] router that wires them together.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod garage;
pub mod generation;
pub mod pagination;
pub mod store;
pub mod track;
pub mod winners;

pub use api::{HttpRaceApi, RaceApi, RaceApiError};
pub use app::{App, AppPage};
pub use config::ClientSettings;
pub use error::ClientError;

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/e2e_tests.rs"]
mod e2e_tests;
