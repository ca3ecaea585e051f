//! HTTP backend for the garage: cars, engines and winners over axum.

use std::sync::Arc;

use server_api::{engine::EngineRegistry, ApiContext};
use storage::Storage;

mod api;
mod app_state;
pub mod config;

pub use api::build_router;
pub use app_state::AppState;

use config::Settings;

/// Opens storage and the engine registry described by `settings`.
///
/// `settings.database_url` is used as-is; run it through
/// [`config::prepare_database_url`] first when it may point at a file.
pub async fn build_state(settings: &Settings) -> anyhow::Result<Arc<AppState>> {
    let storage = Storage::new(&settings.database_url).await?;
    let engines = EngineRegistry::new(settings.engine.clone());
    Ok(Arc::new(AppState {
        api: ApiContext { storage, engines },
    }))
}
