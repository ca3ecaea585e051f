use thiserror::Error;

use crate::{api::RaceApiError, garage::GarageError, store::StoreError, winners::WinnersError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url '{url}': {reason}")]
    InvalidServerUrl { url: String, reason: String },
    #[error(transparent)]
    Api(#[from] RaceApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("garage: {0}")]
    Garage(#[from] GarageError),
    #[error("winners: {0}")]
    Winners(#[from] WinnersError),
}
