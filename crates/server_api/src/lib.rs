use shared::{
    domain::{Car, CarId, Engine, EngineStatus, Winner},
    error::{ApiError, ErrorCode},
    protocol::{CarRequest, DriveResponse, PageQuery, Paged, WinnerRequest, WinnersQuery},
};
use storage::Storage;
use tracing::info;

pub mod engine;

use engine::{DriveOutcome, EngineError, EngineRegistry};

const MAX_CAR_NAME_CHARS: usize = 64;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub engines: EngineRegistry,
}

/// Result of `PATCH /engine`, which answers differently per status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineReply {
    Engine(Engine),
    Drive(DriveResponse),
}

pub async fn list_cars(ctx: &ApiContext, query: PageQuery) -> Result<Paged<Car>, ApiError> {
    ctx.storage.list_cars(query).await.map_err(internal)
}

pub async fn get_car(ctx: &ApiContext, car_id: CarId) -> Result<Car, ApiError> {
    ctx.storage
        .get_car(car_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| car_not_found(car_id))
}

pub async fn create_car(ctx: &ApiContext, request: CarRequest) -> Result<Car, ApiError> {
    let request = validate_car_request(request)?;
    let car = ctx
        .storage
        .create_car(&request.name, &request.color)
        .await
        .map_err(internal)?;
    info!(car_id = car.id.0, name = %car.name, "garage: car created");
    Ok(car)
}

pub async fn update_car(
    ctx: &ApiContext,
    car_id: CarId,
    request: CarRequest,
) -> Result<Car, ApiError> {
    let request = validate_car_request(request)?;
    ctx.storage
        .update_car(car_id, &request.name, &request.color)
        .await
        .map_err(internal)?
        .ok_or_else(|| car_not_found(car_id))
}

/// Deletes the car, its winner record and its engine.
pub async fn delete_car(ctx: &ApiContext, car_id: CarId) -> Result<(), ApiError> {
    let deleted = ctx.storage.delete_car(car_id).await.map_err(internal)?;
    if !deleted {
        return Err(car_not_found(car_id));
    }
    let had_winner = ctx.storage.delete_winner(car_id).await.map_err(internal)?;
    ctx.engines.stop(car_id).await;
    info!(car_id = car_id.0, had_winner, "garage: car deleted");
    Ok(())
}

pub async fn set_engine_status(
    ctx: &ApiContext,
    car_id: CarId,
    status: EngineStatus,
) -> Result<EngineReply, ApiError> {
    // Engines only exist for cars in the garage.
    get_car(ctx, car_id).await?;

    match status {
        EngineStatus::Started => Ok(EngineReply::Engine(ctx.engines.start(car_id).await)),
        EngineStatus::Stopped => Ok(EngineReply::Engine(ctx.engines.stop(car_id).await)),
        EngineStatus::Drive => match ctx.engines.drive(car_id).await {
            Ok(DriveOutcome::Arrived) => Ok(EngineReply::Drive(DriveResponse { success: true })),
            Ok(DriveOutcome::Interrupted) => {
                Ok(EngineReply::Drive(DriveResponse { success: false }))
            }
            Err(err) => Err(engine_error(err)),
        },
    }
}

pub async fn list_winners(
    ctx: &ApiContext,
    query: WinnersQuery,
) -> Result<Paged<Winner>, ApiError> {
    ctx.storage.list_winners(query).await.map_err(internal)
}

pub async fn get_winner(ctx: &ApiContext, car_id: CarId) -> Result<Winner, ApiError> {
    ctx.storage
        .get_winner(car_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| winner_not_found(car_id))
}

/// Winner records only exist for cars in the garage.
pub async fn create_winner(ctx: &ApiContext, winner: Winner) -> Result<Winner, ApiError> {
    validate_time(winner.time)?;
    get_car(ctx, winner.id).await?;
    ctx.storage
        .create_winner(winner)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            ApiError::new(
                ErrorCode::Conflict,
                format!("winner record for car {} already exists", winner.id),
            )
        })
}

pub async fn update_winner(
    ctx: &ApiContext,
    car_id: CarId,
    request: WinnerRequest,
) -> Result<Winner, ApiError> {
    validate_time(request.time)?;
    ctx.storage
        .update_winner(car_id, request.wins, request.time)
        .await
        .map_err(internal)?
        .ok_or_else(|| winner_not_found(car_id))
}

pub async fn delete_winner(ctx: &ApiContext, car_id: CarId) -> Result<(), ApiError> {
    let deleted = ctx.storage.delete_winner(car_id).await.map_err(internal)?;
    if !deleted {
        return Err(winner_not_found(car_id));
    }
    Ok(())
}

pub async fn record_result(ctx: &ApiContext, car_id: CarId, time: f64) -> Result<Winner, ApiError> {
    validate_time(time)?;
    // A result can land after its car was deleted.
    get_car(ctx, car_id).await?;
    let winner = ctx
        .storage
        .record_result(car_id, time)
        .await
        .map_err(internal)?;
    info!(
        car_id = car_id.0,
        wins = winner.wins,
        best_time = winner.time,
        "winners: race result recorded"
    );
    Ok(winner)
}

fn validate_car_request(request: CarRequest) -> Result<CarRequest, ApiError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "car name cannot be empty"));
    }
    if name.chars().count() > MAX_CAR_NAME_CHARS {
        return Err(ApiError::new(ErrorCode::Validation, "car name is too long"));
    }
    if !is_hex_color(&request.color) {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "car color must look like #rrggbb",
        ));
    }
    Ok(CarRequest {
        name: name.to_string(),
        color: request.color.to_ascii_lowercase(),
    })
}

fn is_hex_color(color: &str) -> bool {
    color
        .strip_prefix('#')
        .is_some_and(|hex| hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

fn validate_time(time: f64) -> Result<(), ApiError> {
    if !time.is_finite() || time < 0.0 {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "race time must be a non-negative number of seconds",
        ));
    }
    Ok(())
}

fn engine_error(err: EngineError) -> ApiError {
    let code = match err {
        EngineError::NotStarted(_) => ErrorCode::NotFound,
        EngineError::AlreadyDriving(_) => ErrorCode::RateLimited,
        EngineError::BrokenDown(_) => ErrorCode::EngineFailure,
    };
    ApiError::new(code, err.to_string())
}

fn car_not_found(car_id: CarId) -> ApiError {
    ApiError::not_found(format!("car {car_id} not found"))
}

fn winner_not_found(car_id: CarId) -> ApiError {
    ApiError::not_found(format!("winner record for car {car_id} not found"))
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::internal(err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
