use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use server_api::EngineReply;
use shared::{
    domain::{Car, CarId, Winner},
    error::{ApiError, ErrorCode},
    protocol::{
        CarRequest, EngineQuery, PageQuery, Paged, RaceResultRequest, WinnerRequest,
        WinnersQuery,
    },
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
};
use tracing::error;

use crate::app_state::AppState;

const MAX_BODY_BYTES: usize = 16 * 1024;
const TOTAL_COUNT: HeaderName = HeaderName::from_static("x-total-count");

type HttpResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any)
        .expose_headers([TOTAL_COUNT]);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/garage", get(http_list_cars).post(http_create_car))
        .route(
            "/garage/:id",
            get(http_get_car).put(http_update_car).delete(http_delete_car),
        )
        .route("/engine", patch(http_patch_engine))
        .route("/winners", get(http_list_winners).post(http_create_winner))
        .route(
            "/winners/:id",
            get(http_get_winner)
                .put(http_update_winner)
                .delete(http_delete_winner),
        )
        .route("/winners/:id/results", post(http_record_result))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> HttpResult<&'static str> {
    state.api.storage.health_check().await.map_err(|e| {
        error!(error = %e, "healthz: storage unavailable");
        reject(ApiError::internal(e.to_string()))
    })?;
    Ok("ok")
}

async fn http_list_cars(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PageQuery>,
) -> HttpResult<(HeaderMap, Json<Vec<Car>>)> {
    let page = server_api::list_cars(&state.api, q).await.map_err(reject)?;
    Ok(paged_response(page))
}

async fn http_get_car(
    State(state): State<Arc<AppState>>,
    Path(car_id): Path<i64>,
) -> HttpResult<Json<Car>> {
    let car = server_api::get_car(&state.api, CarId(car_id))
        .await
        .map_err(reject)?;
    Ok(Json(car))
}

async fn http_create_car(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CarRequest>,
) -> HttpResult<(StatusCode, Json<Car>)> {
    let car = server_api::create_car(&state.api, req)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(car)))
}

async fn http_update_car(
    State(state): State<Arc<AppState>>,
    Path(car_id): Path<i64>,
    Json(req): Json<CarRequest>,
) -> HttpResult<Json<Car>> {
    let car = server_api::update_car(&state.api, CarId(car_id), req)
        .await
        .map_err(reject)?;
    Ok(Json(car))
}

async fn http_delete_car(
    State(state): State<Arc<AppState>>,
    Path(car_id): Path<i64>,
) -> HttpResult<Json<serde_json::Value>> {
    server_api::delete_car(&state.api, CarId(car_id))
        .await
        .map_err(reject)?;
    Ok(Json(serde_json::json!({})))
}

async fn http_patch_engine(
    State(state): State<Arc<AppState>>,
    Query(q): Query<EngineQuery>,
) -> HttpResult<Response> {
    let reply = server_api::set_engine_status(&state.api, q.id, q.status)
        .await
        .map_err(reject)?;
    Ok(match reply {
        EngineReply::Engine(engine) => Json(engine).into_response(),
        EngineReply::Drive(drive) => Json(drive).into_response(),
    })
}

async fn http_list_winners(
    State(state): State<Arc<AppState>>,
    Query(q): Query<WinnersQuery>,
) -> HttpResult<(HeaderMap, Json<Vec<Winner>>)> {
    let page = server_api::list_winners(&state.api, q)
        .await
        .map_err(reject)?;
    Ok(paged_response(page))
}

async fn http_get_winner(
    State(state): State<Arc<AppState>>,
    Path(car_id): Path<i64>,
) -> HttpResult<Json<Winner>> {
    let winner = server_api::get_winner(&state.api, CarId(car_id))
        .await
        .map_err(reject)?;
    Ok(Json(winner))
}

async fn http_create_winner(
    State(state): State<Arc<AppState>>,
    Json(req): Json<Winner>,
) -> HttpResult<(StatusCode, Json<Winner>)> {
    let winner = server_api::create_winner(&state.api, req)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(winner)))
}

async fn http_update_winner(
    State(state): State<Arc<AppState>>,
    Path(car_id): Path<i64>,
    Json(req): Json<WinnerRequest>,
) -> HttpResult<Json<Winner>> {
    let winner = server_api::update_winner(&state.api, CarId(car_id), req)
        .await
        .map_err(reject)?;
    Ok(Json(winner))
}

async fn http_delete_winner(
    State(state): State<Arc<AppState>>,
    Path(car_id): Path<i64>,
) -> HttpResult<Json<serde_json::Value>> {
    server_api::delete_winner(&state.api, CarId(car_id))
        .await
        .map_err(reject)?;
    Ok(Json(serde_json::json!({})))
}

async fn http_record_result(
    State(state): State<Arc<AppState>>,
    Path(car_id): Path<i64>,
    Json(req): Json<RaceResultRequest>,
) -> HttpResult<Json<Winner>> {
    let winner = server_api::record_result(&state.api, CarId(car_id), req.time)
        .await
        .map_err(reject)?;
    Ok(Json(winner))
}

fn paged_response<T>(page: Paged<T>) -> (HeaderMap, Json<Vec<T>>) {
    let mut headers = HeaderMap::new();
    headers.insert(TOTAL_COUNT, HeaderValue::from(page.total));
    (headers, Json(page.items))
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::EngineFailure | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> (StatusCode, Json<ApiError>) {
    if err.code == ErrorCode::Internal {
        error!(message = %err.message, "request failed");
    }
    (status_for(err.code), Json(err))
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
