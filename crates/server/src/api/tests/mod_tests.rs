use super::*;
use axum::{
    body::{self, Body},
    http::Request,
};
use server_api::{
    engine::{EngineRegistry, EngineSettings},
    ApiContext,
};
use storage::Storage;
use tower::ServiceExt;

async fn test_app(breakdown_chance: f64) -> Router {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let engines = EngineRegistry::new(EngineSettings {
        breakdown_chance,
        drive_time_scale: 0.0,
        ..EngineSettings::default()
    });
    build_router(Arc::new(AppState {
        api: ApiContext { storage, engines },
    }))
}

fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

async fn create(app: &Router, name: &str, color: &str) -> Car {
    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/garage",
            serde_json::json!({ "name": name, "color": color }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let app = test_app(0.0).await;
    let response = app
        .oneshot(empty_request(Method::GET, "/healthz"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn garage_page_reports_total_count_header() {
    let app = test_app(0.0).await;
    for i in 0..9 {
        create(&app, &format!("Car {i}"), "#00ff00").await;
    }

    let response = app
        .oneshot(empty_request(Method::GET, "/garage?_page=2&_limit=7"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("x-total-count")
            .and_then(|v| v.to_str().ok()),
        Some("9")
    );
    let cars: Vec<Car> = read_json(response).await;
    assert_eq!(cars.len(), 2);
    assert_eq!(cars[0].name, "Car 7");
}

#[tokio::test]
async fn missing_car_is_not_found() {
    let app = test_app(0.0).await;
    let response = app
        .oneshot(empty_request(Method::GET, "/garage/42"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let err: ApiError = read_json(response).await;
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn invalid_color_is_a_bad_request() {
    let app = test_app(0.0).await;
    let response = app
        .oneshot(json_request(
            Method::POST,
            "/garage",
            serde_json::json!({ "name": "Lada", "color": "blue" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_then_delete_car() {
    let app = test_app(0.0).await;
    let car = create(&app, "Tesla", "#ff0000").await;

    let response = app
        .clone()
        .oneshot(json_request(
            Method::PUT,
            &format!("/garage/{}", car.id),
            serde_json::json!({ "name": "Tesla S", "color": "#0000ff" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Car = read_json(response).await;
    assert_eq!(updated.name, "Tesla S");
    assert_eq!(updated.color, "#0000ff");

    let response = app
        .clone()
        .oneshot(empty_request(Method::DELETE, &format!("/garage/{}", car.id)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(empty_request(Method::GET, &format!("/garage/{}", car.id)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn drive_without_start_is_not_found() {
    let app = test_app(0.0).await;
    let car = create(&app, "BMW", "#123456").await;
    let response = app
        .oneshot(empty_request(
            Method::PATCH,
            &format!("/engine?id={}&status=drive", car.id),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn start_drive_and_stop_engine() {
    let app = test_app(0.0).await;
    let car = create(&app, "BMW", "#123456").await;

    let response = app
        .clone()
        .oneshot(empty_request(
            Method::PATCH,
            &format!("/engine?id={}&status=started", car.id),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let engine: shared::domain::Engine = read_json(response).await;
    assert!(engine.velocity > 0.0);
    assert_eq!(engine.distance, 500_000.0);

    let response = app
        .clone()
        .oneshot(empty_request(
            Method::PATCH,
            &format!("/engine?id={}&status=drive", car.id),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let drive: shared::protocol::DriveResponse = read_json(response).await;
    assert!(drive.success);

    let response = app
        .oneshot(empty_request(
            Method::PATCH,
            &format!("/engine?id={}&status=stopped", car.id),
        ))
        .await
        .expect("response");
    let engine: shared::domain::Engine = read_json(response).await;
    assert_eq!(engine.velocity, 0.0);
}

#[tokio::test]
async fn broken_engine_is_a_server_error() {
    let app = test_app(1.0).await;
    let car = create(&app, "Moskvich", "#abcdef").await;
    app.clone()
        .oneshot(empty_request(
            Method::PATCH,
            &format!("/engine?id={}&status=started", car.id),
        ))
        .await
        .expect("response");

    let response = app
        .oneshot(empty_request(
            Method::PATCH,
            &format!("/engine?id={}&status=drive", car.id),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn duplicate_winner_is_a_conflict() {
    let app = test_app(0.0).await;
    let car = create(&app, "Lada", "#00ff00").await;
    let body = serde_json::json!({ "id": car.id, "wins": 1, "time": 10.0 });
    let response = app
        .clone()
        .oneshot(json_request(Method::POST, "/winners", body.clone()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(json_request(Method::POST, "/winners", body))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn race_results_accumulate_and_sort() {
    let app = test_app(0.0).await;
    for index in 1..=6 {
        create(&app, &format!("Car {index}"), "#123456").await;
    }
    for (id, time) in [(5, 10.0), (5, 8.0), (5, 12.0), (6, 3.0)] {
        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                &format!("/winners/{id}/results"),
                serde_json::json!({ "time": time }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(empty_request(Method::GET, "/winners/5"))
        .await
        .expect("response");
    let winner: Winner = read_json(response).await;
    assert_eq!(winner.wins, 3);
    assert_eq!(winner.time, 8.0);

    let response = app
        .oneshot(empty_request(
            Method::GET,
            "/winners?_page=1&_limit=10&_sort=wins&_order=DESC",
        ))
        .await
        .expect("response");
    assert_eq!(
        response
            .headers()
            .get("x-total-count")
            .and_then(|v| v.to_str().ok()),
        Some("2")
    );
    let winners: Vec<Winner> = read_json(response).await;
    assert_eq!(winners[0].id, CarId(5));
    assert_eq!(winners[1].id, CarId(6));
}

#[tokio::test]
async fn result_for_deleted_car_is_not_found() {
    let app = test_app(0.0).await;
    let car = create(&app, "Lada", "#00ff00").await;
    let response = app
        .clone()
        .oneshot(empty_request(Method::DELETE, &format!("/garage/{}", car.id)))
        .await
        .expect("response");
    assert!(response.status().is_success());

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/winners/{}/results", car.id),
            serde_json::json!({ "time": 3.21 }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(empty_request(Method::GET, "/winners"))
        .await
        .expect("response");
    let winners: Vec<Winner> = read_json(response).await;
    assert!(winners.is_empty());
}
