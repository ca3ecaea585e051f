use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use server::config::Settings;
use server_api::engine::EngineSettings;
use shared::{
    domain::{Car, CarId, Engine, SortBy, SortOrder, Winner},
    protocol::{CarRequest, DriveResponse, PageQuery, Paged, WinnersQuery},
};
use url::Url;

use crate::api::{RaceApi, RaceApiError};

/// Scripted answer for the next drive request of one car.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveScript {
    Success,
    Failure,
    AlreadyDriving,
    NotStarted,
    Broken,
}

#[derive(Default)]
struct FakeState {
    cars: BTreeMap<CarId, Car>,
    next_id: i64,
    winners: BTreeMap<CarId, Winner>,
    engines: HashMap<CarId, Engine>,
    velocities: HashMap<CarId, f64>,
    drive_scripts: HashMap<CarId, VecDeque<DriveScript>>,
    failing_stops: bool,
    calls: Vec<String>,
}

/// In-memory backend. Drives sleep for the engine's travel time, so tests
/// that race cars run on a paused clock.
pub struct FakeRaceApi {
    distance: f64,
    state: Mutex<FakeState>,
}

impl FakeRaceApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            distance: 500_000.0,
            state: Mutex::new(FakeState::default()),
        })
    }

    pub fn with_cars(names: &[&str]) -> Arc<Self> {
        let api = Self::new();
        for name in names {
            api.insert_car(name, "#336699");
        }
        api
    }

    pub fn insert_car(&self, name: &str, color: &str) -> Car {
        let mut state = self.state.lock().expect("fake state");
        state.next_id += 1;
        let car = Car {
            id: CarId(state.next_id),
            name: name.to_string(),
            color: color.to_string(),
        };
        state.cars.insert(car.id, car.clone());
        car
    }

    pub fn insert_winner(&self, winner: Winner) {
        self.state
            .lock()
            .expect("fake state")
            .winners
            .insert(winner.id, winner);
    }

    pub fn set_velocity(&self, car_id: CarId, velocity: f64) {
        self.state
            .lock()
            .expect("fake state")
            .velocities
            .insert(car_id, velocity);
    }

    pub fn script_drive(&self, car_id: CarId, script: &[DriveScript]) {
        self.state
            .lock()
            .expect("fake state")
            .drive_scripts
            .entry(car_id)
            .or_default()
            .extend(script.iter().copied());
    }

    /// Makes every following `stop_engine` answer with a 503.
    pub fn fail_stops(&self) {
        self.state.lock().expect("fake state").failing_stops = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().expect("fake state").calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().expect("fake state").calls.clear();
    }

    pub fn winner(&self, car_id: CarId) -> Option<Winner> {
        self.state
            .lock()
            .expect("fake state")
            .winners
            .get(&car_id)
            .copied()
    }

    pub fn car(&self, car_id: CarId) -> Option<Car> {
        self.state
            .lock()
            .expect("fake state")
            .cars
            .get(&car_id)
            .cloned()
    }

    pub fn car_count(&self) -> usize {
        self.state.lock().expect("fake state").cars.len()
    }

    fn log(&self, call: String) {
        self.state.lock().expect("fake state").calls.push(call);
    }
}

fn window<T: Clone>(items: &[T], page: PageQuery) -> Vec<T> {
    match page.window() {
        Some((limit, offset)) => items
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect(),
        None => items.to_vec(),
    }
}

fn missing_car(car_id: CarId) -> RaceApiError {
    RaceApiError::NotFound(format!("car {car_id} not found"))
}

#[async_trait]
impl RaceApi for FakeRaceApi {
    async fn list_cars(&self, page: PageQuery) -> Result<Paged<Car>, RaceApiError> {
        let state = self.state.lock().expect("fake state");
        let cars: Vec<Car> = state.cars.values().cloned().collect();
        Ok(Paged::new(window(&cars, page), cars.len()))
    }

    async fn get_car(&self, car_id: CarId) -> Result<Car, RaceApiError> {
        self.car(car_id).ok_or_else(|| missing_car(car_id))
    }

    async fn create_car(&self, request: &CarRequest) -> Result<Car, RaceApiError> {
        self.log(format!("create {}", request.name));
        Ok(self.insert_car(&request.name, &request.color))
    }

    async fn update_car(&self, car_id: CarId, request: &CarRequest) -> Result<Car, RaceApiError> {
        self.log(format!("update {car_id}"));
        let mut state = self.state.lock().expect("fake state");
        let car = state.cars.get_mut(&car_id).ok_or_else(|| missing_car(car_id))?;
        car.name = request.name.clone();
        car.color = request.color.clone();
        Ok(car.clone())
    }

    async fn delete_car(&self, car_id: CarId) -> Result<(), RaceApiError> {
        self.log(format!("delete car {car_id}"));
        let mut state = self.state.lock().expect("fake state");
        state
            .cars
            .remove(&car_id)
            .map(|_| ())
            .ok_or_else(|| missing_car(car_id))
    }

    async fn start_engine(&self, car_id: CarId) -> Result<Engine, RaceApiError> {
        self.log(format!("start {car_id}"));
        let mut state = self.state.lock().expect("fake state");
        if !state.cars.contains_key(&car_id) {
            return Err(missing_car(car_id));
        }
        let velocity = state.velocities.get(&car_id).copied().unwrap_or(100.0);
        let engine = Engine {
            velocity,
            distance: self.distance,
        };
        state.engines.insert(car_id, engine);
        Ok(engine)
    }

    async fn stop_engine(&self, car_id: CarId) -> Result<Engine, RaceApiError> {
        self.log(format!("stop {car_id}"));
        let mut state = self.state.lock().expect("fake state");
        if state.failing_stops {
            return Err(RaceApiError::Status {
                status: 503,
                message: "engine service unavailable".into(),
            });
        }
        state.engines.remove(&car_id);
        Ok(Engine {
            velocity: 0.0,
            distance: self.distance,
        })
    }

    async fn drive(&self, car_id: CarId) -> Result<DriveResponse, RaceApiError> {
        self.log(format!("drive {car_id}"));
        let (script, engine) = {
            let mut state = self.state.lock().expect("fake state");
            let script = state
                .drive_scripts
                .get_mut(&car_id)
                .and_then(VecDeque::pop_front);
            (script, state.engines.get(&car_id).copied())
        };

        match script {
            Some(DriveScript::Failure) => return Ok(DriveResponse { success: false }),
            Some(DriveScript::AlreadyDriving) => return Err(RaceApiError::AlreadyDriving(car_id)),
            Some(DriveScript::NotStarted) => return Err(RaceApiError::NotStarted(car_id)),
            Some(DriveScript::Broken) => return Err(RaceApiError::EngineBroken(car_id)),
            Some(DriveScript::Success) | None => {}
        }

        let Some(engine) = engine else {
            return Err(RaceApiError::NotStarted(car_id));
        };
        if let Some(travel_time) = engine.travel_time() {
            tokio::time::sleep(travel_time).await;
        }
        Ok(DriveResponse { success: true })
    }

    async fn list_winners(&self, query: WinnersQuery) -> Result<Paged<Winner>, RaceApiError> {
        let state = self.state.lock().expect("fake state");
        let mut winners: Vec<Winner> = state.winners.values().copied().collect();
        let order = query.order.unwrap_or(SortOrder::Asc);
        winners.sort_by(|a, b| {
            let ordering = match query.sort.unwrap_or(SortBy::Id) {
                SortBy::Id => a.id.cmp(&b.id),
                SortBy::Wins => a.wins.cmp(&b.wins),
                SortBy::Time => a.time.total_cmp(&b.time),
            };
            let ordering = match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            };
            ordering.then(a.id.cmp(&b.id))
        });
        Ok(Paged::new(
            window(&winners, query.page_query()),
            winners.len(),
        ))
    }

    async fn delete_winner(&self, car_id: CarId) -> Result<(), RaceApiError> {
        self.log(format!("delete winner {car_id}"));
        let mut state = self.state.lock().expect("fake state");
        state
            .winners
            .remove(&car_id)
            .map(|_| ())
            .ok_or_else(|| RaceApiError::NotFound(format!("winner {car_id}")))
    }

    async fn record_result(&self, car_id: CarId, time: f64) -> Result<Winner, RaceApiError> {
        self.log(format!("record {car_id}"));
        let mut state = self.state.lock().expect("fake state");
        if !state.cars.contains_key(&car_id) {
            return Err(missing_car(car_id));
        }
        let winner = Winner::record_result(state.winners.get(&car_id).copied(), car_id, time);
        state.winners.insert(car_id, winner);
        Ok(winner)
    }
}

/// Serves the real backend on an ephemeral port and returns its base url.
pub async fn spawn_server(engine: EngineSettings) -> Url {
    let settings = Settings {
        database_url: "sqlite::memory:".to_string(),
        engine,
        ..Settings::default()
    };
    let state = server::build_state(&settings).await.expect("server state");
    let router = server::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    Url::parse(&format!("http://{addr}/")).expect("url")
}

pub fn instant_engines() -> EngineSettings {
    EngineSettings {
        breakdown_chance: 0.0,
        drive_time_scale: 0.0,
        ..EngineSettings::default()
    }
}
