//! Garage page: one page of cars as race tracks, car CRUD and races.

use std::{sync::Arc, time::Duration};

use futures::{
    future::{try_join_all, BoxFuture},
    stream::FuturesUnordered,
    FutureExt, StreamExt,
};
use rand::Rng;
use shared::{
    domain::{Car, CarId},
    protocol::{CarRequest, PageQuery, Paged},
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    api::{RaceApi, RaceApiError},
    generation::{Generation, Ticket},
    pagination::{PageTransition, Pagination},
    store::{Store, StoreError, StoreState},
    track::{DriveResult, Track, TrackSnapshot},
};

pub const GENERATED_CARS: usize = 100;

type LaneFuture = BoxFuture<'static, LaneOutcome>;

const BRANDS: &[&str] = &[
    "Tesla", "BMW", "Mercedes", "Audi", "Toyota", "Honda", "Ford", "Chevrolet", "Nissan", "Porsche",
    "Lada", "Volvo", "Mazda", "Kia", "Ferrari",
];
const MODELS: &[&str] = &[
    "Model S", "X5", "C-Class", "A4", "Corolla", "Civic", "Mustang", "Camaro", "GT-R", "911",
    "Niva", "XC90", "MX-5", "Rio", "Roma",
];

#[derive(Debug, Error)]
pub enum GarageError {
    #[error("no car is selected")]
    NoCarSelected,
    #[error("car {0} is not on the current garage page")]
    NotOnPage(CarId),
    #[error(transparent)]
    Api(#[from] RaceApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Cached garage page shared with the store subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct GarageState {
    pub cars: Arc<Vec<Car>>,
    pub total_cars: usize,
    pub selected_car: Option<Car>,
    pub current_page: u32,
}

impl Default for GarageState {
    fn default() -> Self {
        Self {
            cars: Arc::new(Vec::new()),
            total_cars: 0,
            selected_car: None,
            current_page: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GarageField {
    Cars,
    TotalCars,
    SelectedCar,
    CurrentPage,
}

#[derive(Debug, Clone)]
pub enum GarageUpdate {
    Cars(Vec<Car>),
    TotalCars(usize),
    SelectedCar(Option<Car>),
    CurrentPage(u32),
}

impl StoreState for GarageState {
    type Field = GarageField;
    type Update = GarageUpdate;

    fn apply(&mut self, update: GarageUpdate) {
        match update {
            GarageUpdate::Cars(cars) => self.cars = Arc::new(cars),
            GarageUpdate::TotalCars(total) => self.total_cars = total,
            GarageUpdate::SelectedCar(car) => self.selected_car = car,
            GarageUpdate::CurrentPage(page) => self.current_page = page,
        }
    }

    fn field_changed(&self, previous: &Self, field: GarageField) -> bool {
        match field {
            GarageField::Cars => self.cars != previous.cars,
            GarageField::TotalCars => self.total_cars != previous.total_cars,
            GarageField::SelectedCar => self.selected_car != previous.selected_car,
            GarageField::CurrentPage => self.current_page != previous.current_page,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RaceWinner {
    pub car: Car,
    pub time: Duration,
}

impl RaceWinner {
    /// Race time in seconds, as stored in the winner record.
    pub fn seconds(&self) -> f64 {
        self.time.as_secs_f64()
    }
}

/// Global race controls and the outcome of the latest race.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RaceBoard {
    pub race_id: u64,
    pub running: bool,
    pub winner: Option<RaceWinner>,
    pub race_enabled: bool,
    pub reset_enabled: bool,
}

/// Name/color inputs bound to the selected car.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateForm {
    pub car_id: Option<CarId>,
    pub name: String,
    pub color: String,
    pub enabled: bool,
}

/// A page fetch started by [`GaragePage::begin_refresh`].
pub struct GarageFetch {
    api: Arc<dyn RaceApi>,
    ticket: Ticket,
    query: PageQuery,
}

pub struct FetchedGarage {
    ticket: Ticket,
    page: Paged<Car>,
}

impl GarageFetch {
    pub async fn run(self) -> Result<FetchedGarage, RaceApiError> {
        let page = self.api.list_cars(self.query).await?;
        Ok(FetchedGarage {
            ticket: self.ticket,
            page,
        })
    }
}

/// One car's drive, detached from the page so the page stays usable while
/// the car moves.
pub struct LaneRun {
    api: Arc<dyn RaceApi>,
    track: Track,
}

impl LaneRun {
    pub fn car_id(&self) -> CarId {
        self.track.car_id()
    }

    pub async fn run(self) -> Result<DriveResult, RaceApiError> {
        let result = self.track.start(self.api.as_ref()).await?;
        if let DriveResult::Arrived { .. } = result {
            self.track.complete().await;
        }
        Ok(result)
    }
}

/// How one lane of a race ended.
pub struct LaneOutcome {
    pub race_id: u64,
    pub track: Track,
    pub result: Result<DriveResult, RaceApiError>,
}

/// Drives of a started race. Arrivals are handed back to the page one at a
/// time through [`GaragePage::lane_finished`].
pub struct RaceRun {
    race_id: u64,
    tracks: Vec<Track>,
    lanes: FuturesUnordered<LaneFuture>,
}

impl RaceRun {
    pub fn race_id(&self) -> u64 {
        self.race_id
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Waits for the next car to leave its drive. `None` once every lane
    /// is done.
    pub async fn next_arrival(&mut self) -> Option<LaneOutcome> {
        self.lanes.next().await
    }
}

pub struct GaragePage {
    api: Arc<dyn RaceApi>,
    pagination: Pagination,
    generation: Generation,
    tracks: Vec<Track>,
    race: RaceBoard,
    form: UpdateForm,
}

impl GaragePage {
    pub fn new(api: Arc<dyn RaceApi>, items_on_page: u32) -> Self {
        Self {
            api,
            pagination: Pagination::new("Garage", items_on_page),
            generation: Generation::default(),
            tracks: Vec::new(),
            race: RaceBoard::default(),
            form: UpdateForm::default(),
        }
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub fn pagination_mut(&mut self) -> &mut Pagination {
        &mut self.pagination
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub async fn track_snapshots(&self) -> Vec<TrackSnapshot> {
        let mut snapshots = Vec::with_capacity(self.tracks.len());
        for track in &self.tracks {
            snapshots.push(track.snapshot().await);
        }
        snapshots
    }

    pub fn race_board(&self) -> &RaceBoard {
        &self.race
    }

    pub fn update_form(&self) -> &UpdateForm {
        &self.form
    }

    /// Starts fetching the store's current page. Only the newest fetch is
    /// applied by [`GaragePage::apply_refresh`].
    pub fn begin_refresh(&mut self, store: &Store<GarageState>) -> GarageFetch {
        GarageFetch {
            api: Arc::clone(&self.api),
            ticket: self.generation.advance(),
            query: PageQuery::new(
                store.values().current_page,
                self.pagination.items_on_page(),
            ),
        }
    }

    /// Publishes a fetched page to the store. Returns `false` for a stale
    /// fetch.
    pub fn apply_refresh(
        &mut self,
        fetched: FetchedGarage,
        store: &mut Store<GarageState>,
    ) -> Result<bool, GarageError> {
        if !self.generation.is_current(fetched.ticket) {
            debug!(ticket = ?fetched.ticket, "garage: dropping stale page");
            return Ok(false);
        }
        info!(
            page = store.values().current_page,
            cars = fetched.page.items.len(),
            total = fetched.page.total,
            "garage: page refreshed"
        );
        store.update([
            GarageUpdate::Cars(fetched.page.items),
            GarageUpdate::TotalCars(fetched.page.total),
        ])?;
        Ok(true)
    }

    pub async fn refresh(&mut self, store: &mut Store<GarageState>) -> Result<(), GarageError> {
        let fetched = self.begin_refresh(store).run().await?;
        self.apply_refresh(fetched, store)?;
        Ok(())
    }

    /// Rebuilds the tracks from the cached cars. Lanes of cars still on the
    /// page are kept with their race state.
    pub async fn render(&mut self, state: &GarageState) {
        let mut tracks = Vec::with_capacity(state.cars.len());
        for car in state.cars.iter() {
            match self.tracks.iter().find(|track| track.car_id() == car.id) {
                Some(track) => {
                    track.set_car(car.clone()).await;
                    tracks.push(track.clone());
                }
                None => tracks.push(Track::new(car.clone())),
            }
        }
        self.tracks = tracks;
        if !self.race.running {
            self.race.race_enabled = !self.tracks.is_empty();
        }
        debug!(tracks = self.tracks.len(), "garage: rendered");
    }

    pub fn sync_total(&mut self, total_cars: usize) {
        self.pagination.update_total_items(total_cars);
    }

    pub fn fill_update_form(&mut self, selected: Option<&Car>) {
        self.form = match selected {
            Some(car) => UpdateForm {
                car_id: Some(car.id),
                name: car.name.clone(),
                color: car.color.clone(),
                enabled: true,
            },
            None => UpdateForm::default(),
        };
    }

    pub async fn create_car(
        &mut self,
        store: &mut Store<GarageState>,
        name: &str,
        color: &str,
    ) -> Result<Car, GarageError> {
        let car = self
            .api
            .create_car(&CarRequest {
                name: name.to_string(),
                color: color.to_string(),
            })
            .await?;
        info!(car_id = car.id.0, name = %car.name, "garage: car created");
        self.refresh(store).await?;
        Ok(car)
    }

    pub fn select_car(
        &self,
        store: &mut Store<GarageState>,
        car_id: CarId,
    ) -> Result<Car, GarageError> {
        let car = store
            .values()
            .cars
            .iter()
            .find(|car| car.id == car_id)
            .cloned()
            .ok_or(GarageError::NotOnPage(car_id))?;
        store.update([GarageUpdate::SelectedCar(Some(car.clone()))])?;
        Ok(car)
    }

    /// Saves the selected car, then patches the fresh record into the
    /// cached page, its track and the selection without refetching the page.
    pub async fn update_selected_car(
        &mut self,
        store: &mut Store<GarageState>,
        name: &str,
        color: &str,
    ) -> Result<Car, GarageError> {
        let selected = store
            .values()
            .selected_car
            .clone()
            .ok_or(GarageError::NoCarSelected)?;
        self.api
            .update_car(
                selected.id,
                &CarRequest {
                    name: name.to_string(),
                    color: color.to_string(),
                },
            )
            .await?;
        let car = self.api.get_car(selected.id).await?;

        let cars: Vec<Car> = store
            .values()
            .cars
            .iter()
            .map(|cached| {
                if cached.id == car.id {
                    car.clone()
                } else {
                    cached.clone()
                }
            })
            .collect();
        if let Some(track) = self.tracks.iter().find(|track| track.car_id() == car.id) {
            track.set_car(car.clone()).await;
        }
        store.update([
            GarageUpdate::Cars(cars),
            GarageUpdate::SelectedCar(Some(car.clone())),
        ])?;
        info!(car_id = car.id.0, name = %car.name, "garage: car updated");
        Ok(car)
    }

    /// Deletes the car and its winner record, if it has one.
    pub async fn delete_car(
        &mut self,
        store: &mut Store<GarageState>,
        car_id: CarId,
    ) -> Result<(), GarageError> {
        self.api.delete_car(car_id).await?;
        match self.api.delete_winner(car_id).await {
            Ok(()) | Err(RaceApiError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        info!(car_id = car_id.0, "garage: car deleted");

        let selected = store.values().selected_car.as_ref().map(|car| car.id);
        if selected == Some(car_id) {
            store.update([GarageUpdate::SelectedCar(None)])?;
        }
        self.refresh(store).await
    }

    /// Creates `count` cars with random names and colors.
    pub async fn generate_cars(
        &mut self,
        store: &mut Store<GarageState>,
        count: usize,
    ) -> Result<usize, GarageError> {
        let requests = random_cars(count);
        let api = Arc::clone(&self.api);
        let created = try_join_all(requests.iter().map(|request| api.create_car(request))).await?;
        info!(count = created.len(), "garage: cars generated");
        self.refresh(store).await?;
        Ok(created.len())
    }

    /// Starts one car outside of a race.
    pub async fn start_engine(&mut self, car_id: CarId) -> Result<DriveResult, GarageError> {
        Ok(self.begin_engine(car_id)?.run().await?)
    }

    /// Prepares a single drive that can run without holding the page.
    pub fn begin_engine(&self, car_id: CarId) -> Result<LaneRun, GarageError> {
        Ok(LaneRun {
            api: Arc::clone(&self.api),
            track: self.track(car_id)?.clone(),
        })
    }

    pub async fn stop_engine(&mut self, car_id: CarId) -> Result<(), GarageError> {
        let track = self.track(car_id)?.clone();
        track.stop(self.api.as_ref()).await?;
        Ok(())
    }

    /// Starts every track on the page at once. The first car to arrive wins
    /// and its result is recorded; later arrivals are ignored.
    pub async fn race(&mut self) -> Result<Option<RaceWinner>, GarageError> {
        let Some(mut run) = self.begin_race() else {
            return Ok(None);
        };
        let mut failure = None;
        while let Some(outcome) = run.next_arrival().await {
            if let Err(err) = self.lane_finished(outcome).await {
                failure.get_or_insert(err);
            }
        }
        let winner = self.finish_race(run);
        match failure {
            Some(err) => Err(err),
            None => Ok(winner),
        }
    }

    /// Marks a race as running and starts every lane. Returns `None` when a
    /// race can't start now.
    pub fn begin_race(&mut self) -> Option<RaceRun> {
        if self.race.running || !self.race.race_enabled || self.tracks.is_empty() {
            debug!(
                running = self.race.running,
                enabled = self.race.race_enabled,
                "race: not started"
            );
            return None;
        }

        self.race.race_id += 1;
        let race_id = self.race.race_id;
        self.race.running = true;
        self.race.winner = None;
        self.race.race_enabled = false;
        self.race.reset_enabled = false;
        info!(race_id, cars = self.tracks.len(), "race: started");

        let lanes = self
            .tracks
            .iter()
            .map(|track| {
                let api = Arc::clone(&self.api);
                let track = track.clone();
                async move {
                    let result = track.start(api.as_ref()).await;
                    LaneOutcome {
                        race_id,
                        track,
                        result,
                    }
                }
                .boxed()
            })
            .collect();
        Some(RaceRun {
            race_id,
            tracks: self.tracks.clone(),
            lanes,
        })
    }

    /// Applies one lane's outcome. Returns the winner when this arrival won
    /// the race.
    pub async fn lane_finished(
        &mut self,
        outcome: LaneOutcome,
    ) -> Result<Option<RaceWinner>, GarageError> {
        let LaneOutcome {
            race_id,
            track,
            result,
        } = outcome;
        match result {
            Ok(DriveResult::Arrived { .. }) => {
                let Some(time) = track.complete().await else {
                    return Ok(None);
                };
                if self.motion_finished(race_id, &track, time).await? {
                    Ok(self.race.winner.clone())
                } else {
                    Ok(None)
                }
            }
            Ok(other) => {
                debug!(race_id, car_id = track.car_id().0, result = ?other, "race: car out");
                Ok(None)
            }
            Err(err) => {
                error!(race_id, car_id = track.car_id().0, error = %err, "race: car failed");
                Err(err.into())
            }
        }
    }

    /// Closes the race once its lanes are drained. A race already cleared by
    /// a reset leaves the board alone.
    pub fn finish_race(&mut self, run: RaceRun) -> Option<RaceWinner> {
        if run.race_id != self.race.race_id || !self.race.running {
            debug!(race_id = run.race_id, "race: finished after reset");
            return None;
        }
        self.race.running = false;
        self.race.reset_enabled = true;
        if self.race.winner.is_none() {
            warn!(race_id = run.race_id, "race: no car finished");
        }
        self.race.winner.clone()
    }

    /// Handles the end of a car's motion. Only the first arrival of the
    /// current race is a winner.
    pub async fn motion_finished(
        &mut self,
        race_id: u64,
        track: &Track,
        time: Duration,
    ) -> Result<bool, GarageError> {
        if race_id != self.race.race_id || !self.race.running || self.race.winner.is_some() {
            return Ok(false);
        }
        let car = track.snapshot().await.car;
        let winner = RaceWinner { car, time };
        info!(
            race_id,
            car_id = winner.car.id.0,
            name = %winner.car.name,
            seconds = winner.seconds(),
            "race: winner"
        );
        self.race.winner = Some(winner.clone());
        self.race.reset_enabled = true;
        self.api
            .record_result(winner.car.id, round_seconds(winner.seconds()))
            .await?;
        Ok(true)
    }

    /// Stops every track, puts the cars back at the start and refreshes
    /// the page.
    pub async fn reset(&mut self, store: &mut Store<GarageState>) -> Result<(), GarageError> {
        self.race.reset_enabled = false;
        let api = Arc::clone(&self.api);
        try_join_all(self.tracks.iter().map(|track| track.stop(api.as_ref()))).await?;
        for track in &self.tracks {
            track.rewind().await;
        }
        self.race.winner = None;
        self.race.running = false;
        info!(race_id = self.race.race_id, "race: reset");
        self.refresh(store).await?;
        self.race.race_enabled = !self.tracks.is_empty();
        Ok(())
    }

    pub fn next_page(&mut self) -> Option<PageTransition> {
        self.pagination.next()
    }

    pub fn prev_page(&mut self) -> Option<PageTransition> {
        self.pagination.prev()
    }

    fn track(&self, car_id: CarId) -> Result<&Track, GarageError> {
        self.tracks
            .iter()
            .find(|track| track.car_id() == car_id)
            .ok_or(GarageError::NotOnPage(car_id))
    }
}

fn round_seconds(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}

/// Random `Brand Model` names with `#rrggbb` colors.
pub fn random_cars(count: usize) -> Vec<CarRequest> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| {
            let brand = BRANDS[rng.random_range(0..BRANDS.len())];
            let model = MODELS[rng.random_range(0..MODELS.len())];
            CarRequest {
                name: format!("{brand} {model}"),
                color: format!("#{:06x}", rng.random_range(0..=0xff_ffff_u32)),
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/garage_tests.rs"]
mod tests;
