//! App router and the effect loop.
//!
//! Store subscribers never do work themselves: each one queues an [`Effect`]
//! and [`App::settle`] runs the queued effects against the page view-models
//! until nothing new is queued. Every public operation ends with a settle, so
//! callers always observe a consistent app.

use std::sync::Arc;

use shared::domain::{Car, CarId, SortBy};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use crate::{
    api::{HttpRaceApi, RaceApi},
    config::ClientSettings,
    error::ClientError,
    garage::{
        GarageField, GaragePage, GarageState, GarageUpdate, LaneOutcome, LaneRun, RaceRun,
        RaceWinner,
    },
    pagination::PageTransition,
    store::{Deferred, Store, StoreState, SubscriptionId},
    track::DriveResult,
    winners::{SortState, WinnersField, WinnersPage, WinnersState, WinnersUpdate},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AppPage {
    #[default]
    Garage,
    Winners,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    pub page: AppPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppField {
    Page,
}

#[derive(Debug, Clone, Copy)]
pub enum AppUpdate {
    Page(AppPage),
}

impl StoreState for AppState {
    type Field = AppField;
    type Update = AppUpdate;

    fn apply(&mut self, update: AppUpdate) {
        match update {
            AppUpdate::Page(page) => self.page = page,
        }
    }

    fn field_changed(&self, previous: &Self, field: AppField) -> bool {
        match field {
            AppField::Page => self.page != previous.page,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    Mount(AppPage),
    RefreshGarage,
    RenderGarage,
    SyncGarageTotal,
    FillUpdateForm,
    GaragePageRequested(u32),
    RenderWinners,
    WinnersPageRequested(u32),
}

#[derive(Default)]
struct Subscriptions {
    app: Vec<SubscriptionId>,
    garage: Vec<SubscriptionId>,
    winners: Vec<SubscriptionId>,
}

pub struct App {
    app_store: Store<AppState>,
    garage_store: Store<GarageState>,
    winners_store: Store<WinnersState>,
    garage: GaragePage,
    winners: WinnersPage,
    mounted: Option<AppPage>,
    effects_tx: UnboundedSender<Effect>,
    effects_rx: UnboundedReceiver<Effect>,
    subscriptions: Subscriptions,
}

impl App {
    pub fn new(api: Arc<dyn RaceApi>, settings: &ClientSettings) -> Self {
        let (effects_tx, effects_rx) = mpsc::unbounded_channel();

        let mut garage = GaragePage::new(Arc::clone(&api), settings.garage_page_size);
        garage
            .pagination_mut()
            .on_prev(page_requested(&effects_tx, Effect::GaragePageRequested));
        garage
            .pagination_mut()
            .on_next(page_requested(&effects_tx, Effect::GaragePageRequested));

        let mut winners = WinnersPage::new(api, settings.winners_page_size);
        winners
            .pagination_mut()
            .on_prev(page_requested(&effects_tx, Effect::WinnersPageRequested));
        winners
            .pagination_mut()
            .on_next(page_requested(&effects_tx, Effect::WinnersPageRequested));

        let mut app = Self {
            app_store: Store::new(AppState::default()),
            garage_store: Store::new(GarageState::default()),
            winners_store: Store::new(WinnersState::default()),
            garage,
            winners,
            mounted: None,
            effects_tx,
            effects_rx,
            subscriptions: Subscriptions::default(),
        };
        app.subscribe_all();
        app
    }

    /// App talking to the backend at `settings.server_url`.
    pub fn connect(settings: &ClientSettings) -> Self {
        let api = HttpRaceApi::new(settings.server_url.clone());
        Self::new(Arc::new(api), settings)
    }

    fn subscribe_all(&mut self) {
        let tx = self.effects_tx.clone();
        let mount = self.app_store.subscribe(
            AppField::Page,
            move |state: &AppState, _: &mut Deferred<AppState>| {
                let _ = tx.send(Effect::Mount(state.page));
            },
        );
        self.subscriptions.app.push(mount);

        let garage = [
            (GarageField::Cars, Effect::RenderGarage),
            (GarageField::TotalCars, Effect::SyncGarageTotal),
            (GarageField::SelectedCar, Effect::FillUpdateForm),
            (GarageField::CurrentPage, Effect::RefreshGarage),
        ];
        for (field, effect) in garage {
            let callback = notify::<GarageState>(&self.effects_tx, effect);
            let id = self.garage_store.subscribe(field, callback);
            self.subscriptions.garage.push(id);
        }
        // A selection only lives as long as its car is on the page.
        let prune = self.garage_store.subscribe(
            GarageField::Cars,
            |state: &GarageState, deferred: &mut Deferred<GarageState>| {
                let Some(selected) = &state.selected_car else {
                    return;
                };
                if !state.cars.iter().any(|car| car.id == selected.id) {
                    deferred.update([GarageUpdate::SelectedCar(None)]);
                }
            },
        );
        self.subscriptions.garage.push(prune);

        for field in [
            WinnersField::CurrentPage,
            WinnersField::SortBy,
            WinnersField::SortOrder,
        ] {
            let render = notify::<WinnersState>(&self.effects_tx, Effect::RenderWinners);
            let id = self.winners_store.subscribe(field, render);
            self.subscriptions.winners.push(id);
        }
    }

    /// Drops every store subscription. Returns how many were removed.
    pub fn teardown(&mut self) -> usize {
        let mut removed = 0;
        for id in self.subscriptions.app.drain(..) {
            removed += usize::from(self.app_store.unsubscribe(id));
        }
        for id in self.subscriptions.garage.drain(..) {
            removed += usize::from(self.garage_store.unsubscribe(id));
        }
        for id in self.subscriptions.winners.drain(..) {
            removed += usize::from(self.winners_store.unsubscribe(id));
        }
        debug!(removed, "app: subscriptions dropped");
        removed
    }

    /// Mounts the current page.
    pub async fn start(&mut self) -> Result<(), ClientError> {
        let _ = self.effects_tx.send(Effect::Mount(self.app_store.values().page));
        self.settle().await
    }

    pub async fn navigate(&mut self, page: AppPage) -> Result<(), ClientError> {
        self.app_store.update([AppUpdate::Page(page)])?;
        self.settle().await
    }

    /// Runs queued effects until none are left. Duplicate effects queued in
    /// the same round run once.
    pub async fn settle(&mut self) -> Result<(), ClientError> {
        loop {
            let mut batch: Vec<Effect> = Vec::new();
            while let Ok(effect) = self.effects_rx.try_recv() {
                if !batch.contains(&effect) {
                    batch.push(effect);
                }
            }
            if batch.is_empty() {
                return Ok(());
            }
            for effect in batch {
                self.run_effect(effect).await?;
            }
        }
    }

    async fn run_effect(&mut self, effect: Effect) -> Result<(), ClientError> {
        debug!(?effect, "app: running effect");
        match effect {
            Effect::Mount(page) => {
                self.mounted = Some(page);
                info!(?page, "app: page mounted");
                match page {
                    AppPage::Garage => self.garage.refresh(&mut self.garage_store).await?,
                    AppPage::Winners => {
                        self.winners.render(&self.winners_store).await?;
                    }
                }
            }
            Effect::RefreshGarage => self.garage.refresh(&mut self.garage_store).await?,
            Effect::RenderGarage => self.garage.render(self.garage_store.values()).await,
            Effect::SyncGarageTotal => self
                .garage
                .sync_total(self.garage_store.values().total_cars),
            Effect::FillUpdateForm => self
                .garage
                .fill_update_form(self.garage_store.values().selected_car.as_ref()),
            Effect::GaragePageRequested(page) => {
                self.garage_store
                    .update([GarageUpdate::CurrentPage(page)])?;
            }
            Effect::RenderWinners => {
                if self.mounted == Some(AppPage::Winners) {
                    self.winners.render(&self.winners_store).await?;
                }
            }
            Effect::WinnersPageRequested(page) => {
                self.winners_store
                    .update([WinnersUpdate::CurrentPage(page)])?;
            }
        }
        Ok(())
    }

    pub fn page(&self) -> AppPage {
        self.app_store.values().page
    }

    pub fn mounted(&self) -> Option<AppPage> {
        self.mounted
    }

    pub fn garage(&self) -> &GaragePage {
        &self.garage
    }

    pub fn winners(&self) -> &WinnersPage {
        &self.winners
    }

    pub fn garage_state(&self) -> &GarageState {
        self.garage_store.values()
    }

    pub fn winners_state(&self) -> &WinnersState {
        self.winners_store.values()
    }

    pub async fn create_car(&mut self, name: &str, color: &str) -> Result<Car, ClientError> {
        let car = self
            .garage
            .create_car(&mut self.garage_store, name, color)
            .await?;
        self.settle().await?;
        Ok(car)
    }

    pub async fn select_car(&mut self, car_id: CarId) -> Result<Car, ClientError> {
        let car = self.garage.select_car(&mut self.garage_store, car_id)?;
        self.settle().await?;
        Ok(car)
    }

    pub async fn update_selected_car(
        &mut self,
        name: &str,
        color: &str,
    ) -> Result<Car, ClientError> {
        let car = self
            .garage
            .update_selected_car(&mut self.garage_store, name, color)
            .await?;
        self.settle().await?;
        Ok(car)
    }

    pub async fn delete_car(&mut self, car_id: CarId) -> Result<(), ClientError> {
        self.garage
            .delete_car(&mut self.garage_store, car_id)
            .await?;
        self.settle().await
    }

    pub async fn generate_cars(&mut self, count: usize) -> Result<usize, ClientError> {
        let created = self
            .garage
            .generate_cars(&mut self.garage_store, count)
            .await?;
        self.settle().await?;
        Ok(created)
    }

    pub async fn start_engine(&mut self, car_id: CarId) -> Result<DriveResult, ClientError> {
        Ok(self.garage.start_engine(car_id).await?)
    }

    pub async fn stop_engine(&mut self, car_id: CarId) -> Result<(), ClientError> {
        Ok(self.garage.stop_engine(car_id).await?)
    }

    /// A single drive that runs without borrowing the app, so a stop or a
    /// reset can land while the car is moving.
    pub fn begin_engine(&self, car_id: CarId) -> Result<LaneRun, ClientError> {
        Ok(self.garage.begin_engine(car_id)?)
    }

    pub async fn race(&mut self) -> Result<Option<RaceWinner>, ClientError> {
        let winner = self.garage.race().await;
        self.settle().await?;
        Ok(winner?)
    }

    /// Starts a race and hands back its lanes. Feed each arrival to
    /// [`App::lane_finished`] and the drained run to [`App::finish_race`];
    /// the app stays usable in between.
    pub fn begin_race(&mut self) -> Option<RaceRun> {
        self.garage.begin_race()
    }

    pub async fn lane_finished(
        &mut self,
        outcome: LaneOutcome,
    ) -> Result<Option<RaceWinner>, ClientError> {
        let winner = self.garage.lane_finished(outcome).await;
        self.settle().await?;
        Ok(winner?)
    }

    pub async fn finish_race(&mut self, run: RaceRun) -> Result<Option<RaceWinner>, ClientError> {
        let winner = self.garage.finish_race(run);
        self.settle().await?;
        Ok(winner)
    }

    pub async fn reset(&mut self) -> Result<(), ClientError> {
        self.garage.reset(&mut self.garage_store).await?;
        self.settle().await
    }

    pub async fn next_garage_page(&mut self) -> Result<Option<PageTransition>, ClientError> {
        let transition = self.garage.next_page();
        self.settle().await?;
        Ok(transition)
    }

    pub async fn prev_garage_page(&mut self) -> Result<Option<PageTransition>, ClientError> {
        let transition = self.garage.prev_page();
        self.settle().await?;
        Ok(transition)
    }

    pub async fn sort_winners(&mut self, column: SortBy) -> Result<SortState, ClientError> {
        let sort = self.winners.sort_by(&mut self.winners_store, column)?;
        self.settle().await?;
        Ok(sort)
    }

    pub async fn next_winners_page(&mut self) -> Result<Option<PageTransition>, ClientError> {
        let transition = self.winners.next_page();
        self.settle().await?;
        Ok(transition)
    }

    pub async fn prev_winners_page(&mut self) -> Result<Option<PageTransition>, ClientError> {
        let transition = self.winners.prev_page();
        self.settle().await?;
        Ok(transition)
    }
}

fn notify<S: StoreState>(
    tx: &UnboundedSender<Effect>,
    effect: Effect,
) -> impl FnMut(&S, &mut Deferred<S>) + Send + 'static {
    let tx = tx.clone();
    move |_: &S, _: &mut Deferred<S>| {
        let _ = tx.send(effect);
    }
}

fn page_requested(
    tx: &UnboundedSender<Effect>,
    effect: fn(u32) -> Effect,
) -> impl FnMut(u32) + Send + 'static {
    let tx = tx.clone();
    move |page| {
        let _ = tx.send(effect(page));
    }
}

#[cfg(test)]
#[path = "tests/app_tests.rs"]
mod tests;
