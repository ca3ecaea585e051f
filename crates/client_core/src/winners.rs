//! Winners page: a sorted, paginated table of winner records joined with
//! their cars.

use std::sync::Arc;

use futures::future::try_join_all;
use shared::{
    domain::{Car, CarId, SortBy, SortOrder, Winner},
    protocol::WinnersQuery,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    api::{RaceApi, RaceApiError},
    generation::{Generation, Ticket},
    pagination::{PageTransition, Pagination},
    store::{Store, StoreError, StoreState},
};

#[derive(Debug, Error)]
pub enum WinnersError {
    #[error(transparent)]
    Api(#[from] RaceApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Active sort column and direction. Both unset means backend order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortState {
    pub sort_by: Option<SortBy>,
    pub sort_order: Option<SortOrder>,
}

impl SortState {
    /// Header click on `column`: flips the order of the active column,
    /// otherwise makes `column` active in ascending order.
    pub fn toggle(self, column: SortBy) -> SortState {
        if self.sort_by == Some(column) {
            SortState {
                sort_by: Some(column),
                sort_order: Some(self.sort_order.map_or(SortOrder::Asc, SortOrder::flipped)),
            }
        } else {
            SortState {
                sort_by: Some(column),
                sort_order: Some(SortOrder::Asc),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinnersState {
    pub current_page: u32,
    pub sort_by: Option<SortBy>,
    pub sort_order: Option<SortOrder>,
}

impl Default for WinnersState {
    fn default() -> Self {
        Self {
            current_page: 1,
            sort_by: None,
            sort_order: None,
        }
    }
}

impl WinnersState {
    pub fn sort(&self) -> SortState {
        SortState {
            sort_by: self.sort_by,
            sort_order: self.sort_order,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinnersField {
    CurrentPage,
    SortBy,
    SortOrder,
}

#[derive(Debug, Clone, Copy)]
pub enum WinnersUpdate {
    CurrentPage(u32),
    SortBy(Option<SortBy>),
    SortOrder(Option<SortOrder>),
}

impl StoreState for WinnersState {
    type Field = WinnersField;
    type Update = WinnersUpdate;

    fn apply(&mut self, update: WinnersUpdate) {
        match update {
            WinnersUpdate::CurrentPage(page) => self.current_page = page,
            WinnersUpdate::SortBy(sort_by) => self.sort_by = sort_by,
            WinnersUpdate::SortOrder(sort_order) => self.sort_order = sort_order,
        }
    }

    fn field_changed(&self, previous: &Self, field: WinnersField) -> bool {
        match field {
            WinnersField::CurrentPage => self.current_page != previous.current_page,
            WinnersField::SortBy => self.sort_by != previous.sort_by,
            WinnersField::SortOrder => self.sort_order != previous.sort_order,
        }
    }
}

/// One table row: rank within the page, car icon color, name, wins and best
/// time in seconds with two decimals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinnerRow {
    pub rank: usize,
    pub car_id: CarId,
    pub color: String,
    pub name: String,
    pub wins: u32,
    pub time: String,
}

pub fn format_time(seconds: f64) -> String {
    format!("{seconds:.2}")
}

pub struct WinnersFetch {
    api: Arc<dyn RaceApi>,
    ticket: Ticket,
    query: WinnersQuery,
}

pub struct FetchedWinners {
    ticket: Ticket,
    total: usize,
    rows: Vec<WinnerRow>,
}

impl WinnersFetch {
    /// Loads the winners page, then every winner's car concurrently.
    /// Winners whose car is gone are left out.
    pub async fn run(self) -> Result<FetchedWinners, RaceApiError> {
        let page = self.api.list_winners(self.query).await?;
        let api = self.api.as_ref();
        let cars = try_join_all(page.items.iter().map(|winner| car_of(api, winner.id))).await?;
        let rows = page
            .items
            .iter()
            .zip(cars)
            .filter_map(|(winner, car)| car.map(|car| (winner, car)))
            .enumerate()
            .map(|(index, (winner, car))| row(index + 1, winner, car.color, car.name))
            .collect();
        Ok(FetchedWinners {
            ticket: self.ticket,
            total: page.total,
            rows,
        })
    }
}

async fn car_of(api: &dyn RaceApi, car_id: CarId) -> Result<Option<Car>, RaceApiError> {
    match api.get_car(car_id).await {
        Ok(car) => Ok(Some(car)),
        Err(RaceApiError::NotFound(_)) => {
            warn!(car_id = car_id.0, "winners: skipping record of a deleted car");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn row(rank: usize, winner: &Winner, color: String, name: String) -> WinnerRow {
    WinnerRow {
        rank,
        car_id: winner.id,
        color,
        name,
        wins: winner.wins,
        time: format_time(winner.time),
    }
}

pub struct WinnersPage {
    api: Arc<dyn RaceApi>,
    pagination: Pagination,
    generation: Generation,
    rows: Vec<WinnerRow>,
    sort: SortState,
}

impl WinnersPage {
    pub fn new(api: Arc<dyn RaceApi>, items_on_page: u32) -> Self {
        Self {
            api,
            pagination: Pagination::new("Winners", items_on_page),
            generation: Generation::default(),
            rows: Vec::new(),
            sort: SortState::default(),
        }
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub fn pagination_mut(&mut self) -> &mut Pagination {
        &mut self.pagination
    }

    pub fn rows(&self) -> &[WinnerRow] {
        &self.rows
    }

    /// Sort shown in the table header for the rows currently rendered.
    pub fn sort(&self) -> SortState {
        self.sort
    }

    pub fn begin_render(&mut self, state: &WinnersState) -> WinnersFetch {
        self.sort = state.sort();
        WinnersFetch {
            api: Arc::clone(&self.api),
            ticket: self.generation.advance(),
            query: WinnersQuery {
                page: Some(state.current_page),
                limit: Some(self.pagination.items_on_page()),
                sort: state.sort_by,
                order: state.sort_order,
            },
        }
    }

    /// Returns `false` for a stale fetch.
    pub fn apply_render(&mut self, fetched: FetchedWinners) -> bool {
        if !self.generation.is_current(fetched.ticket) {
            debug!(ticket = ?fetched.ticket, "winners: dropping stale page");
            return false;
        }
        self.pagination.update_total_items(fetched.total);
        self.rows = fetched.rows;
        info!(
            rows = self.rows.len(),
            total = fetched.total,
            page = self.pagination.current_page(),
            "winners: rendered"
        );
        true
    }

    pub async fn render(&mut self, store: &Store<WinnersState>) -> Result<bool, WinnersError> {
        let fetched = self.begin_render(store.values()).run().await?;
        Ok(self.apply_render(fetched))
    }

    /// Applies a header click on `column` to the store.
    pub fn sort_by(
        &self,
        store: &mut Store<WinnersState>,
        column: SortBy,
    ) -> Result<SortState, WinnersError> {
        let next = store.values().sort().toggle(column);
        store.update([
            WinnersUpdate::SortBy(next.sort_by),
            WinnersUpdate::SortOrder(next.sort_order),
        ])?;
        Ok(next)
    }

    pub fn next_page(&mut self) -> Option<PageTransition> {
        self.pagination.next()
    }

    pub fn prev_page(&mut self) -> Option<PageTransition> {
        self.pagination.prev()
    }
}

#[cfg(test)]
#[path = "tests/winners_tests.rs"]
mod tests;
