use serde::{Deserialize, Serialize};

use crate::domain::{CarId, EngineStatus, SortBy, SortOrder};

/// Response header carrying the unpaged item count of a list endpoint.
pub const TOTAL_COUNT_HEADER: &str = "X-Total-Count";

pub fn garage_route() -> &'static str {
    "/garage"
}

pub fn engine_route() -> &'static str {
    "/engine"
}

pub fn winners_route() -> &'static str {
    "/winners"
}

/// Body of `POST /garage` and `PUT /garage/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarRequest {
    pub name: String,
    pub color: String,
}

/// `_page`/`_limit` query pair shared by the list endpoints. Both absent
/// means "everything".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageQuery {
    #[serde(rename = "_page", default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(rename = "_limit", default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }

    /// `(limit, offset)` for a SQL window, when a limit was requested.
    pub fn window(&self) -> Option<(u32, u32)> {
        let limit = self.limit?;
        let page = self.page.unwrap_or(1).max(1);
        Some((limit, (page - 1).saturating_mul(limit)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnersQuery {
    #[serde(rename = "_page", default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(rename = "_limit", default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(rename = "_sort", default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortBy>,
    #[serde(rename = "_order", default, skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
}

impl WinnersQuery {
    pub fn page_query(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineQuery {
    pub id: CarId,
    pub status: EngineStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveResponse {
    pub success: bool,
}

/// Body of `POST /winners` and `PUT /winners/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WinnerRequest {
    pub wins: u32,
    pub time: f64,
}

/// Body of `POST /winners/{id}/results`: one finished race for one car.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RaceResultRequest {
    pub time: f64,
}

/// One page of a list endpoint plus the total reported in
/// [`TOTAL_COUNT_HEADER`].
#[derive(Debug, Clone, PartialEq)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, total: usize) -> Self {
        Self { items, total }
    }
}
