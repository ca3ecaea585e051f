use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(CarId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Car {
    pub id: CarId,
    pub name: String,
    pub color: String,
}

/// Engine parameters reported by the backend when an engine starts or stops.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Engine {
    pub velocity: f64,
    pub distance: f64,
}

impl Engine {
    pub const IDLE: Engine = Engine {
        velocity: 0.0,
        distance: 0.0,
    };

    /// Time the car needs to cover `distance` at `velocity`, where one unit of
    /// `distance / velocity` is a millisecond. A stopped engine never arrives.
    pub fn travel_time(&self) -> Option<Duration> {
        if self.velocity <= 0.0 || !self.velocity.is_finite() || !self.distance.is_finite() {
            return None;
        }
        let millis = (self.distance / self.velocity).max(0.0);
        Some(Duration::from_secs_f64(millis / 1000.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Started,
    Drive,
    Stopped,
}

impl EngineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineStatus::Started => "started",
            EngineStatus::Drive => "drive",
            EngineStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(EngineStatus::Started),
            "drive" => Ok(EngineStatus::Drive),
            "stopped" => Ok(EngineStatus::Stopped),
            other => Err(format!("unknown engine status '{other}'")),
        }
    }
}

/// Aggregate race results for one car. `id` is the car id; the record lives
/// independently of the car itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Winner {
    pub id: CarId,
    pub wins: u32,
    pub time: f64,
}

impl Winner {
    /// Folds one race result into an optional existing record: a first win
    /// creates `{wins: 1, time}`, later wins bump the count and keep the best
    /// time.
    pub fn record_result(existing: Option<Winner>, id: CarId, time: f64) -> Winner {
        match existing {
            Some(previous) => Winner {
                id,
                wins: previous.wins.saturating_add(1),
                time: previous.time.min(time),
            },
            None => Winner { id, wins: 1, time },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    Id,
    Wins,
    Time,
}

impl SortBy {
    pub fn as_str(self) -> &'static str {
        match self {
            SortBy::Id => "id",
            SortBy::Wins => "wins",
            SortBy::Time => "time",
        }
    }
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "id" => Ok(SortBy::Id),
            "wins" => Ok(SortBy::Wins),
            "time" => Ok(SortBy::Time),
            other => Err(format!("unknown sort column '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn flipped(self) -> SortOrder {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortOrder::Asc),
            "DESC" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order '{other}'")),
        }
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
