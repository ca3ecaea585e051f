//! In-memory engine simulation backing `PATCH /engine`.
//!
//! Engine state is not persisted: a server restart forgets every started
//! engine, the same way the garage frontend forgets its tracks on reload.

use std::{collections::HashMap, sync::Arc, time::Duration};

use rand::Rng;
use shared::domain::{CarId, Engine};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub min_velocity: f64,
    pub max_velocity: f64,
    pub distance: f64,
    /// Probability in `[0, 1]` that a drive breaks down before arriving.
    pub breakdown_chance: f64,
    /// Multiplier applied to real drive durations; `0.0` finishes instantly.
    pub drive_time_scale: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            min_velocity: 50.0,
            max_velocity: 200.0,
            distance: 500_000.0,
            breakdown_chance: 0.25,
            drive_time_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("engine parameters for car {0} were not found; set engine status to \"started\" before driving")]
    NotStarted(CarId),
    #[error("drive already in progress for car {0}")]
    AlreadyDriving(CarId),
    #[error("car {0} has been stopped suddenly; its engine broke down")]
    BrokenDown(CarId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    Arrived,
    /// The engine was stopped or restarted while the car was on its way.
    Interrupted,
}

struct EngineRun {
    engine: Engine,
    driving: bool,
    stop_tx: watch::Sender<bool>,
}

struct DrivePlan {
    wait: Duration,
    breaks_down: bool,
}

#[derive(Clone)]
pub struct EngineRegistry {
    settings: Arc<EngineSettings>,
    runs: Arc<Mutex<HashMap<CarId, EngineRun>>>,
}

impl EngineRegistry {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn start(&self, car_id: CarId) -> Engine {
        let engine = Engine {
            velocity: self.random_velocity(),
            distance: self.settings.distance,
        };
        let (stop_tx, _) = watch::channel(false);
        let previous = self.runs.lock().await.insert(
            car_id,
            EngineRun {
                engine,
                driving: false,
                stop_tx,
            },
        );
        if let Some(previous) = previous {
            let _ = previous.stop_tx.send(true);
        }
        info!(car_id = car_id.0, velocity = engine.velocity, "engine: started");
        engine
    }

    pub async fn stop(&self, car_id: CarId) -> Engine {
        if let Some(run) = self.runs.lock().await.remove(&car_id) {
            let _ = run.stop_tx.send(true);
            info!(car_id = car_id.0, was_driving = run.driving, "engine: stopped");
        }
        Engine {
            velocity: 0.0,
            distance: self.settings.distance,
        }
    }

    /// Holds the caller for the whole trip. Resolves early when the engine
    /// breaks down or is stopped from another request.
    pub async fn drive(&self, car_id: CarId) -> Result<DriveOutcome, EngineError> {
        let (plan, mut stop_rx) = {
            let mut runs = self.runs.lock().await;
            let run = runs
                .get_mut(&car_id)
                .ok_or(EngineError::NotStarted(car_id))?;
            if run.driving {
                return Err(EngineError::AlreadyDriving(car_id));
            }
            run.driving = true;
            (self.plan_drive(run.engine), run.stop_tx.subscribe())
        };
        debug!(
            car_id = car_id.0,
            wait_ms = plan.wait.as_millis() as u64,
            breaks_down = plan.breaks_down,
            "engine: drive planned"
        );

        let interrupted = tokio::select! {
            _ = tokio::time::sleep(plan.wait) => false,
            _ = stop_rx.wait_for(|stopped| *stopped) => true,
        };
        if interrupted {
            return Ok(DriveOutcome::Interrupted);
        }

        if let Some(run) = self.runs.lock().await.get_mut(&car_id) {
            run.driving = false;
        }
        if plan.breaks_down {
            info!(car_id = car_id.0, "engine: broke down");
            return Err(EngineError::BrokenDown(car_id));
        }
        Ok(DriveOutcome::Arrived)
    }

    fn random_velocity(&self) -> f64 {
        let (low, high) = if self.settings.min_velocity <= self.settings.max_velocity {
            (self.settings.min_velocity, self.settings.max_velocity)
        } else {
            (self.settings.max_velocity, self.settings.min_velocity)
        };
        rand::rng().random_range(low..=high)
    }

    fn plan_drive(&self, engine: Engine) -> DrivePlan {
        let scale = if self.settings.drive_time_scale.is_finite() {
            self.settings.drive_time_scale.max(0.0)
        } else {
            1.0
        };
        let travel = engine.travel_time().unwrap_or_default().mul_f64(scale);
        let mut rng = rand::rng();
        let breaks_down = rng.random_bool(self.settings.breakdown_chance.clamp(0.0, 1.0));
        let wait = if breaks_down {
            travel.mul_f64(rng.random_range(0.0..=1.0))
        } else {
            travel
        };
        DrivePlan { wait, breaks_down }
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
