//! One car's race lane.
//!
//! A [`Track`] is a cheap handle; clones share the same lane state so a race
//! can drive every lane concurrently while the garage page keeps rendering
//! them.

use std::{sync::Arc, time::Duration};

use shared::domain::{Car, CarId, Engine};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, info, warn};

use crate::api::{RaceApi, RaceApiError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackPhase {
    Idle,
    Started,
    Driving,
    Finished,
    Stopped,
}

/// Where the car icon is on its lane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    AtStart,
    Moving { started_at: Instant, duration: Duration },
    Halted { progress: f64 },
    Arrived,
}

impl Motion {
    /// Fraction of the lane covered at `now`, in `[0, 1]`.
    pub fn progress(&self, now: Instant) -> f64 {
        match *self {
            Motion::AtStart => 0.0,
            Motion::Moving {
                started_at,
                duration,
            } => {
                if duration.is_zero() {
                    return 1.0;
                }
                let elapsed = now.saturating_duration_since(started_at);
                (elapsed.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0)
            }
            Motion::Halted { progress } => progress,
            Motion::Arrived => 1.0,
        }
    }
}

/// How a start request ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriveResult {
    /// The drive succeeded; the car is on its way for `travel_time`.
    Arrived { travel_time: Duration },
    /// A drive was already running for this car; nothing changed.
    AlreadyDriving,
    /// The engine failed and the car was reset to the start.
    Failed,
    /// The lane was stopped before the backend answered.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackSnapshot {
    pub car: Car,
    pub engine: Engine,
    pub phase: TrackPhase,
    pub motion: Motion,
    pub progress: f64,
    pub go_enabled: bool,
    pub stop_enabled: bool,
}

struct TrackState {
    car: Car,
    engine: Engine,
    phase: TrackPhase,
    motion: Motion,
    go_enabled: bool,
    stop_enabled: bool,
    run: u64,
}

#[derive(Clone)]
pub struct Track {
    car_id: CarId,
    state: Arc<Mutex<TrackState>>,
}

impl Track {
    pub fn new(car: Car) -> Self {
        Self {
            car_id: car.id,
            state: Arc::new(Mutex::new(TrackState {
                car,
                engine: Engine::IDLE,
                phase: TrackPhase::Idle,
                motion: Motion::AtStart,
                go_enabled: true,
                stop_enabled: false,
                run: 0,
            })),
        }
    }

    pub fn car_id(&self) -> CarId {
        self.car_id
    }

    pub async fn snapshot(&self) -> TrackSnapshot {
        let state = self.state.lock().await;
        TrackSnapshot {
            car: state.car.clone(),
            engine: state.engine,
            phase: state.phase,
            motion: state.motion,
            progress: state.motion.progress(Instant::now()),
            go_enabled: state.go_enabled,
            stop_enabled: state.stop_enabled,
        }
    }

    pub async fn phase(&self) -> TrackPhase {
        self.state.lock().await.phase
    }

    /// Replaces the car drawn on this lane, keeping its race state.
    pub async fn set_car(&self, car: Car) {
        self.state.lock().await.car = car;
    }

    /// Starts the engine and drives.
    ///
    /// A "not started" answer to the drive request restarts the engine and
    /// retries the drive once. Transport failures are returned; every other
    /// failure resets the lane.
    pub async fn start(&self, api: &dyn RaceApi) -> Result<DriveResult, RaceApiError> {
        let run = {
            let mut state = self.state.lock().await;
            state.run += 1;
            state.phase = TrackPhase::Started;
            state.motion = Motion::AtStart;
            state.go_enabled = false;
            state.stop_enabled = true;
            state.run
        };

        let engine = match api.start_engine(self.car_id).await {
            Ok(engine) => engine,
            Err(err) => {
                warn!(car_id = self.car_id.0, error = %err, "engine: start failed");
                self.reset_if_current(run).await;
                return Err(err);
            }
        };
        if !self.begin_motion(run, engine).await {
            return Ok(DriveResult::Cancelled);
        }
        self.drive(api, run).await
    }

    async fn drive(&self, api: &dyn RaceApi, run: u64) -> Result<DriveResult, RaceApiError> {
        let mut restarted = false;
        loop {
            match api.drive(self.car_id).await {
                Ok(response) if response.success => {
                    let state = self.state.lock().await;
                    if state.run != run {
                        return Ok(DriveResult::Cancelled);
                    }
                    let travel_time = state.engine.travel_time().unwrap_or_default();
                    debug!(car_id = self.car_id.0, ?travel_time, "engine: drive succeeded");
                    return Ok(DriveResult::Arrived { travel_time });
                }
                Ok(_) => {
                    if !self.fail(api, run).await {
                        return Ok(DriveResult::Cancelled);
                    }
                    return Ok(DriveResult::Failed);
                }
                Err(RaceApiError::AlreadyDriving(_)) => {
                    debug!(car_id = self.car_id.0, "engine: already driving");
                    return Ok(DriveResult::AlreadyDriving);
                }
                Err(RaceApiError::NotStarted(_)) if !restarted => {
                    restarted = true;
                    info!(car_id = self.car_id.0, "engine: not started, restarting once");
                    let engine = match api.start_engine(self.car_id).await {
                        Ok(engine) => engine,
                        Err(err) if err.is_transport() => return Err(err),
                        Err(err) => {
                            warn!(car_id = self.car_id.0, error = %err, "engine: restart failed");
                            if !self.fail(api, run).await {
                                return Ok(DriveResult::Cancelled);
                            }
                            return Ok(DriveResult::Failed);
                        }
                    };
                    if !self.begin_motion(run, engine).await {
                        return Ok(DriveResult::Cancelled);
                    }
                }
                Err(err) if err.is_transport() => return Err(err),
                Err(err) => {
                    warn!(car_id = self.car_id.0, error = %err, "engine: drive failed");
                    if !self.fail(api, run).await {
                        return Ok(DriveResult::Cancelled);
                    }
                    return Ok(DriveResult::Failed);
                }
            }
        }
    }

    /// Marks the current drive as arrived and returns its travel time.
    /// Returns `None` unless the lane is driving.
    pub async fn complete(&self) -> Option<Duration> {
        let mut state = self.state.lock().await;
        if state.phase != TrackPhase::Driving {
            return None;
        }
        let travel_time = match state.motion {
            Motion::Moving { duration, .. } => duration,
            _ => state.engine.travel_time().unwrap_or_default(),
        };
        state.phase = TrackPhase::Finished;
        state.motion = Motion::Arrived;
        state.stop_enabled = true;
        Some(travel_time)
    }

    /// Halts the car where it is and stops the engine. Any drive still in
    /// flight is ignored when it answers.
    pub async fn stop(&self, api: &dyn RaceApi) -> Result<(), RaceApiError> {
        {
            let mut state = self.state.lock().await;
            state.run += 1;
            let progress = state.motion.progress(Instant::now());
            state.motion = match state.motion {
                Motion::AtStart => Motion::AtStart,
                Motion::Arrived => Motion::Arrived,
                _ => Motion::Halted { progress },
            };
            state.phase = TrackPhase::Stopped;
            state.stop_enabled = false;
        }

        let stopped = api.stop_engine(self.car_id).await;
        let mut state = self.state.lock().await;
        state.go_enabled = true;
        state.engine = stopped?;
        Ok(())
    }

    /// Moves a stopped car back to the start.
    pub async fn rewind(&self) {
        let mut state = self.state.lock().await;
        state.phase = TrackPhase::Idle;
        state.motion = Motion::AtStart;
        state.engine = Engine::IDLE;
        state.go_enabled = true;
        state.stop_enabled = false;
    }

    async fn begin_motion(&self, run: u64, engine: Engine) -> bool {
        let mut state = self.state.lock().await;
        if state.run != run {
            return false;
        }
        state.engine = engine;
        state.phase = TrackPhase::Driving;
        state.motion = Motion::Moving {
            started_at: Instant::now(),
            duration: engine.travel_time().unwrap_or_default(),
        };
        true
    }

    /// Resets the lane after an engine failure. Returns `false` when a newer
    /// run already owns the lane.
    async fn fail(&self, api: &dyn RaceApi, run: u64) -> bool {
        if !self.reset_if_current(run).await {
            return false;
        }
        info!(car_id = self.car_id.0, "engine: broke down, car reset to start");
        if let Err(err) = api.stop_engine(self.car_id).await {
            warn!(car_id = self.car_id.0, error = %err, "engine: stop after failure failed");
        }
        true
    }

    async fn reset_if_current(&self, run: u64) -> bool {
        let mut state = self.state.lock().await;
        if state.run != run {
            return false;
        }
        state.phase = TrackPhase::Idle;
        state.motion = Motion::AtStart;
        state.engine = Engine::IDLE;
        state.go_enabled = true;
        state.stop_enabled = false;
        true
    }
}

#[cfg(test)]
#[path = "tests/track_tests.rs"]
mod tests;
