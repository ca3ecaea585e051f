use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Car, CarId, Engine, EngineStatus, Winner},
    error::ApiError,
    protocol::{
        CarRequest, DriveResponse, EngineQuery, PageQuery, Paged, RaceResultRequest,
        WinnersQuery, TOTAL_COUNT_HEADER,
    },
};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

#[derive(Debug, Error)]
pub enum RaceApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("car {0} is already driving")]
    AlreadyDriving(CarId),
    #[error("engine of car {0} was not started")]
    NotStarted(CarId),
    #[error("engine of car {0} broke down")]
    EngineBroken(CarId),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("server answered {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
}

impl RaceApiError {
    pub fn is_transport(&self) -> bool {
        matches!(self, RaceApiError::Transport { .. })
    }
}

/// Backend operations the view-models depend on.
#[async_trait]
pub trait RaceApi: Send + Sync {
    async fn list_cars(&self, page: PageQuery) -> Result<Paged<Car>, RaceApiError>;
    async fn get_car(&self, car_id: CarId) -> Result<Car, RaceApiError>;
    async fn create_car(&self, request: &CarRequest) -> Result<Car, RaceApiError>;
    async fn update_car(&self, car_id: CarId, request: &CarRequest) -> Result<Car, RaceApiError>;
    async fn delete_car(&self, car_id: CarId) -> Result<(), RaceApiError>;

    async fn start_engine(&self, car_id: CarId) -> Result<Engine, RaceApiError>;
    async fn stop_engine(&self, car_id: CarId) -> Result<Engine, RaceApiError>;
    /// Resolves once the car arrives, breaks down or is stopped.
    async fn drive(&self, car_id: CarId) -> Result<DriveResponse, RaceApiError>;

    async fn list_winners(&self, query: WinnersQuery) -> Result<Paged<Winner>, RaceApiError>;
    async fn delete_winner(&self, car_id: CarId) -> Result<(), RaceApiError>;
    /// Folds one race win with `time` seconds into the car's winner record.
    async fn record_result(&self, car_id: CarId, time: f64) -> Result<Winner, RaceApiError>;
}

/// [`RaceApi`] over HTTP/JSON.
pub struct HttpRaceApi {
    http: Client,
    base: Url,
}

impl HttpRaceApi {
    pub fn new(base: Url) -> Self {
        Self::with_client(Client::new(), base)
    }

    pub fn with_client(http: Client, base: Url) -> Self {
        Self { http, base }
    }

    fn endpoint(&self, path: &str) -> Result<Url, RaceApiError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    fn car_endpoint(&self, route: &str, car_id: CarId) -> Result<Url, RaceApiError> {
        self.endpoint(&format!("{route}/{car_id}"))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RaceApiError> {
        let request = request.build().map_err(|source| RaceApiError::Transport {
            url: source.url().map(Url::to_string).unwrap_or_default(),
            source,
        })?;
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "api: request");
        self.http.execute(request).await.map_err(|source| {
            error!(%method, %url, error = %source, "api: request failed");
            RaceApiError::Transport {
                url: url.to_string(),
                source,
            }
        })
    }

    async fn set_engine(
        &self,
        car_id: CarId,
        status: EngineStatus,
    ) -> Result<Response, RaceApiError> {
        let url = self.endpoint(shared::protocol::engine_route())?;
        self.send(
            self.http
                .patch(url)
                .query(&EngineQuery { id: car_id, status }),
        )
        .await
    }
}

#[async_trait]
impl RaceApi for HttpRaceApi {
    async fn list_cars(&self, page: PageQuery) -> Result<Paged<Car>, RaceApiError> {
        let url = self.endpoint(shared::protocol::garage_route())?;
        let response = self.send(self.http.get(url).query(&page)).await?;
        paged(response).await
    }

    async fn get_car(&self, car_id: CarId) -> Result<Car, RaceApiError> {
        let url = self.car_endpoint(shared::protocol::garage_route(), car_id)?;
        json(self.send(self.http.get(url)).await?).await
    }

    async fn create_car(&self, request: &CarRequest) -> Result<Car, RaceApiError> {
        let url = self.endpoint(shared::protocol::garage_route())?;
        json(self.send(self.http.post(url).json(request)).await?).await
    }

    async fn update_car(&self, car_id: CarId, request: &CarRequest) -> Result<Car, RaceApiError> {
        let url = self.car_endpoint(shared::protocol::garage_route(), car_id)?;
        json(self.send(self.http.put(url).json(request)).await?).await
    }

    async fn delete_car(&self, car_id: CarId) -> Result<(), RaceApiError> {
        let url = self.car_endpoint(shared::protocol::garage_route(), car_id)?;
        check_status(self.send(self.http.delete(url)).await?).await?;
        Ok(())
    }

    async fn start_engine(&self, car_id: CarId) -> Result<Engine, RaceApiError> {
        json(self.set_engine(car_id, EngineStatus::Started).await?).await
    }

    async fn stop_engine(&self, car_id: CarId) -> Result<Engine, RaceApiError> {
        json(self.set_engine(car_id, EngineStatus::Stopped).await?).await
    }

    async fn drive(&self, car_id: CarId) -> Result<DriveResponse, RaceApiError> {
        let response = self.set_engine(car_id, EngineStatus::Drive).await?;
        json(response).await.map_err(|err| match err {
            RaceApiError::NotFound(_) => RaceApiError::NotStarted(car_id),
            RaceApiError::Status { status: 429, .. } => RaceApiError::AlreadyDriving(car_id),
            RaceApiError::Status { status: 500, .. } => RaceApiError::EngineBroken(car_id),
            other => other,
        })
    }

    async fn list_winners(&self, query: WinnersQuery) -> Result<Paged<Winner>, RaceApiError> {
        let url = self.endpoint(shared::protocol::winners_route())?;
        let response = self.send(self.http.get(url).query(&query)).await?;
        paged(response).await
    }

    async fn delete_winner(&self, car_id: CarId) -> Result<(), RaceApiError> {
        let url = self.car_endpoint(shared::protocol::winners_route(), car_id)?;
        check_status(self.send(self.http.delete(url)).await?).await?;
        Ok(())
    }

    async fn record_result(&self, car_id: CarId, time: f64) -> Result<Winner, RaceApiError> {
        let url = self.endpoint(&format!(
            "{}/{car_id}/results",
            shared::protocol::winners_route()
        ))?;
        json(
            self.send(self.http.post(url).json(&RaceResultRequest { time }))
                .await?,
        )
        .await
    }
}

async fn check_status(response: Response) -> Result<Response, RaceApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiError>(&body)
        .map(|err| err.message)
        .unwrap_or(body);
    if status == StatusCode::NOT_FOUND {
        return Err(RaceApiError::NotFound(message));
    }
    Err(RaceApiError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn json<T: DeserializeOwned>(response: Response) -> Result<T, RaceApiError> {
    let response = check_status(response).await?;
    let url = response.url().to_string();
    response
        .json::<T>()
        .await
        .map_err(|err| RaceApiError::Decode {
            url,
            message: err.to_string(),
        })
}

async fn paged<T: DeserializeOwned>(response: Response) -> Result<Paged<T>, RaceApiError> {
    let response = check_status(response).await?;
    let total = total_count(&response);
    let items: Vec<T> = json(response).await?;
    let total = total.unwrap_or(items.len());
    Ok(Paged::new(items, total))
}

fn total_count(response: &Response) -> Option<usize> {
    response
        .headers()
        .get(TOTAL_COUNT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
