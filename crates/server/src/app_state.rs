use server_api::ApiContext;

#[derive(Clone)]
pub struct AppState {
    pub api: ApiContext,
}
