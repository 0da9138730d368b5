use std::sync::Arc;

use amora_core::Services;
use amora_db::Database;
use amora_gateway::Dispatcher;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub services: Services,
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
}
