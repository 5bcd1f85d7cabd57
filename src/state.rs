use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::{DbPool, OrmConn};
use crate::jobs::JobQueue;
use crate::payments::GatewayRegistry;
use crate::storage::FileStore;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub gateways: GatewayRegistry,
    pub jobs: JobQueue,
    pub store: Arc<dyn FileStore>,
}
