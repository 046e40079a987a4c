pub mod auth;
pub mod config;
pub mod convert;
pub mod db;
pub mod error;
pub mod ingestion;
pub mod models;
pub mod routes;
pub mod storage;

use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::storage::StorageBackend;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub storage: Arc<dyn StorageBackend>,
}
