use crate::store::{
    AlertEventRepository, ContactDirectory, DatabaseConfig, DatabaseType, PostgresStore,
    ScheduleRepository, SqliteStore, Store, TaskRepository,
};
use std::sync::Arc;

/// One backing store seen through each repository interface.
#[derive(Clone)]
pub struct Repositories {
    pub store: Arc<dyn Store>,
    pub tasks: Arc<dyn TaskRepository>,
    pub schedules: Arc<dyn ScheduleRepository>,
    pub alert_events: Arc<dyn AlertEventRepository>,
    pub contacts: Arc<dyn ContactDirectory>,
}

impl Repositories {
    pub fn from_store<S: Store + 'static>(store: Arc<S>) -> Self {
        Self {
            store: store.clone(),
            tasks: store.clone(),
            schedules: store.clone(),
            alert_events: store.clone(),
            contacts: store,
        }
    }
}

pub async fn create_repositories(config: &DatabaseConfig) -> crate::Result<Repositories> {
    match config.db_type {
        DatabaseType::Sqlite => {
            let path = config
                .sqlite_path
                .as_ref()
                .ok_or_else(|| crate::Error::Config("SQLite path not configured".into()))?
                .to_str()
                .ok_or_else(|| crate::Error::Config("SQLite path is not valid UTF-8".into()))?;
            let store = SqliteStore::new(path, config.max_connections).await?;
            Ok(Repositories::from_store(Arc::new(store)))
        }
        DatabaseType::Postgres => {
            let connection_string = config.connection_string.as_ref().ok_or_else(|| {
                crate::Error::Config("PostgreSQL connection string not configured".into())
            })?;
            let store = PostgresStore::new(connection_string, config.max_connections).await?;
            Ok(Repositories::from_store(Arc::new(store)))
        }
    }
}
