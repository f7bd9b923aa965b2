use std::fs;

use tracing::info;

use crate::config::AppConfig;
use crate::db::Store;
use crate::error::AppError;
use crate::services::{BackupService, MigrationService, MigrationStats, TrackerService};

pub struct AppState {
    pub config: AppConfig,
    pub tracker: TrackerService,
}

impl AppState {
    /// Opens the store and imports any legacy data before handing it out.
    pub async fn bootstrap(config: AppConfig) -> Result<(Self, MigrationStats), AppError> {
        fs::create_dir_all(&config.data_dir)?;

        let db_path = config.db_path();
        info!("Opening store at {}", db_path.display());
        let mut store = Store::open(db_path).await?;

        let stats = MigrationService::new(&config.data_dir).run(&mut store).await;

        let state = Self {
            config,
            tracker: TrackerService::new(store),
        };
        Ok((state, stats))
    }

    pub fn backup(&self) -> BackupService {
        BackupService::new(&self.config.images_dir)
    }
}
