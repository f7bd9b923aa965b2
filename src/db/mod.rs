pub mod repository;
pub mod snapshot;
pub mod store;

use sqlx::migrate::Migrator;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, SqliteConnection};

use crate::error::AppError;

pub use snapshot::{FileSnapshot, MemoryOnly, Persistence};
pub use store::Store;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Fresh private in-memory database with the current schema applied.
///
/// Opened by the `:memory:` name, never `sqlite::memory:`. The URL form sets
/// SQLITE_OPEN_MEMORY, which SQLite carries over to `ATTACH` and `VACUUM INTO`
/// targets.
pub async fn connect_in_memory() -> Result<SqliteConnection, AppError> {
    let mut db = SqliteConnectOptions::new()
        .filename(":memory:")
        .foreign_keys(true)
        .connect()
        .await?;

    MIGRATOR.run(&mut db).await?;
    Ok(db)
}
