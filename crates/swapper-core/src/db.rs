// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite pool setup shared by the queue and checkpoint store backends.

use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use thiserror::Error;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// Errors while opening the swapper database.
#[derive(Debug, Error)]
pub enum DbError {
    /// Parent directory of the database file could not be created.
    #[error("failed to create directory {path:?}: {source}")]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Connection could not be established.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        /// Connection URL.
        url: String,
        /// Underlying driver error.
        #[source]
        source: sqlx::Error,
    },

    /// Schema migrations failed.
    #[error("failed to run migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Connect to a database URL and run migrations.
pub async fn connect(url: &str) -> Result<SqlitePool, DbError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await
        .map_err(|source| DbError::Connect {
            url: url.to_string(),
            source,
        })?;

    MIGRATOR.run(&pool).await?;
    Ok(pool)
}

/// Open (creating if needed) a database file and run migrations.
pub async fn from_path(path: impl AsRef<Path>) -> Result<SqlitePool, DbError> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| DbError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    connect(&format!("sqlite:{}?mode=rwc", path.to_string_lossy())).await
}

/// Single-connection in-memory database, migrated.
///
/// In-memory SQLite databases are per-connection, so the pool is capped at one.
pub async fn memory_pool() -> Result<SqlitePool, DbError> {
    let url = "sqlite::memory:";
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(url)
        .await
        .map_err(|source| DbError::Connect {
            url: url.to_string(),
            source,
        })?;

    MIGRATOR.run(&pool).await?;
    Ok(pool)
}
