//! Database error types

use thiserror::Error;

/// Errors raised while managing the database itself
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Could not establish the connection pool
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}
