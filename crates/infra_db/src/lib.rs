//! Database Infrastructure
//!
//! PostgreSQL adapter for the payment store ports: connection pool
//! management, schema migrations, and the `PgPaymentStore` unit-of-work
//! implementation. The idempotency uniqueness constraint and row-level
//! payment locks both live here; the domain crate only sees the port
//! traits.

pub mod error;
pub mod pool;
pub mod store;

pub use error::DatabaseError;
pub use pool::{create_pool, create_pool_from_url, run_migrations, DatabaseConfig, DatabasePool};
pub use store::PgPaymentStore;
