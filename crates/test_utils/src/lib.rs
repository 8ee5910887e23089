//! Test Utilities Crate
//!
//! Provides shared test infrastructure for the payment engine test suite.
//!
//! # Modules
//!
//! - `memory`: In-memory `PaymentStore` adapter with serialized units of work
//! - `gateway`: Scripted gateway stub with invocation counting
//! - `publisher`: Event publisher that records instead of delivering
//! - `builders`: Builder patterns for test request construction

pub mod builders;
pub mod gateway;
pub mod memory;
pub mod publisher;

pub use builders::*;
pub use gateway::*;
pub use memory::*;
pub use publisher::*;
