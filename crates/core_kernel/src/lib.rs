//! Core Kernel - Foundational types for the payment engine
//!
//! This crate provides the strongly-typed identifiers shared by all
//! workspace crates.

pub mod identifiers;

pub use identifiers::{OrderId, PaymentId};
