//! # Town Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Recording presentation and effect fixtures
//! - Scripted placement resolvers
//! - Replica consistency checks
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod mirror;
pub mod strategies;

/// Re-export proptest for convenience.
pub use proptest;
