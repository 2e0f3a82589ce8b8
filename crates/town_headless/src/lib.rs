//! Headless scenario runner for CI verification.
//!
//! Runs an authoritative town session from a RON scenario without any
//! rendering and reports what happened as JSON lines:
//!
//! - **stdout**: [`protocol::Record`]s (JSON, one per line)
//! - **stderr**: Debug logs (human-readable)
//!
//! A late-joining observer can be attached at any tick to check that it
//! converges on the authority's state.
//!
//! # Example
//!
//! ```bash
//! cargo run -p town_headless -- run --scenario crates/town_headless/scenarios/fire_drill.ron \
//!     --observer-join-tick 44
//! ```

pub mod protocol;
pub mod runner;
pub mod scenario;

pub use protocol::{Record, StructureSummary};
pub use runner::{RunOptions, RunSummary, ScenarioRunner};
pub use scenario::{Scenario, ScenarioError};
