//! # Town Core
//!
//! Authoritative house lifecycle simulation for Colortown.
//!
//! One participant (the authority) owns the simulation; everybody else keeps
//! a read-only mirror fed by replication frames. This crate contains:
//! - No rendering
//! - No physics engine (placement probes and zone triggers are injected)
//! - No networking (frames are plain bytes; transport lives elsewhere)
//!
//! ## Crate Structure
//!
//! - [`session`] - Authoritative session loop and requests
//! - [`structure`] - Houses, lifecycle and paint
//! - [`factory`] - Color factories, requirement counting and squeezing
//! - [`hazard`] - Fires and their countdown
//! - [`item`] - Collectible fruit
//! - [`replicated`] - Single-writer replicated variables
//! - [`replication`] - Observer-side mirror
//! - [`wire`] - Replication messages and their binary encoding

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod components;
pub mod config;
pub mod error;
pub mod factory;
pub mod hazard;
pub mod interfaces;
pub mod item;
mod lifecycle;
pub mod math;
pub mod observer;
pub mod placement;
pub mod registry;
pub mod replicated;
pub mod replication;
pub mod requirement;
pub mod session;
pub mod squeeze;
pub mod structure;
pub mod wire;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::components::*;
    pub use crate::config::TownConfig;
    pub use crate::error::{Result, TownError};
    pub use crate::factory::Factory;
    pub use crate::hazard::Hazard;
    pub use crate::interfaces::{
        EffectKind, EffectSpawner, NullEffects, NullPresentation, PlacementResolver, Presentation,
    };
    pub use crate::item::{CollectibleItem, ItemLifeState};
    pub use crate::math::{Pose, Vec3};
    pub use crate::observer::Subscription;
    pub use crate::placement::{GroundPlane, Surface, SurfacePlacement, SurfaceProbe};
    pub use crate::replicated::ReplicatedVar;
    pub use crate::replication::Replica;
    pub use crate::session::{Request, Session, TickEvents, Transition};
    pub use crate::squeeze::SqueezeSample;
    pub use crate::structure::{LifecycleState, PaintStage, StateChange, Structure};
    pub use crate::wire::{Frame, WorldSnapshot};
}
