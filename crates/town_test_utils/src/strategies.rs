//! Proptest strategies.
//!
//! Inputs for property tests of the requirement counter, paint progress and
//! request validation.

use proptest::prelude::*;

use town_core::components::{Category, FactoryId, ItemId, StructureId};
use town_core::session::Request;

use crate::fixtures::grips;

/// One event seen by a requirement counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneEvent {
    /// Item entered the zone.
    Enter(ItemId),
    /// Item left the zone.
    Exit(ItemId),
    /// Item was consumed; `true` if its category matches the target.
    Consume(ItemId, bool),
}

/// Item ids from a small pool so events collide often.
pub fn arb_item_id() -> impl Strategy<Value = ItemId> {
    (1u64..8u64).prop_map(ItemId)
}

/// Any zone event.
pub fn arb_zone_event() -> impl Strategy<Value = ZoneEvent> {
    prop_oneof![
        arb_item_id().prop_map(ZoneEvent::Enter),
        arb_item_id().prop_map(ZoneEvent::Exit),
        (arb_item_id(), any::<bool>()).prop_map(|(id, matching)| ZoneEvent::Consume(id, matching)),
    ]
}

/// A sequence of zone events.
pub fn arb_zone_events(max_len: usize) -> impl Strategy<Value = Vec<ZoneEvent>> {
    proptest::collection::vec(arb_zone_event(), 0..max_len)
}

/// Required counts (1-6).
pub fn arb_required() -> impl Strategy<Value = u32> {
    1u32..6u32
}

/// Item categories (0-3).
pub fn arb_category() -> impl Strategy<Value = Category> {
    (0u8..4u8).prop_map(Category)
}

/// Mitigation amounts, including invalid ones.
pub fn arb_mitigation() -> impl Strategy<Value = f32> {
    prop_oneof![
        4 => 0.0f32..15.0f32,
        1 => Just(-1.0f32),
        1 => Just(f32::NAN),
    ]
}

/// Any request targeting structure 1 or factory 1.
pub fn arb_request() -> impl Strategy<Value = Request> {
    let structure = StructureId(1);
    let factory = FactoryId(1);
    prop_oneof![
        Just(Request::Place { structure }),
        Just(Request::Ignite { structure }),
        arb_mitigation().prop_map(move |amount| Request::Mitigate { structure, amount }),
        any::<bool>().prop_map(move |spraying| Request::SetSpraying {
            structure,
            spraying
        }),
        Just(Request::ForceDestroy { structure }),
        (0.1f32..1.0f32).prop_map(move |s| Request::SqueezeSample {
            factory,
            sample: grips(s),
        }),
        Just(Request::SqueezeReleased { factory }),
        arb_item_id().prop_map(|item| Request::ReleaseItem { item }),
        arb_item_id().prop_map(move |item| Request::ItemEntered { factory, item }),
        arb_item_id().prop_map(move |item| Request::ItemExited { factory, item }),
    ]
}
