//! Property tests over arbitrary request and zone-event sequences.

use std::collections::BTreeSet;

use proptest::prelude::*;
use town_core::prelude::*;
use town_core::requirement::RequirementCounter;
use town_test_utils::fixtures::TestTown;
use town_test_utils::mirror::divergences;
use town_test_utils::strategies::{arb_request, arb_required, arb_zone_events, ZoneEvent};

const TARGET: Category = Category(0);
const OTHER: Category = Category(1);

proptest! {
    #[test]
    fn prop_counter_matches_model(required in arb_required(), events in arb_zone_events(40)) {
        let mut counter = RequirementCounter::local(TARGET, required);
        let mut present = BTreeSet::new();
        let mut consumed = 0u32;

        for event in events {
            match event {
                ZoneEvent::Enter(id) => {
                    counter.on_item_entered(id);
                    present.insert(id);
                }
                ZoneEvent::Exit(id) => {
                    counter.on_item_exited(id);
                    present.remove(&id);
                }
                ZoneEvent::Consume(id, matching) => {
                    let category = if matching { TARGET } else { OTHER };
                    let credited = counter.on_item_consumed(id, category);
                    prop_assert_eq!(credited, matching);
                    present.remove(&id);
                    if matching {
                        consumed += 1;
                    }
                }
            }
            prop_assert_eq!(counter.present_count() as usize, present.len());
            prop_assert_eq!(counter.consumed_count(), consumed);
            prop_assert_eq!(
                counter.is_met(),
                present.len() as u32 + consumed >= required
            );
        }
    }

    #[test]
    fn prop_session_invariants_hold(
        requests in proptest::collection::vec((arb_request(), any::<bool>()), 0..40),
    ) {
        let mut town = TestTown::new();
        let house = town.session.add_structure(Pose::default(), DecorationIndex(0));
        for _ in 0..7 {
            town.session.spawn_item(TARGET, Vec3::ZERO, None);
        }
        let mut replica = Replica::attach(
            ParticipantId(2),
            &town.session.snapshot(),
            NullPresentation,
        );
        let mut last_paint = PaintStage::None;

        for (request, from_observer) in requests {
            let origin = if from_observer {
                Origin::Observer(ParticipantId(2))
            } else {
                Origin::Authority
            };
            town.session.submit_from(origin, request);
            town.session.tick(0.5);
            for frame in town.session.drain_outbox() {
                replica.apply(&frame);
            }

            prop_assert!(town.session.validate().is_ok(), "{:?}", town.session.validate());
            prop_assert!(divergences(&town.session, &replica).is_empty());
            if let Some(structure) = town.session.registry().structure(house) {
                prop_assert!(structure.paint_stage() >= last_paint);
                last_paint = structure.paint_stage();
            }
        }
    }
}
