//! Structure lifecycle ordering as seen by listeners, plus request
//! validation and placement retries.

use std::cell::RefCell;
use std::rc::Rc;

use town_core::prelude::*;
use town_test_utils::fixtures::{FailingPlacement, TestTown, DT};

#[derive(Debug, Clone, Copy)]
struct Seen {
    new: LifecycleState,
    bound: Option<FactoryId>,
    outgoing: Option<FactoryId>,
    hazard_intensity: Option<f32>,
}

fn watch(town: &TestTown, house: StructureId) -> (Rc<RefCell<Vec<Seen>>>, Subscription) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let subscription = town
        .session
        .registry()
        .structure(house)
        .unwrap()
        .on_state_change(move |change| {
            sink.borrow_mut().push(Seen {
                new: change.new,
                bound: change.bound_factory,
                outgoing: change.outgoing_factory.map(Factory::id),
                hazard_intensity: change.hazard.map(Hazard::intensity),
            });
        });
    (seen, subscription)
}

#[test]
fn test_binding_cleared_before_listeners_run() {
    let mut town = TestTown::new();
    let (house, factory) = town.built_house(DecorationIndex(0));
    let (seen, _subscription) = watch(&town, house);

    town.session.submit(Request::Ignite { structure: house });
    town.session.tick(DT);

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].new, LifecycleState::Firing);
    assert_eq!(seen[0].bound, None);
    // The outgoing factory is still alive while listeners run.
    assert_eq!(seen[0].outgoing, Some(factory));
}

#[test]
fn test_hazard_readable_when_saved() {
    let mut town = TestTown::new();
    let house = town.session.add_structure(Pose::default(), DecorationIndex(0));
    town.session.submit(Request::Ignite { structure: house });
    town.session.tick(DT);
    let (seen, _subscription) = watch(&town, house);

    town.session.submit(Request::Mitigate {
        structure: house,
        amount: 100.0,
    });
    town.session.tick(DT);

    let seen = seen.borrow();
    assert_eq!(seen[0].new, LifecycleState::Saved);
    assert_eq!(seen[0].hazard_intensity, Some(0.0));
    assert!(town.session.registry().hazards().next().is_none());
}

#[test]
fn test_listeners_never_see_binding_outside_built_or_coloring() {
    let mut town = TestTown::new();
    let (house, factory) = town.built_house(DecorationIndex(2));
    let (seen, _subscription) = watch(&town, house);

    town.fill(factory, Category(2), 3);
    for _ in 0..9 {
        town.press(factory);
    }

    let seen = seen.borrow();
    let states: Vec<LifecycleState> = seen.iter().map(|s| s.new).collect();
    assert_eq!(states, vec![LifecycleState::Coloring, LifecycleState::Colored]);
    for s in seen.iter() {
        if !s.new.can_hold_factory() {
            assert_eq!(s.bound, None, "{s:?}");
        }
    }
}

#[test]
fn test_paint_never_decreases() {
    let mut town = TestTown::new();
    let (house, factory) = town.built_house(DecorationIndex(1));
    let steps = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&steps);
    let _subscription = town
        .session
        .registry()
        .structure(house)
        .unwrap()
        .on_paint_change(move |old, new| sink.borrow_mut().push((*old, *new)));

    town.fill(factory, Category(1), 3);
    for _ in 0..12 {
        town.press(factory);
    }

    let steps = steps.borrow();
    assert_eq!(steps.len(), 3);
    assert!(steps.iter().all(|(old, new)| new > old));
    assert_eq!(steps.last().map(|s| s.1), Some(PaintStage::Full));
}

#[test]
fn test_decoration_progress_outside_built_or_coloring_ignored() {
    let mut town = TestTown::new();
    let house = town.session.add_structure(Pose::default(), DecorationIndex(0));
    assert!(!town.session.advance_decoration(house));
    assert_eq!(
        town.session.registry().structure(house).unwrap().paint_stage(),
        PaintStage::None
    );
}

#[test]
fn test_observer_cannot_place_or_destroy() {
    let mut town = TestTown::new();
    let house = town.session.add_structure(Pose::default(), DecorationIndex(0));
    let observer = Origin::Observer(ParticipantId(7));

    town.session
        .submit_from(observer, Request::Place { structure: house });
    town.session
        .submit_from(observer, Request::ForceDestroy { structure: house });
    let events = town.session.tick(DT);
    assert_eq!(events.rejected_requests, 2);
    assert_eq!(town.state(house), Some(LifecycleState::Unbuilt));

    town.session
        .submit_from(observer, Request::Ignite { structure: house });
    let events = town.session.tick(DT);
    assert_eq!(events.rejected_requests, 0);
    assert_eq!(town.state(house), Some(LifecycleState::Firing));
}

#[test]
fn test_force_destroy_clears_everything() {
    let mut town = TestTown::new();
    let (house, factory) = town.built_house(DecorationIndex(0));
    town.session.submit(Request::ForceDestroy { structure: house });
    let events = town.session.tick(DT);

    assert_eq!(events.factories_despawned, vec![factory]);
    assert_eq!(town.state(house), None);
    assert!(town.session.registry().is_empty());
}

#[test]
fn test_place_twice_is_noop() {
    let mut town = TestTown::new();
    let (house, _factory) = town.built_house(DecorationIndex(0));
    town.session.submit(Request::Place { structure: house });
    let events = town.session.tick(DT);
    assert_eq!(events.rejected_requests, 1);
    assert!(events.factories_spawned.is_empty());
}

#[test]
fn test_failed_placement_is_retried() {
    let placement = FailingPlacement::times(2);
    let attempts = placement.attempts();
    let mut session = Session::new(TownConfig::default()).with_placement(placement);
    let house = session.add_structure(Pose::default(), DecorationIndex(0));
    session.submit(Request::Place { structure: house });

    let mut failures = 0;
    let mut spawned = Vec::new();
    for _ in 0..4 {
        let events = session.tick(0.5);
        failures += events.placement_failures.len();
        spawned.extend(events.factories_spawned);
    }

    assert_eq!(failures, 2);
    assert_eq!(spawned.len(), 1);
    assert_eq!(*attempts.borrow(), 3);
    let structure = session.registry().structure(house).unwrap();
    assert_eq!(structure.state(), LifecycleState::Built);
    assert_eq!(structure.bound_factory(), spawned.first().copied());
}

#[test]
fn test_placement_failure_keeps_built() {
    let mut session = Session::new(TownConfig::default()).with_placement(FailingPlacement::always());
    let house = session.add_structure(Pose::default(), DecorationIndex(0));
    session.submit(Request::Place { structure: house });
    session.tick(DT);

    let structure = session.registry().structure(house).unwrap();
    assert_eq!(structure.state(), LifecycleState::Built);
    assert_eq!(structure.bound_factory(), None);
    assert!(session.validate().is_ok());
}

#[test]
fn test_shutdown_despawns_everything() {
    let mut town = TestTown::new();
    town.built_house(DecorationIndex(0));
    town.session.spawn_item(Category(0), Vec3::ZERO, None);
    town.session.shutdown();
    assert!(town.session.registry().is_empty());
}
