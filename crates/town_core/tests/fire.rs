//! Fire hazards: ignition, mitigation, timeout.

use town_core::prelude::*;
use town_test_utils::fixtures::{TestTown, DT};

fn burning_town() -> (TestTown, StructureId) {
    let mut town = TestTown::new();
    let house = town.session.add_structure(Pose::default(), DecorationIndex(0));
    town.session.submit(Request::Ignite { structure: house });
    town.session.tick(0.1);
    assert_eq!(town.state(house), Some(LifecycleState::Firing));
    (town, house)
}

#[test]
fn test_spraying_for_three_seconds_saves() {
    let (mut town, house) = burning_town();
    town.session.submit(Request::SetSpraying {
        structure: house,
        spraying: true,
    });

    town.run(29, 0.1);
    assert_eq!(town.state(house), Some(LifecycleState::Firing));

    let events = town.session.tick(0.1);
    assert_eq!(town.state(house), Some(LifecycleState::Saved));
    assert_eq!(
        events.transitions.last().map(|t| (t.from, t.to)),
        Some((LifecycleState::Firing, LifecycleState::Saved))
    );
    assert_eq!(town.session.registry().hazards().count(), 0);
    assert_eq!(town.effects.count(EffectKind::Extinguished), 1);
    assert_eq!(town.presentation.hazard_ratios(house).last(), Some(&0.0));
}

#[test]
fn test_unattended_fire_destroys_structure() {
    let mut town = TestTown::new();
    let (house, factory) = town.built_house(DecorationIndex(0));
    town.session.submit(Request::Ignite { structure: house });

    town.run(29, 1.0);
    assert_eq!(town.state(house), Some(LifecycleState::Firing));
    assert!(town.session.registry().factory(factory).is_none());

    let events = town.session.tick(1.0);
    assert!(events
        .transitions
        .contains(&Transition {
            structure: house,
            from: LifecycleState::Firing,
            to: LifecycleState::Destroyed,
        }));
    assert_eq!(town.state(house), None);
    assert_eq!(town.session.registry().hazards().count(), 0);
    assert_eq!(town.session.registry().factories().count(), 0);
    assert_eq!(town.effects.count(EffectKind::Collapse), 1);
}

#[test]
fn test_ignite_clears_factory_binding() {
    let mut town = TestTown::new();
    let (house, factory) = town.built_house(DecorationIndex(0));
    town.session.submit(Request::Ignite { structure: house });
    let events = town.session.tick(DT);

    assert_eq!(events.factories_despawned, vec![factory]);
    let structure = town.session.registry().structure(house).unwrap();
    assert_eq!(structure.bound_factory(), None);
    assert!(structure.hazard().is_some());
    assert!(town.session.validate().is_ok());
}

#[test]
fn test_mitigation_to_zero_in_last_second_saves() {
    let (mut town, house) = burning_town();
    // 0.1 s already elapsed; run up to just before the timeout.
    town.run(29, 1.0);
    assert_eq!(town.state(house), Some(LifecycleState::Firing));

    town.session.submit(Request::Mitigate {
        structure: house,
        amount: 30.0,
    });
    town.session.tick(1.0);
    assert_eq!(town.state(house), Some(LifecycleState::Saved));
}

#[test]
fn test_intensity_only_decreases() {
    let (mut town, house) = burning_town();
    for amount in [4.0, -3.0, f32::NAN, 0.0, 7.5] {
        town.session.submit(Request::Mitigate {
            structure: house,
            amount,
        });
        town.session.tick(DT);
    }

    let ratios = town.presentation.hazard_ratios(house);
    assert!(ratios.windows(2).all(|w| w[1] <= w[0]), "{ratios:?}");
    let hazard = town.session.registry().hazards().next().unwrap();
    assert!((hazard.intensity() - 18.5).abs() < 1e-4);
}

#[test]
fn test_mitigation_ignored_when_not_burning() {
    let mut town = TestTown::new();
    let (house, _factory) = town.built_house(DecorationIndex(0));
    town.session.submit(Request::Mitigate {
        structure: house,
        amount: 5.0,
    });
    let events = town.session.tick(DT);
    assert_eq!(events.rejected_requests, 1);
    assert_eq!(town.state(house), Some(LifecycleState::Built));
}

#[test]
fn test_second_ignite_is_ignored() {
    let (mut town, house) = burning_town();
    town.session.submit(Request::Ignite { structure: house });
    let events = town.session.tick(DT);
    assert_eq!(events.rejected_requests, 1);
    assert_eq!(town.session.registry().hazards().count(), 1);
}
