//! Production pipeline through the session: zone events, squeezing,
//! consumption and decoration progress.

use town_core::prelude::*;
use town_test_utils::fixtures::{grips, TestTown, DT};

const RED: Category = Category(1);
const BLUE: Category = Category(2);

#[test]
fn test_requirement_follows_zone_and_consumption() {
    let mut town = TestTown::new();
    let (_house, factory) = town.built_house(DecorationIndex(1));
    let items = town.fill(factory, RED, 3);
    assert_eq!(town.presentation.last_requirement(factory), Some(true));

    // Three presses consume the oldest item; the other two keep it met.
    town.press(factory);
    town.press(factory);
    let events = town.press(factory);
    assert_eq!(events.items_consumed, vec![items[0]]);

    let counter = town.session.registry().factory(factory).unwrap().requirement();
    assert_eq!(counter.consumed_count(), 1);
    assert_eq!(counter.present_count(), 2);
    assert!(counter.is_met());

    town.session.submit(Request::ItemExited {
        factory,
        item: items[2],
    });
    town.session.tick(DT);

    let counter = town.session.registry().factory(factory).unwrap().requirement();
    assert_eq!(counter.present_count(), 1);
    assert!(counter.contains(items[1]));
    assert!(!counter.is_met());
    assert_eq!(town.presentation.last_requirement(factory), Some(false));
}

#[test]
fn test_wrong_category_never_meets_requirement() {
    let mut town = TestTown::new();
    let (_house, factory) = town.built_house(DecorationIndex(1));
    town.fill(factory, BLUE, 5);

    let counter = town.session.registry().factory(factory).unwrap().requirement();
    assert_eq!(counter.present_count(), 0);
    assert!(!counter.is_met());
    assert_eq!(town.presentation.last_requirement(factory), Some(false));
}

#[test]
fn test_squeeze_ignored_until_requirement_met() {
    let mut town = TestTown::new();
    let (_house, factory) = town.built_house(DecorationIndex(1));
    town.fill(factory, RED, 2);

    for _ in 0..5 {
        let events = town.press(factory);
        assert!(events.items_consumed.is_empty());
        assert_eq!(events.rejected_requests, 2);
    }
}

#[test]
fn test_three_items_color_the_house() {
    let mut town = TestTown::new();
    let (house, factory) = town.built_house(DecorationIndex(1));
    town.fill(factory, RED, 3);

    let mut despawned = Vec::new();
    for _ in 0..9 {
        despawned.extend(town.press(factory).factories_despawned);
    }

    assert_eq!(town.state(house), Some(LifecycleState::Colored));
    assert_eq!(despawned, vec![factory]);
    assert!(town.session.registry().factory(factory).is_none());
    assert_eq!(town.effects.count(EffectKind::ItemBurst), 3);
    assert_eq!(
        town.presentation.last_visual(house),
        Some((LifecycleState::Colored, PaintStage::Full))
    );

    let structure = town.session.registry().structure(house).unwrap();
    assert_eq!(structure.bound_factory(), None);
    assert!(town.session.validate().is_ok());
}

#[test]
fn test_first_consumption_starts_coloring() {
    let mut town = TestTown::new();
    let (house, factory) = town.built_house(DecorationIndex(1));
    town.fill(factory, RED, 3);
    for _ in 0..3 {
        town.press(factory);
    }

    assert_eq!(town.state(house), Some(LifecycleState::Coloring));
    let structure = town.session.registry().structure(house).unwrap();
    assert_eq!(structure.paint_stage(), PaintStage::One);
    assert_eq!(structure.bound_factory(), Some(factory));
}

#[test]
fn test_released_grips_start_a_new_gesture() {
    let mut town = TestTown::new();
    let (_house, factory) = town.built_house(DecorationIndex(1));
    town.fill(factory, RED, 3);

    town.session.submit(Request::SqueezeSample {
        factory,
        sample: grips(0.4),
    });
    town.session.tick(DT);
    let squeezed = town.session.registry().factory(factory).unwrap();
    assert!((squeezed.squeeze_ratio() - 1.0).abs() < 1e-6);

    town.session.submit(Request::SqueezeSample {
        factory,
        sample: grips(0.2),
    });
    town.session.tick(DT);
    let squeezed = town.session.registry().factory(factory).unwrap();
    assert!((squeezed.squeeze_ratio() - 0.5).abs() < 1e-6);

    town.session.submit(Request::SqueezeReleased { factory });
    town.session.tick(DT);
    let released = town.session.registry().factory(factory).unwrap();
    assert!((released.squeeze_ratio() - 1.0).abs() < 1e-6);
}

#[test]
fn test_held_items_do_not_expire() {
    let mut config = TownConfig::default();
    config.item.landed_lifetime = 1.0;
    let mut town = TestTown::with_config(config);
    let (_house, factory) = town.built_house(DecorationIndex(1));

    let held = town.session.spawn_item(RED, Vec3::ZERO, Some(0.0));
    let loose = town.session.spawn_item(RED, Vec3::ZERO, Some(0.0));
    town.session.tick(DT);
    for item in [held, loose] {
        town.session.submit(Request::LandItem {
            item,
            position: Vec3::ZERO,
        });
    }
    town.session.submit(Request::ItemEntered { factory, item: held });

    let expired: Vec<ItemId> = town
        .run(3, 0.5)
        .into_iter()
        .flat_map(|events| events.items_expired)
        .collect();
    assert_eq!(expired, vec![loose]);
    assert!(town.session.registry().item(held).is_some());
}

#[test]
fn test_factory_raises_once_after_requirement() {
    let mut town = TestTown::new();
    let (_house, factory) = town.built_house(DecorationIndex(1));
    town.fill(factory, RED, 3);

    town.run(5, 0.5);
    let factory = town.session.registry().factory(factory).unwrap();
    assert!(factory.is_raised());
    assert!((factory.pose().position.y - 0.5).abs() < 1e-6);
}
