//! Replica consistency checks.
//!
//! After every frame has been applied, an observer [`Replica`] must agree
//! with the authority on every replicated value. [`assert_mirrors`] checks
//! that and panics with the first difference.

use town_core::replication::Replica;
use town_core::session::Session;

/// A value on which a replica disagrees with the authority.
#[derive(Debug, Clone, PartialEq)]
pub struct Divergence {
    /// Entity and field, e.g. `structure#1.state`.
    pub what: String,
    /// Authority value.
    pub authority: String,
    /// Replica value.
    pub replica: String,
}

/// Compare every replicated value of `session` with `replica`.
#[must_use]
pub fn divergences(session: &Session, replica: &Replica) -> Vec<Divergence> {
    let mut out = Vec::new();
    let mut check = |what: String, authority: String, replica: String| {
        if authority != replica {
            out.push(Divergence {
                what,
                authority,
                replica,
            });
        }
    };

    let registry = session.registry();
    for structure in registry.structures() {
        let id = structure.id();
        let Some(view) = replica.structure(id) else {
            check(format!("{id}"), "present".into(), "missing".into());
            continue;
        };
        check(
            format!("{id}.state"),
            format!("{:?}", structure.state()),
            format!("{:?}", view.state()),
        );
        check(
            format!("{id}.paint"),
            format!("{:?}", structure.paint_stage()),
            format!("{:?}", view.paint_stage()),
        );
        check(
            format!("{id}.bound_factory"),
            format!("{:?}", structure.bound_factory()),
            format!("{:?}", view.bound_factory()),
        );
    }
    let structures = replica.structures().count();
    check(
        "structures".into(),
        registry.structures().count().to_string(),
        structures.to_string(),
    );

    for factory in registry.factories() {
        let id = factory.id();
        let Some(view) = replica.factory(id) else {
            check(format!("{id}"), "present".into(), "missing".into());
            continue;
        };
        check(
            format!("{id}.met"),
            factory.requirement().is_met().to_string(),
            view.requirement_met().to_string(),
        );
        check(
            format!("{id}.consumed"),
            factory.requirement().consumed_count().to_string(),
            view.consumed_count().to_string(),
        );
        check(
            format!("{id}.raised"),
            factory.is_raised().to_string(),
            view.is_raised().to_string(),
        );
        check(
            format!("{id}.pose"),
            format!("{:?}", factory.pose()),
            format!("{:?}", view.pose()),
        );
        check(
            format!("{id}.squeeze_ratio"),
            format!("{:.4}", factory.squeeze_ratio()),
            format!("{:.4}", view.squeeze_ratio()),
        );
    }

    for hazard in registry.hazards() {
        let id = hazard.id();
        let Some(view) = replica.hazard(id) else {
            check(format!("{id}"), "present".into(), "missing".into());
            continue;
        };
        check(
            format!("{id}.intensity"),
            format!("{:.4}", hazard.intensity()),
            format!("{:.4}", view.intensity()),
        );
    }

    for item in registry.items() {
        let id = item.id();
        let replica_state = replica
            .item(id)
            .map_or_else(|| "missing".to_string(), |view| format!("{:?}", view.life_state()));
        check(
            format!("{id}.life"),
            format!("{:?}", item.life_state()),
            replica_state,
        );
    }

    tracing::trace!(differences = out.len(), "replica compared");
    out
}

/// Assert that `replica` mirrors `session` exactly.
///
/// # Panics
///
/// Panics on the first difference, listing all of them.
pub fn assert_mirrors(session: &Session, replica: &Replica) {
    let found = divergences(session, replica);
    if !found.is_empty() {
        let lines: Vec<String> = found
            .iter()
            .map(|d| format!("  {}: authority={} replica={}", d.what, d.authority, d.replica))
            .collect();
        panic!(
            "Replica diverged from authority!\n\
             Authority seq: {}\n\
             Replica seq: {}\n\
             {}",
            session.last_seq(),
            replica.last_seq(),
            lines.join("\n")
        );
    }
}
