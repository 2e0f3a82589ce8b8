//! Scenario runner.
//!
//! Drives an authoritative [`Session`] through a [`Scenario`] at the
//! configured tick rate, writing [`Record`]s as JSON lines. An optional
//! observer joins late from a snapshot and is fed every frame after that,
//! encoded and decoded as it would be on the wire.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use town_core::components::{DecorationIndex, Origin, ParticipantId, StructureId};
use town_core::config::TownConfig;
use town_core::interfaces::Presentation;
use town_core::replication::{encode_frame, Replica};
use town_core::session::Session;
use town_core::structure::{LifecycleState, PaintStage};

use crate::protocol::{Record, StructureSummary};
use crate::scenario::{Scenario, ScenarioError};

/// Participant id of the late observer.
pub const OBSERVER: ParticipantId = ParticipantId(2);

/// Runner options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Tick at which the observer joins; no observer if `None`.
    pub observer_join_tick: Option<u64>,
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Ticks run.
    pub ticks: u64,
    /// Final state of every structure still standing.
    pub structures: Vec<StructureSummary>,
    /// Observer agreement, if one joined.
    pub replica_consistent: Option<bool>,
}

type VisualLog = Rc<RefCell<Vec<(StructureId, LifecycleState, PaintStage)>>>;

/// Observer presentation buffering visuals until the runner writes them.
#[derive(Debug, Default)]
struct BufferedVisuals {
    log: VisualLog,
}

impl Presentation for BufferedVisuals {
    fn apply_visual(
        &mut self,
        structure: StructureId,
        state: LifecycleState,
        _decoration: DecorationIndex,
        paint: PaintStage,
    ) {
        self.log.borrow_mut().push((structure, state, paint));
    }

    fn apply_hazard_intensity(&mut self, _structure: StructureId, _ratio: f32) {}
}

/// Runs one scenario.
#[derive(Debug)]
pub struct ScenarioRunner {
    scenario: Scenario,
    config: TownConfig,
    options: RunOptions,
}

impl ScenarioRunner {
    /// Create a runner.
    #[must_use]
    pub fn new(scenario: Scenario, config: TownConfig, options: RunOptions) -> Self {
        Self {
            scenario,
            config,
            options,
        }
    }

    /// Run to completion, writing records to `out`.
    pub fn run<W: Write>(&self, out: &mut W) -> Result<RunSummary, ScenarioError> {
        let tick_rate = self.config.tick_rate;
        let dt = 1.0 / tick_rate as f32;
        let mut session = Session::new(self.config.clone());

        for placement in &self.scenario.structures {
            session.add_structure(placement.pose(), placement.decoration());
        }
        for item in &self.scenario.items {
            session.spawn_item(item.category(), item.position(), item.fall_delay);
        }

        write_record(
            out,
            &Record::Started {
                scenario: self.scenario.name.clone(),
                duration_ticks: self.scenario.duration_ticks,
                tick_rate,
            },
        )?;
        tracing::info!(
            scenario = %self.scenario.name,
            ticks = self.scenario.duration_ticks,
            "running scenario"
        );

        let visuals = VisualLog::default();
        let mut replica: Option<Replica> = None;

        for tick in 0..self.scenario.duration_ticks {
            if self.options.observer_join_tick == Some(tick) {
                let snapshot = session.snapshot();
                write_record(
                    out,
                    &Record::ObserverJoined {
                        tick,
                        participant: OBSERVER,
                        seq: snapshot.seq,
                        entities: snapshot.entities.len(),
                    },
                )?;
                let presentation = BufferedVisuals {
                    log: Rc::clone(&visuals),
                };
                replica = Some(Replica::attach(OBSERVER, &snapshot, presentation));
                flush_visuals(out, tick, &visuals)?;
            }

            for scheduled in self.scenario.requests_at(tick) {
                let origin = scheduled
                    .participant()
                    .map_or(Origin::Authority, Origin::Observer);
                session.submit_from(origin, scheduled.request.clone());
            }

            let events = session.tick(dt);
            if !events.is_empty() {
                write_record(out, &Record::Events { tick, events })?;
            }

            let frames = session.drain_outbox();
            if let Some(replica) = replica.as_mut() {
                for frame in &frames {
                    replica.apply_bytes(&encode_frame(frame)?)?;
                }
                flush_visuals(out, tick, &visuals)?;
            }
        }

        let structures: Vec<StructureSummary> = session
            .registry()
            .structures()
            .map(|s| StructureSummary {
                id: s.id(),
                state: s.state(),
                paint: s.paint_stage(),
            })
            .collect();
        let replica_consistent = replica.as_ref().map(|r| agrees(&session, r));
        if replica_consistent == Some(false) {
            tracing::warn!("observer diverged from authority");
        }

        let ticks = self.scenario.duration_ticks;
        write_record(
            out,
            &Record::Finished {
                tick: ticks,
                structures: structures.clone(),
                replica_consistent,
            },
        )?;
        Ok(RunSummary {
            ticks,
            structures,
            replica_consistent,
        })
    }
}

fn agrees(session: &Session, replica: &Replica) -> bool {
    let registry = session.registry();
    registry.structures().count() == replica.structures().count()
        && registry.structures().all(|s| {
            replica.structure(s.id()).is_some_and(|view| {
                view.state() == s.state()
                    && view.paint_stage() == s.paint_stage()
                    && view.bound_factory() == s.bound_factory()
            })
        })
        && registry.factories().all(|f| {
            replica.factory(f.id()).is_some_and(|view| {
                view.requirement_met() == f.requirement().is_met()
                    && view.consumed_count() == f.requirement().consumed_count()
            })
        })
}

fn flush_visuals<W: Write>(out: &mut W, tick: u64, visuals: &VisualLog) -> Result<(), ScenarioError> {
    let pending: Vec<_> = visuals.borrow_mut().drain(..).collect();
    for (structure, state, paint) in pending {
        write_record(
            out,
            &Record::ObserverVisual {
                tick,
                structure,
                state,
                paint,
            },
        )?;
    }
    Ok(())
}

fn write_record<W: Write>(out: &mut W, record: &Record) -> Result<(), ScenarioError> {
    serde_json::to_writer(&mut *out, record)?;
    out.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRE_DRILL: &str = include_str!("../scenarios/fire_drill.ron");

    fn run(join: Option<u64>) -> (RunSummary, Vec<Record>) {
        let scenario = Scenario::from_ron_str(FIRE_DRILL).unwrap();
        let runner = ScenarioRunner::new(
            scenario,
            TownConfig::default(),
            RunOptions {
                observer_join_tick: join,
            },
        );
        let mut out = Vec::new();
        let summary = runner.run(&mut out).unwrap();
        let records = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        (summary, records)
    }

    #[test]
    fn test_fire_drill_outcome() {
        let (summary, records) = run(None);
        assert_eq!(summary.replica_consistent, None);
        let states: Vec<_> = summary.structures.iter().map(|s| (s.id, s.state)).collect();
        assert_eq!(
            states,
            vec![
                (StructureId(1), LifecycleState::Colored),
                (StructureId(2), LifecycleState::Saved),
            ]
        );
        assert!(matches!(records.first(), Some(Record::Started { .. })));
        assert!(matches!(records.last(), Some(Record::Finished { .. })));
    }

    #[test]
    fn test_late_observer_agrees() {
        let (summary, records) = run(Some(44));
        assert_eq!(summary.replica_consistent, Some(true));

        let first = records.iter().find_map(|r| match r {
            Record::ObserverVisual {
                structure: StructureId(1),
                state,
                paint,
                ..
            } => Some((*state, *paint)),
            _ => None,
        });
        assert_eq!(first, Some((LifecycleState::Coloring, PaintStage::One)));
    }
}
