//! JSON-lines output of the headless runner.
//!
//! **stdout:** one [`Record`] per line
//! **stderr:** logs
//!
//! # Example Run
//!
//! ```text
//! <- {"type":"started","scenario":"Fire drill","duration_ticks":240,"tick_rate":30}
//! <- {"type":"events","tick":0,"events":{"transitions":[...],...}}
//! <- {"type":"observer_joined","tick":60,"participant":2,"seq":41,"entities":7}
//! <- {"type":"observer_visual","tick":60,"structure":1,"state":"Coloring","paint":"Two"}
//! <- {"type":"finished","tick":240,"structures":[...],"replica_consistent":true}
//! ```

use serde::{Deserialize, Serialize};

use town_core::components::{ParticipantId, StructureId};
use town_core::session::TickEvents;
use town_core::structure::{LifecycleState, PaintStage};

/// One output line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    /// Run started.
    Started {
        /// Scenario name.
        scenario: String,
        /// Ticks that will run.
        duration_ticks: u64,
        /// Authority ticks per second.
        tick_rate: u32,
    },
    /// Something happened during a tick.
    Events {
        /// Tick number.
        tick: u64,
        /// What happened.
        events: TickEvents,
    },
    /// The late observer attached.
    ObserverJoined {
        /// Tick at which it joined.
        tick: u64,
        /// Observer id.
        participant: ParticipantId,
        /// Snapshot sequence number.
        seq: u64,
        /// Entities in the snapshot.
        entities: usize,
    },
    /// The observer presented a structure.
    ObserverVisual {
        /// Tick during which it was presented.
        tick: u64,
        /// Structure.
        structure: StructureId,
        /// State shown.
        state: LifecycleState,
        /// Paint shown.
        paint: PaintStage,
    },
    /// Run finished.
    Finished {
        /// Ticks run.
        tick: u64,
        /// Final state of every structure still standing.
        structures: Vec<StructureSummary>,
        /// Whether the observer ended up agreeing with the authority
        /// (`None` if no observer joined).
        replica_consistent: Option<bool>,
    },
}

/// Final state of one structure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructureSummary {
    /// Structure id.
    pub id: StructureId,
    /// Lifecycle state.
    pub state: LifecycleState,
    /// Paint progress.
    pub paint: PaintStage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_tagged() {
        let record = Record::Started {
            scenario: "x".into(),
            duration_ticks: 3,
            tick_rate: 30,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.starts_with(r#"{"type":"started""#));
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
