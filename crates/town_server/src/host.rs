//! Authority host loop.
//!
//! All messages from the outside arrive on one channel and are handled
//! between ticks, in arrival order. After every tick the outbox is encoded
//! and broadcast; an observer that falls more than `frame_buffer` frames
//! behind gets [`HostError::Lagged`] and has to join again.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use town_core::components::{Category, DecorationIndex, ItemId, Origin, ParticipantId, StructureId};
use town_core::config::TownConfig;
use town_core::error::TownError;
use town_core::interfaces::Presentation;
use town_core::math::{Pose, Vec3};
use town_core::replication::{decode_snapshot, encode_frame, encode_snapshot, Replica};
use town_core::session::{Request, Session, TickEvents};
use town_core::wire::WorldSnapshot;

use crate::ServerConfig;

/// An encoded replication frame.
pub type FrameBytes = Arc<[u8]>;

/// Error type for host operations.
#[derive(Error, Debug)]
pub enum HostError {
    /// The host loop has stopped.
    #[error("Authority host is not running")]
    Closed,
    /// No room for another observer.
    #[error("Observer limit reached ({max})")]
    Full {
        /// Configured maximum.
        max: usize,
    },
    /// An observer missed frames and must rejoin.
    #[error("Observer lagged and skipped {0} frame(s)")]
    Lagged(u64),
    /// Core failure (config, encoding).
    #[error(transparent)]
    Core(#[from] TownError),
    /// Console I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The host task panicked or was cancelled.
    #[error("Host task failed: {0}")]
    Task(String),
}

enum Inbound {
    Request {
        origin: Origin,
        request: Request,
    },
    AddStructure {
        pose: Pose,
        decoration: DecorationIndex,
        reply: oneshot::Sender<StructureId>,
    },
    SpawnItem {
        category: Category,
        position: Vec3,
        fall_delay: Option<f32>,
        reply: oneshot::Sender<ItemId>,
    },
    Join {
        participant: ParticipantId,
        reply: oneshot::Sender<Result<ObserverLink, HostError>>,
    },
    Leave {
        participant: ParticipantId,
    },
    Shutdown,
}

// ============================================================================
// Handle
// ============================================================================

/// Sending side of the host. `Send`, cheap to clone.
#[derive(Debug, Clone)]
pub struct HostHandle {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl HostHandle {
    fn send(&self, message: Inbound) -> Result<(), HostError> {
        self.tx.send(message).map_err(|_| HostError::Closed)
    }

    /// Queue a request for the next tick.
    pub fn submit(&self, origin: Origin, request: Request) -> Result<(), HostError> {
        self.send(Inbound::Request { origin, request })
    }

    /// Add an unbuilt structure.
    pub async fn add_structure(
        &self,
        pose: Pose,
        decoration: DecorationIndex,
    ) -> Result<StructureId, HostError> {
        let (reply, rx) = oneshot::channel();
        self.send(Inbound::AddStructure {
            pose,
            decoration,
            reply,
        })?;
        rx.await.map_err(|_| HostError::Closed)
    }

    /// Spawn a hanging item.
    pub async fn spawn_item(
        &self,
        category: Category,
        position: Vec3,
        fall_delay: Option<f32>,
    ) -> Result<ItemId, HostError> {
        let (reply, rx) = oneshot::channel();
        self.send(Inbound::SpawnItem {
            category,
            position,
            fall_delay,
            reply,
        })?;
        rx.await.map_err(|_| HostError::Closed)
    }

    /// Join as an observer.
    pub async fn join(&self, participant: ParticipantId) -> Result<ObserverLink, HostError> {
        let (reply, rx) = oneshot::channel();
        self.send(Inbound::Join { participant, reply })?;
        rx.await.map_err(|_| HostError::Closed)?
    }

    /// Stop the host after the current tick.
    pub fn shutdown(&self) -> Result<(), HostError> {
        self.send(Inbound::Shutdown)
    }
}

impl std::fmt::Debug for Inbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Inbound::Request { origin, request } => f
                .debug_struct("Request")
                .field("origin", origin)
                .field("request", request)
                .finish(),
            Inbound::AddStructure { decoration, .. } => f
                .debug_struct("AddStructure")
                .field("decoration", decoration)
                .finish_non_exhaustive(),
            Inbound::SpawnItem { category, .. } => f
                .debug_struct("SpawnItem")
                .field("category", category)
                .finish_non_exhaustive(),
            Inbound::Join { participant, .. } => {
                f.debug_struct("Join").field("participant", participant).finish_non_exhaustive()
            }
            Inbound::Leave { participant } => {
                f.debug_struct("Leave").field("participant", participant).finish()
            }
            Inbound::Shutdown => f.write_str("Shutdown"),
        }
    }
}

// ============================================================================
// Observer link
// ============================================================================

/// An observer's connection to the host.
#[derive(Debug)]
pub struct ObserverLink {
    participant: ParticipantId,
    snapshot: Vec<u8>,
    frames: broadcast::Receiver<FrameBytes>,
    host: HostHandle,
}

impl ObserverLink {
    /// This observer's id.
    #[must_use]
    pub const fn participant(&self) -> ParticipantId {
        self.participant
    }

    /// Decode the join snapshot.
    pub fn snapshot(&self) -> Result<WorldSnapshot, HostError> {
        Ok(decode_snapshot(&self.snapshot)?)
    }

    /// Build a replica from the join snapshot.
    pub fn replica(&self, presentation: impl Presentation + 'static) -> Result<Replica, HostError> {
        Ok(Replica::attach(self.participant, &self.snapshot()?, presentation))
    }

    /// Wait for the next frame. `None` once the host has stopped.
    pub async fn next_frame(&mut self) -> Result<Option<FrameBytes>, HostError> {
        match self.frames.recv().await {
            Ok(frame) => Ok(Some(frame)),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(participant = %self.participant, skipped, "observer lagged");
                Err(HostError::Lagged(skipped))
            }
            Err(broadcast::error::RecvError::Closed) => Ok(None),
        }
    }

    /// Send a request as this observer.
    pub fn submit(&self, request: Request) -> Result<(), HostError> {
        self.host.submit(Origin::Observer(self.participant), request)
    }
}

impl Drop for ObserverLink {
    fn drop(&mut self) {
        // The host may already be gone.
        let _ = self.host.send(Inbound::Leave {
            participant: self.participant,
        });
    }
}

// ============================================================================
// Host
// ============================================================================

/// Owns the authoritative session.
pub struct AuthorityHost {
    session: Session,
    server: ServerConfig,
    dt: f32,
    frames: broadcast::Sender<FrameBytes>,
    observers: BTreeSet<ParticipantId>,
    tx: mpsc::UnboundedSender<Inbound>,
    inbound: Option<mpsc::UnboundedReceiver<Inbound>>,
}

impl std::fmt::Debug for AuthorityHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorityHost")
            .field("session", &self.session)
            .field("dt", &self.dt)
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

impl AuthorityHost {
    /// Create a host. The server tick rate, if set, overrides `config`.
    pub fn new(mut config: TownConfig, server: ServerConfig) -> Result<Self, HostError> {
        if let Some(rate) = server.tick_rate {
            config.tick_rate = rate;
        }
        config.validate()?;

        let dt = 1.0 / config.tick_rate as f32;
        let (frames, _) = broadcast::channel(server.frame_buffer.max(1));
        let (tx, inbound) = mpsc::unbounded_channel();
        Ok(Self {
            session: Session::new(config),
            server,
            dt,
            frames,
            observers: BTreeSet::new(),
            tx,
            inbound: Some(inbound),
        })
    }

    /// A handle for talking to this host.
    #[must_use]
    pub fn handle(&self) -> HostHandle {
        HostHandle {
            tx: self.tx.clone(),
        }
    }

    /// The session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Run until shutdown. Must be polled inside a `LocalSet`.
    ///
    /// Returns the number of ticks run.
    pub async fn run(mut self) -> Result<u64, HostError> {
        let mut inbound = self.inbound.take().ok_or(HostError::Closed)?;
        let mut interval = tokio::time::interval(Duration::from_secs_f32(self.dt));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(tick_rate = self.session.config().tick_rate, "authority host running");

        loop {
            tokio::select! {
                message = inbound.recv() => {
                    let Some(message) = message else { break };
                    if !self.handle_inbound(message) {
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.step()?;
                }
            }
        }

        // Requests queued before shutdown still get their tick.
        if self.session.pending_requests() > 0 {
            self.step()?;
        }
        self.session.shutdown();
        self.publish_frames()?;
        let ticks = self.session.current_tick();
        tracing::info!(ticks, "authority host stopped");
        Ok(ticks)
    }

    /// Advance one tick and broadcast its frames.
    pub fn step(&mut self) -> Result<TickEvents, HostError> {
        let events = self.session.tick(self.dt);
        for transition in &events.transitions {
            tracing::debug!(
                structure = %transition.structure,
                from = ?transition.from,
                to = ?transition.to,
                "transition"
            );
        }
        self.publish_frames()?;
        Ok(events)
    }

    fn publish_frames(&mut self) -> Result<(), HostError> {
        for frame in self.session.drain_outbox() {
            let bytes: FrameBytes = encode_frame(&frame)?.into();
            if self.frames.send(bytes).is_err() {
                tracing::trace!(seq = frame.seq, "no observers for frame");
            }
        }
        Ok(())
    }

    /// Apply one inbound message. Returns `false` on shutdown.
    fn handle_inbound(&mut self, message: Inbound) -> bool {
        match message {
            Inbound::Request { origin, request } => {
                self.session.submit_from(origin, request);
            }
            Inbound::AddStructure {
                pose,
                decoration,
                reply,
            } => {
                let id = self.session.add_structure(pose, decoration);
                let _ = reply.send(id);
            }
            Inbound::SpawnItem {
                category,
                position,
                fall_delay,
                reply,
            } => {
                let id = self.session.spawn_item(category, position, fall_delay);
                let _ = reply.send(id);
            }
            Inbound::Join { participant, reply } => {
                let _ = reply.send(self.join(participant));
            }
            Inbound::Leave { participant } => {
                if self.observers.remove(&participant) {
                    tracing::info!(%participant, "observer left");
                }
            }
            Inbound::Shutdown => return false,
        }
        true
    }

    fn join(&mut self, participant: ParticipantId) -> Result<ObserverLink, HostError> {
        if !self.observers.contains(&participant) && self.observers.len() >= self.server.max_observers {
            return Err(HostError::Full {
                max: self.server.max_observers,
            });
        }

        // Everything up to the snapshot goes out first; the new receiver
        // only sees what comes after.
        self.publish_frames()?;
        let snapshot = self.session.snapshot();
        let bytes = encode_snapshot(&snapshot)?;
        let frames = self.frames.subscribe();
        self.observers.insert(participant);
        tracing::info!(%participant, seq = snapshot.seq, "observer joined");

        Ok(ObserverLink {
            participant,
            snapshot: bytes,
            frames,
            host: self.handle(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use town_core::interfaces::NullPresentation;
    use town_core::structure::LifecycleState;

    fn host() -> AuthorityHost {
        AuthorityHost::new(TownConfig::default(), ServerConfig::default()).unwrap()
    }

    fn add_house(host: &mut AuthorityHost) -> StructureId {
        let (reply, mut rx) = oneshot::channel();
        host.handle_inbound(Inbound::AddStructure {
            pose: Pose::default(),
            decoration: DecorationIndex(0),
            reply,
        });
        rx.try_recv().unwrap()
    }

    fn join(host: &mut AuthorityHost, participant: u64) -> Result<ObserverLink, HostError> {
        let (reply, mut rx) = oneshot::channel();
        host.handle_inbound(Inbound::Join {
            participant: ParticipantId(participant),
            reply,
        });
        rx.try_recv().unwrap()
    }

    #[test]
    fn test_joined_observer_follows_frames() {
        let mut host = host();
        let house = add_house(&mut host);
        let mut link = join(&mut host, 2).unwrap();
        let mut replica = link.replica(NullPresentation).unwrap();

        host.handle_inbound(Inbound::Request {
            origin: Origin::Authority,
            request: Request::Place { structure: house },
        });
        host.step().unwrap();

        while let Ok(frame) = link.frames.try_recv() {
            replica.apply_bytes(&frame).unwrap();
        }
        assert_eq!(
            replica.structure(house).map(|s| s.state()),
            Some(LifecycleState::Built)
        );
        assert_eq!(replica.last_seq(), host.session().last_seq());
    }

    #[test]
    fn test_observer_limit() {
        let mut host = AuthorityHost::new(
            TownConfig::default(),
            ServerConfig {
                max_observers: 1,
                ..ServerConfig::default()
            },
        )
        .unwrap();
        let _first = join(&mut host, 2).unwrap();
        assert!(matches!(join(&mut host, 3), Err(HostError::Full { max: 1 })));
    }

    #[test]
    fn test_out_of_range_tick_rate_rejected() {
        for rate in [0, 2_000_000_000] {
            let server = ServerConfig {
                tick_rate: Some(rate),
                ..ServerConfig::default()
            };
            assert!(matches!(
                AuthorityHost::new(TownConfig::default(), server),
                Err(HostError::Core(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let server = ServerConfig {
            tick_rate: Some(200),
            ..ServerConfig::default()
        };
        let host = AuthorityHost::new(TownConfig::default(), server).unwrap();
        let handle = host.handle();

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async move {
                let task = tokio::task::spawn_local(host.run());
                let house = handle
                    .add_structure(Pose::default(), DecorationIndex(0))
                    .await
                    .unwrap();
                let mut link = handle.join(ParticipantId(2)).await.unwrap();
                let mut replica = link.replica(NullPresentation).unwrap();

                link.submit(Request::Ignite { structure: house }).unwrap();
                while replica.hazard_on(house).is_none() {
                    let frame = tokio::time::timeout(Duration::from_secs(5), link.next_frame())
                        .await
                        .unwrap()
                        .unwrap()
                        .unwrap();
                    replica.apply_bytes(&frame).unwrap();
                }

                handle.shutdown().unwrap();
                let ticks = task.await.unwrap().unwrap();
                assert!(ticks > 0);
            })
            .await;
    }
}
