//! Line-oriented JSON control console.
//!
//! One command per line:
//!
//! ```text
//! {"cmd":"add_structure","position":{"x":0.0,"y":0.0,"z":0.0},"decoration":1}
//! {"cmd":"spawn_item","category":1,"position":{"x":2.0,"y":3.0,"z":0.0}}
//! {"cmd":"request","request":{"Place":{"structure":1}}}
//! {"cmd":"request","from":7,"request":{"Ignite":{"structure":1}}}
//! {"cmd":"quit"}
//! ```
//!
//! Malformed lines are logged and skipped. End of input stops the host.

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use town_core::components::{Category, DecorationIndex, Origin, ParticipantId};
use town_core::math::{Pose, Vec3};
use town_core::session::Request;

use crate::host::{HostError, HostHandle};

/// A console command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ConsoleCommand {
    /// Add an unbuilt structure.
    AddStructure {
        /// Ground position.
        position: Vec3,
        /// Palette index.
        #[serde(default)]
        decoration: u8,
    },
    /// Spawn a hanging item.
    SpawnItem {
        /// Item category.
        category: u8,
        /// Hanging position.
        position: Vec3,
        /// Override for the fall delay.
        #[serde(default)]
        fall_delay: Option<f32>,
    },
    /// Submit a request, as the authority unless `from` names an observer.
    Request {
        /// Observer id.
        #[serde(default)]
        from: Option<u64>,
        /// The request.
        request: Request,
    },
    /// Stop the host.
    Quit,
}

impl ConsoleCommand {
    /// Parse one line. `Ok(None)` for blank lines and `#` comments.
    pub fn parse(line: &str) -> Result<Option<Self>, serde_json::Error> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        serde_json::from_str(line).map(Some)
    }
}

/// Feed commands from `reader` to the host until quit or end of input.
///
/// Returns the number of commands forwarded.
pub async fn run_console<R>(reader: R, host: &HostHandle) -> Result<usize, HostError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;

    while let Some(line) = lines.next_line().await? {
        let command = match ConsoleCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, line = %line, "skipping malformed command");
                continue;
            }
        };

        match command {
            ConsoleCommand::AddStructure {
                position,
                decoration,
            } => {
                let id = host
                    .add_structure(Pose::at(position), DecorationIndex(decoration))
                    .await?;
                tracing::info!(structure = %id, "structure added");
            }
            ConsoleCommand::SpawnItem {
                category,
                position,
                fall_delay,
            } => {
                let id = host
                    .spawn_item(Category(category), position, fall_delay)
                    .await?;
                tracing::info!(item = %id, "item spawned");
            }
            ConsoleCommand::Request { from, request } => {
                let origin = from.map_or(Origin::Authority, |p| Origin::Observer(ParticipantId(p)));
                host.submit(origin, request)?;
            }
            ConsoleCommand::Quit => {
                forwarded += 1;
                break;
            }
        }
        forwarded += 1;
    }

    host.shutdown()?;
    Ok(forwarded)
}
