//! Single-slot save persistence.
//!
//! The whole game (character, conversation log, focus) is written as
//! one pretty-printed JSON record behind a versioned envelope. Reads
//! are forgiving: a missing, corrupt, or wrong-version file is treated
//! as "no save", never an error the player has to deal with. Writes go
//! through a temp file and rename so a crash mid-write cannot destroy
//! the previous save.

use crate::character::{Character, ConversationTurn, FocusTarget, unix_now};
use crate::reconcile::StateSnapshot;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Bumped whenever the save format changes incompatibly.
pub const SAVE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("save I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("save serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// The on-disk record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedGame {
    pub version: u32,
    /// Unix seconds at write time.
    pub saved_at: u64,
    pub character: Character,
    pub turns: Vec<ConversationTurn>,
    pub focus: Option<FocusTarget>,
    #[serde(default)]
    pub last_resolved_roll_id: Option<String>,
}

impl SavedGame {
    pub fn capture(snapshot: &StateSnapshot, turns: &[ConversationTurn]) -> Self {
        Self {
            version: SAVE_VERSION,
            saved_at: unix_now(),
            character: snapshot.character.clone(),
            turns: turns.to_vec(),
            focus: snapshot.focus.clone(),
            last_resolved_roll_id: snapshot.last_resolved_roll_id.clone(),
        }
    }

    /// Rebuild the reconciliation snapshot this save captured.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            character: self.character.clone(),
            focus: self.focus.clone(),
            last_resolved_roll_id: self.last_resolved_roll_id.clone(),
        }
    }
}

/// Just enough of the envelope for a "continue game?" display,
/// without deserializing the whole record.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveMetadata {
    pub version: u32,
    pub saved_at: u64,
    pub character: CharacterSummary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CharacterSummary {
    pub name: String,
    pub level: u32,
}

/// Where the autosave machinery currently stands, for a non-blocking
/// indicator in the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutosaveStatus {
    Idle,
    Saving,
    /// Unix seconds of the last successful write.
    Saved(u64),
    Failed(String),
}

/// The game's one save slot.
#[derive(Debug, Clone)]
pub struct SaveSlot {
    path: PathBuf,
}

impl SaveSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the slot with a new record.
    pub async fn save(&self, game: &SavedGame) -> Result<(), PersistError> {
        let json = serde_json::to_string_pretty(game)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Read the slot. Missing, unreadable, corrupt, or wrong-version
    /// saves all read as `None`.
    pub async fn load(&self) -> Option<SavedGame> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), %e, "could not read save");
                return None;
            }
        };
        let game: SavedGame = match serde_json::from_slice(&bytes) {
            Ok(game) => game,
            Err(e) => {
                warn!(path = %self.path.display(), %e, "ignoring corrupt save");
                return None;
            }
        };
        if game.version != SAVE_VERSION {
            warn!(
                found = game.version,
                expected = SAVE_VERSION,
                "ignoring save with unknown version"
            );
            return None;
        }
        Some(game)
    }

    /// Read only the envelope header. Same forgiveness as [`load`].
    ///
    /// [`load`]: SaveSlot::load
    pub async fn peek(&self) -> Option<SaveMetadata> {
        let bytes = tokio::fs::read(&self.path).await.ok()?;
        let metadata: SaveMetadata = serde_json::from_slice(&bytes).ok()?;
        (metadata.version == SAVE_VERSION).then_some(metadata)
    }

    /// Delete the save, if any.
    pub async fn clear(&self) -> Result<(), PersistError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
