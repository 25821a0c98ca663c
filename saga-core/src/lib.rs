//! A narrative role-playing game engine driven by a language-model
//! Game Master.
//!
//! The model narrates; this crate referees. Each player message is
//! streamed back as prose carrying embedded state commands (a sigil
//! grammar: `AWARD_XP:: {...}` and friends). The engine strips those
//! commands from the displayed text, reconciles them into the
//! character sheet, resolves any dice the model called for, tracks
//! experience and level-ups, and persists the whole game to a single
//! save slot.
//!
//! The pieces compose as a pipeline:
//!
//! - [`command`] recognizes and strips the sigil grammar;
//! - [`reconcile`] applies extracted commands to an immutable state
//!   snapshot, pure function all the way down;
//! - [`dice`] turns a roll request into d20 results;
//! - [`progression`] handles thresholds and level-up application;
//! - [`session`] orchestrates streaming, reconciliation, chat rebuild,
//!   auto-retry, and input gating;
//! - [`persist`] reads and writes the save slot.
//!
//! [`testing`] provides a scripted transport so all of it runs in
//! tests without a network.

pub mod builder;
pub mod character;
pub mod command;
pub mod dice;
pub mod persist;
pub mod progression;
pub mod prompt;
pub mod reconcile;
pub mod session;
pub mod suggest;
pub mod testing;

pub use builder::{sample_hero, CharacterBuilder};
pub use character::{
    Ability, AbilityScores, Character, Class, ConversationTurn, FocusTarget, InventoryItem,
    ItemKind, Race, Sender,
};
pub use command::{extract_commands, strip_for_display, Command};
pub use dice::{resolve_roll, RollReport, RollRequest};
pub use persist::{AutosaveStatus, SaveSlot, SavedGame};
pub use progression::{AbilityCandidate, LevelUpChoice, PendingLevelUp};
pub use reconcile::{reconcile, NarrationEvent, ReconcileOutcome, StateSnapshot};
pub use session::{GameSession, GmTransport, SessionConfig, SessionError, TurnPhase};
