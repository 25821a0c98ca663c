//! Session orchestration.
//!
//! [`GameSession`] drives the full turn loop: player input goes out as
//! a chat request, the streamed reply is displayed live (with command
//! syntax stripped), the finalized reply is reconciled into game
//! state, and the chat session is rebuilt so the model's next system
//! instruction reflects that state.
//!
//! Each turn moves through an explicit phase machine:
//! `Idle -> Streaming -> Reconciling -> SessionRebuild -> Idle`, with
//! a detour through `AutoRegenerate` when an auto-initiated turn comes
//! back truncated. Player input is gated while a turn is in flight, a
//! dice roll is unresolved, or a level-up is unclaimed.

use crate::character::{unix_now, Character, ConversationTurn, Sender};
use crate::command::{self, extract_commands};
use crate::dice::{self, RollReport, RollRequest};
use crate::persist::{AutosaveStatus, PersistError, SaveSlot, SavedGame};
use crate::progression::{
    self, AbilityCandidate, LevelUpChoice, PendingLevelUp, ProgressionError,
};
use crate::prompt;
use crate::reconcile::{self, StateSnapshot};
use futures::{Stream, StreamExt};
use gemini::{Content, FinishReason, Gemini, Request, Role, StreamChunk, Usage};
use rand::Rng;
use std::pin::Pin;
use thiserror::Error;
use tracing::{debug, warn};

/// Truncated/safety-stopped auto-initiated turns are retried at most
/// this many times before giving up with a system note.
pub const MAX_AUTO_RETRIES: u32 = 3;

/// How many recent conversation turns are replayed into a rebuilt
/// chat. Older turns fall out of the model's context window.
pub const MAX_REPLAYED_TURNS: usize = 40;

/// Sent as the first user content when a session has no player turn to
/// open with (a brand-new game, or a replay window that starts on a
/// model turn).
const OPENING_PROMPT: &str =
    "Begin the adventure. Set the opening scene and introduce my character to the world.";

/// The stream type every transport produces.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, gemini::Error>> + Send>>;

/// How the session talks to the Game Master model. Implemented by
/// [`gemini::Gemini`] for real play and by the mock transport in
/// [`crate::testing`] for offline tests.
pub trait GmTransport {
    fn stream_turn(
        &self,
        request: Request,
    ) -> impl std::future::Future<Output = Result<ChunkStream, gemini::Error>> + Send;
}

impl GmTransport for Gemini {
    fn stream_turn(
        &self,
        request: Request,
    ) -> impl std::future::Future<Output = Result<ChunkStream, gemini::Error>> + Send {
        self.stream(request)
    }
}

/// Where the per-turn state machine currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Streaming,
    Reconciling,
    SessionRebuild,
    AutoRegenerate,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a turn is already in progress")]
    Busy,

    #[error("a dice roll must be resolved first")]
    RollPending,

    #[error("a level-up must be resolved first")]
    LevelUpPending,

    #[error("no dice roll is pending")]
    NoRollPending,

    #[error("no level-up has been offered")]
    NoLevelUpOffered,

    #[error("one of the offered abilities must be chosen")]
    AbilityChoiceRequired,

    #[error("the chosen ability was not among those offered")]
    UnknownAbilityChoice,

    #[error("no model turn to regenerate")]
    NothingToRegenerate,

    #[error(transparent)]
    Gm(#[from] gemini::Error),

    #[error(transparent)]
    Progression(#[from] ProgressionError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_output_tokens: usize,
    pub temperature: f32,
    pub max_replayed_turns: usize,
    /// When set, the session autosaves after each settled turn.
    pub save_slot: Option<SaveSlot>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 2048,
            temperature: 1.0,
            max_replayed_turns: MAX_REPLAYED_TURNS,
            save_slot: None,
        }
    }
}

impl SessionConfig {
    pub fn with_save_slot(mut self, slot: SaveSlot) -> Self {
        self.save_slot = Some(slot);
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: usize) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    pub fn with_max_replayed_turns(mut self, turns: usize) -> Self {
        self.max_replayed_turns = turns;
        self
    }
}

/// The chat the model sees: a system instruction built from current
/// character state plus a replay of recent dialogue. Recreated after
/// every settled turn; that recreation is how state reaches the model.
struct ChatSession {
    system_instruction: String,
    history: Vec<Content>,
}

impl ChatSession {
    fn rebuild(character: &Character, turns: &[ConversationTurn], max_replayed: usize) -> Self {
        let replayable: Vec<&ConversationTurn> = turns
            .iter()
            .filter(|t| t.sender != Sender::System && !t.text.is_empty())
            .collect();
        let window = replayable.len().saturating_sub(max_replayed);

        let mut history: Vec<Content> = replayable[window..]
            .iter()
            .map(|turn| match turn.sender {
                Sender::Player => Content::user(&turn.text),
                _ => Content::model(&turn.text),
            })
            .collect();

        // The API wants dialogue to open with a user content.
        if history.first().map(|c| c.role) == Some(Role::Model) {
            history.insert(0, Content::user(OPENING_PROMPT));
        }

        Self {
            system_instruction: prompt::system_instruction(character),
            history,
        }
    }

    fn request(&self, message: &str, config: &SessionConfig) -> Request {
        let mut contents = self.history.clone();
        contents.push(Content::user(message));
        Request::new(contents)
            .with_system_instruction(self.system_instruction.clone())
            .with_max_output_tokens(config.max_output_tokens)
            .with_temperature(config.temperature)
    }
}

/// What one consumed stream produced.
pub struct StreamedTurn {
    /// Raw accumulated text, command syntax included.
    pub raw: String,
    pub finish_reason: FinishReason,
    pub usage: Option<Usage>,
    /// A mid-stream failure; the text above is what arrived before it.
    pub error: Option<gemini::Error>,
}

/// Fold a chunk stream into a finished turn, invoking `on_display`
/// with freshly stripped display text as chunks arrive.
pub async fn consume_stream<S>(mut stream: S, mut on_display: impl FnMut(&str)) -> StreamedTurn
where
    S: Stream<Item = Result<StreamChunk, gemini::Error>> + Unpin,
{
    let mut raw = String::new();
    let mut finish_reason = FinishReason::Stop;
    let mut usage = None;
    let mut error = None;

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => {
                if let Some(text) = chunk.text {
                    raw.push_str(&text);
                    on_display(&command::strip_for_display(&raw));
                }
                if let Some(reason) = chunk.finish_reason {
                    finish_reason = reason;
                }
                if let Some(chunk_usage) = chunk.usage {
                    usage = Some(chunk_usage);
                }
            }
            Err(e) => {
                error = Some(e);
                break;
            }
        }
    }

    StreamedTurn {
        raw,
        finish_reason,
        usage,
        error,
    }
}

/// A running game: dialogue log, game state, chat session, and the
/// pending interactions that gate player input.
pub struct GameSession<T: GmTransport = Gemini> {
    client: T,
    config: SessionConfig,
    snapshot: StateSnapshot,
    turns: Vec<ConversationTurn>,
    chat: ChatSession,
    phase: TurnPhase,
    pending_roll: Option<RollRequest>,
    pending_level_up: Option<PendingLevelUp>,
    forced_level_up: bool,
    auto_retries: u32,
    autosave_status: AutosaveStatus,
    last_usage: Option<Usage>,
}

impl<T: GmTransport> GameSession<T> {
    /// A fresh game for a newly created character.
    pub fn new(client: T, character: Character, config: SessionConfig) -> Self {
        let snapshot = StateSnapshot::new(character);
        let chat = ChatSession::rebuild(&snapshot.character, &[], config.max_replayed_turns);
        Self {
            client,
            config,
            snapshot,
            turns: Vec::new(),
            chat,
            phase: TurnPhase::Idle,
            pending_roll: None,
            pending_level_up: None,
            forced_level_up: false,
            auto_retries: 0,
            autosave_status: AutosaveStatus::Idle,
            last_usage: None,
        }
    }

    /// Resume a saved game.
    pub fn resume(client: T, saved: SavedGame, config: SessionConfig) -> Self {
        let snapshot = saved.snapshot();
        let chat = ChatSession::rebuild(&snapshot.character, &saved.turns, config.max_replayed_turns);
        Self {
            client,
            config,
            snapshot,
            turns: saved.turns,
            chat,
            phase: TurnPhase::Idle,
            pending_roll: None,
            pending_level_up: None,
            forced_level_up: false,
            auto_retries: 0,
            autosave_status: AutosaveStatus::Idle,
            last_usage: None,
        }
    }

    pub fn character(&self) -> &Character {
        &self.snapshot.character
    }

    pub fn snapshot(&self) -> &StateSnapshot {
        &self.snapshot
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn pending_roll(&self) -> Option<&RollRequest> {
        self.pending_roll.as_ref()
    }

    pub fn pending_level_up(&self) -> Option<&PendingLevelUp> {
        self.pending_level_up.as_ref()
    }

    pub fn autosave_status(&self) -> &AutosaveStatus {
        &self.autosave_status
    }

    /// Token usage reported on the most recent turn, if any.
    pub fn last_usage(&self) -> Option<Usage> {
        self.last_usage
    }

    /// Auto-regeneration attempts taken on the turn in flight (or the
    /// most recently finished one). Display layers can surface this as
    /// a retry counter.
    pub fn auto_retries(&self) -> u32 {
        self.auto_retries
    }

    /// A level-up can be started: either enough experience is banked,
    /// or the narration called for one directly.
    pub fn level_up_available(&self) -> bool {
        progression::ready_to_level(&self.snapshot.character) || self.forced_level_up
    }

    /// Whether free-text player input is currently accepted.
    pub fn input_locked(&self) -> bool {
        self.phase != TurnPhase::Idle
            || self.pending_roll.is_some()
            || self.pending_level_up.is_some()
            || self.level_up_available()
    }

    /// Open a brand-new game: the model narrates the first scene.
    pub async fn begin(&mut self, on_display: impl FnMut(&str)) -> Result<(), SessionError> {
        if self.phase != TurnPhase::Idle {
            return Err(SessionError::Busy);
        }
        let mut on_display = on_display;
        self.run_turn(OPENING_PROMPT, true, &mut on_display).await
    }

    /// Send a player message through the full turn pipeline.
    pub async fn send(
        &mut self,
        text: &str,
        on_display: impl FnMut(&str),
    ) -> Result<(), SessionError> {
        if self.phase != TurnPhase::Idle {
            return Err(SessionError::Busy);
        }
        if self.pending_roll.is_some() {
            return Err(SessionError::RollPending);
        }
        if self.pending_level_up.is_some() || self.level_up_available() {
            return Err(SessionError::LevelUpPending);
        }

        self.turns.push(ConversationTurn::player(text));
        let mut on_display = on_display;
        self.run_turn(text, false, &mut on_display).await
    }

    /// Resolve the pending dice request and send the results back as a
    /// synthetic player turn.
    pub async fn resolve_roll(
        &mut self,
        on_display: impl FnMut(&str),
    ) -> Result<RollReport, SessionError> {
        self.resolve_roll_with_rng(&mut rand::thread_rng(), on_display)
            .await
    }

    /// Resolve with a specific RNG (useful for testing).
    pub async fn resolve_roll_with_rng<R: Rng>(
        &mut self,
        rng: &mut R,
        on_display: impl FnMut(&str),
    ) -> Result<RollReport, SessionError> {
        if self.phase != TurnPhase::Idle {
            return Err(SessionError::Busy);
        }
        let request = self.pending_roll.take().ok_or(SessionError::NoRollPending)?;
        let report = dice::resolve_roll_with_rng(&request, &self.snapshot.character.ability_scores, rng);
        self.snapshot.last_resolved_roll_id = Some(report.id.clone());

        let message = report.player_message();
        self.turns.push(ConversationTurn::player(&message));
        let mut on_display = on_display;
        self.run_turn(&message, true, &mut on_display).await?;
        Ok(report)
    }

    /// Offer the available level-up with the given ability candidates
    /// (usually from [`crate::suggest::suggest_abilities`]).
    pub fn begin_level_up(
        &mut self,
        candidates: Vec<AbilityCandidate>,
    ) -> Result<&PendingLevelUp, SessionError> {
        if self.phase != TurnPhase::Idle {
            return Err(SessionError::Busy);
        }
        if !self.level_up_available() {
            return Err(SessionError::NoLevelUpOffered);
        }
        // A signal-only level-up (no banked experience) takes the
        // forced apply path, which debits experience floored at zero.
        let forced = !progression::ready_to_level(&self.snapshot.character);
        self.pending_level_up = Some(PendingLevelUp {
            new_level: self.snapshot.character.level + 1,
            candidates,
            forced,
        });
        Ok(self.pending_level_up.as_ref().unwrap())
    }

    /// Debug path: offer a level-up regardless of banked experience.
    pub fn force_level_up(
        &mut self,
        candidates: Vec<AbilityCandidate>,
    ) -> Result<&PendingLevelUp, SessionError> {
        if self.phase != TurnPhase::Idle {
            return Err(SessionError::Busy);
        }
        self.pending_level_up = Some(PendingLevelUp {
            new_level: self.snapshot.character.level + 1,
            candidates,
            forced: true,
        });
        Ok(self.pending_level_up.as_ref().unwrap())
    }

    /// Confirm the offered level-up with the player's picks.
    ///
    /// An ability pick is required exactly when candidates were
    /// offered, and must be one of them. Chained level-ups (leftover
    /// experience crossing the next threshold) leave the session
    /// level-up-available again rather than applying silently.
    pub async fn confirm_level_up(
        &mut self,
        choice: LevelUpChoice,
    ) -> Result<(), SessionError> {
        if self.phase != TurnPhase::Idle {
            return Err(SessionError::Busy);
        }
        let pending = self
            .pending_level_up
            .as_ref()
            .ok_or(SessionError::NoLevelUpOffered)?;

        match &choice.ability {
            None if !pending.candidates.is_empty() => {
                return Err(SessionError::AbilityChoiceRequired);
            }
            Some(picked) if !pending.candidates.contains(picked) => {
                return Err(SessionError::UnknownAbilityChoice);
            }
            _ => {}
        }

        let result = if pending.forced {
            progression::force_apply_level_up(&mut self.snapshot.character, &choice)?
        } else {
            progression::apply_level_up(&mut self.snapshot.character, &choice)?
        };
        self.pending_level_up = None;
        self.forced_level_up = false;

        let mut note = format!(
            "{} reached level {}! Max HP is now {}.",
            self.snapshot.character.name, result.new_level, self.snapshot.character.max_hp
        );
        if let Some(ability) = &choice.ability {
            note.push_str(&format!(" Learned: {}.", ability.name));
        }
        self.turns.push(ConversationTurn::system(note));

        self.rebuild_chat();
        self.autosave().await;
        Ok(())
    }

    /// Throw away the latest model turn and regenerate it from the
    /// player turn that prompted it. Rejected while a turn is in
    /// flight.
    pub async fn regenerate_last(
        &mut self,
        on_display: impl FnMut(&str),
    ) -> Result<(), SessionError> {
        if self.phase != TurnPhase::Idle {
            return Err(SessionError::Busy);
        }
        let gm_index = self
            .turns
            .iter()
            .rposition(|t| t.sender == Sender::Gm)
            .ok_or(SessionError::NothingToRegenerate)?;
        let player_index = self.turns[..gm_index]
            .iter()
            .rposition(|t| t.sender == Sender::Player)
            .ok_or(SessionError::NothingToRegenerate)?;
        let player_text = self.turns[player_index].text.clone();

        // Drop the model turn and everything after it; the prompting
        // player turn stays in the log but out of the replayed history
        // so it is not sent twice.
        self.turns.truncate(gm_index);
        self.chat = ChatSession::rebuild(
            &self.snapshot.character,
            &self.turns[..player_index],
            self.config.max_replayed_turns,
        );
        self.pending_roll = None;
        self.forced_level_up = false;

        let mut on_display = on_display;
        self.run_turn(&player_text, false, &mut on_display).await
    }

    /// Save immediately, regardless of autosave configuration.
    pub async fn save_to(&self, slot: &SaveSlot) -> Result<(), SessionError> {
        slot.save(&SavedGame::capture(&self.snapshot, &self.turns))
            .await?;
        Ok(())
    }

    async fn run_turn(
        &mut self,
        message: &str,
        auto: bool,
        on_display: &mut impl FnMut(&str),
    ) -> Result<(), SessionError> {
        self.auto_retries = 0;

        let streamed = loop {
            self.phase = TurnPhase::Streaming;
            self.turns.push(ConversationTurn::gm_streaming());

            let request = self.chat.request(message, &self.config);
            let stream = match self.client.stream_turn(request).await {
                Ok(stream) => stream,
                Err(e) => {
                    self.turns.pop();
                    self.turns.push(ConversationTurn::system(
                        "The storyteller could not be reached. Try again in a moment.",
                    ));
                    self.phase = TurnPhase::Idle;
                    return Err(e.into());
                }
            };
            let streamed = consume_stream(stream, &mut *on_display).await;

            if let Some(e) = streamed.error {
                // Keep what arrived, marked interrupted, so the player
                // can read it and regenerate.
                let turn = self.turns.last_mut().expect("streaming turn present");
                turn.text = command::strip_for_display(&streamed.raw);
                turn.streaming = false;
                turn.interrupted = true;
                self.turns.push(ConversationTurn::system(
                    "The storyteller was cut off mid-sentence. You can regenerate the last response.",
                ));
                self.phase = TurnPhase::Idle;
                return Err(e.into());
            }

            if streamed.finish_reason.is_interrupted() && auto && self.auto_retries < MAX_AUTO_RETRIES
            {
                self.auto_retries += 1;
                warn!(
                    reason = ?streamed.finish_reason,
                    retries = self.auto_retries,
                    "auto-regenerating interrupted turn"
                );
                self.turns.pop();
                self.phase = TurnPhase::AutoRegenerate;
                continue;
            }

            break streamed;
        };

        self.phase = TurnPhase::Reconciling;
        let extraction = extract_commands(&streamed.raw);
        debug!(
            commands = extraction.commands.len(),
            finish = ?streamed.finish_reason,
            "turn finalized"
        );

        let interrupted = streamed.finish_reason.is_interrupted();
        {
            let turn = self.turns.last_mut().expect("streaming turn present");
            turn.text = extraction.text.clone();
            turn.streaming = false;
            turn.interrupted = interrupted;
        }
        self.last_usage = streamed.usage;

        let outcome = reconcile::reconcile(&self.snapshot, &extraction.commands);
        self.snapshot = outcome.snapshot;
        self.pending_roll = outcome.pending_roll;
        if outcome.level_up_signaled && !progression::ready_to_level(&self.snapshot.character) {
            self.forced_level_up = true;
        }
        for event in &outcome.events {
            self.turns.push(ConversationTurn::system(event.message()));
        }
        if interrupted {
            self.turns.push(ConversationTurn::system(
                "The story was cut short. You can regenerate the last response.",
            ));
        }

        self.phase = TurnPhase::SessionRebuild;
        self.rebuild_chat();
        self.phase = TurnPhase::Idle;

        if self.pending_roll.is_none() && self.pending_level_up.is_none() && !self.forced_level_up {
            self.autosave().await;
        }
        Ok(())
    }

    fn rebuild_chat(&mut self) {
        self.chat = ChatSession::rebuild(
            &self.snapshot.character,
            &self.turns,
            self.config.max_replayed_turns,
        );
    }

    async fn autosave(&mut self) {
        let Some(slot) = self.config.save_slot.clone() else {
            return;
        };
        self.autosave_status = AutosaveStatus::Saving;
        let saved = SavedGame::capture(&self.snapshot, &self.turns);
        match slot.save(&saved).await {
            Ok(()) => {
                self.autosave_status = AutosaveStatus::Saved(unix_now());
            }
            Err(e) => {
                warn!(%e, "autosave failed");
                self.autosave_status = AutosaveStatus::Failed(e.to_string());
            }
        }
    }
}
