//! Offline test support.
//!
//! [`MockGm`] is a scripted transport: tests queue up replies (or
//! failures) and the session consumes them in order, no network
//! involved. [`TestHarness`] wraps a full session around a mock and a
//! sample hero, with assertion helpers that point at the caller.

use crate::builder::sample_hero;
use crate::character::{Character, Sender};
use crate::session::{ChunkStream, GameSession, GmTransport, SessionConfig, SessionError};
use futures::stream;
use gemini::{FinishReason, Request, StreamChunk};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

type Script = Vec<Result<StreamChunk, gemini::Error>>;

/// A Game Master that replays scripted responses.
#[derive(Clone, Default)]
pub struct MockGm {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl MockGm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply that streams in one piece and stops normally.
    pub fn script(&self, reply: &str) {
        self.script_with_finish(reply, FinishReason::Stop);
    }

    /// Queue a reply with a specific finish reason.
    pub fn script_with_finish(&self, reply: &str, reason: FinishReason) {
        self.script_chunks(vec![
            Ok(StreamChunk {
                text: Some(reply.to_string()),
                finish_reason: None,
                usage: None,
            }),
            Ok(StreamChunk {
                text: None,
                finish_reason: Some(reason),
                usage: None,
            }),
        ]);
    }

    /// Queue a reply that fails partway through streaming.
    pub fn script_stream_error(&self, partial: &str, error: gemini::Error) {
        self.script_chunks(vec![
            Ok(StreamChunk {
                text: Some(partial.to_string()),
                finish_reason: None,
                usage: None,
            }),
            Err(error),
        ]);
    }

    /// Queue raw chunks for full control over the stream shape.
    pub fn script_chunks(&self, chunks: Script) {
        self.scripts.lock().unwrap().push_back(chunks);
    }

    /// Every request the session has sent, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<Request> {
        self.requests.lock().unwrap().last().cloned()
    }

    /// Scripts queued but not yet consumed.
    pub fn remaining_scripts(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }
}

impl GmTransport for MockGm {
    fn stream_turn(
        &self,
        request: Request,
    ) -> impl std::future::Future<Output = Result<ChunkStream, gemini::Error>> + Send {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockGm ran out of scripted replies");
        async move { Ok(Box::pin(stream::iter(script)) as ChunkStream) }
    }
}

/// A full session wired to a [`MockGm`], plus assertion helpers.
pub struct TestHarness {
    pub gm: MockGm,
    pub session: GameSession<MockGm>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_character(sample_hero())
    }

    pub fn with_character(character: Character) -> Self {
        Self::with_config(character, SessionConfig::default())
    }

    pub fn with_config(character: Character, config: SessionConfig) -> Self {
        let gm = MockGm::new();
        let session = GameSession::new(gm.clone(), character, config);
        Self { gm, session }
    }

    /// Script a reply, send a player message, and settle the turn.
    pub async fn exchange(&mut self, player: &str, gm_reply: &str) -> Result<(), SessionError> {
        self.gm.script(gm_reply);
        self.session.send(player, |_| {}).await
    }

    #[track_caller]
    pub fn assert_last_gm_contains(&self, needle: &str) {
        let last = self
            .session
            .turns()
            .iter()
            .rev()
            .find(|t| t.sender == Sender::Gm)
            .expect("no GM turn in the log");
        assert!(
            last.text.contains(needle),
            "last GM turn {:?} does not contain {needle:?}",
            last.text
        );
    }

    #[track_caller]
    pub fn assert_system_note_contains(&self, needle: &str) {
        assert!(
            self.session
                .turns()
                .iter()
                .any(|t| t.sender == Sender::System && t.text.contains(needle)),
            "no system note contains {needle:?}"
        );
    }

    #[track_caller]
    pub fn assert_xp(&self, expected: u32) {
        assert_eq!(
            self.session.character().xp,
            expected,
            "unexpected XP total"
        );
    }

    #[track_caller]
    pub fn assert_hp(&self, hp: i32, max_hp: i32) {
        let character = self.session.character();
        assert_eq!((character.hp, character.max_hp), (hp, max_hp), "unexpected vitals");
    }

    #[track_caller]
    pub fn assert_item_quantity(&self, name: &str, expected: u32) {
        assert_eq!(
            self.session.character().item_quantity(name),
            expected,
            "unexpected quantity of {name:?}"
        );
    }

    #[track_caller]
    pub fn assert_input_unlocked(&self) {
        assert!(!self.session.input_locked(), "input should be unlocked");
    }

    #[track_caller]
    pub fn assert_input_locked(&self) {
        assert!(self.session.input_locked(), "input should be locked");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
