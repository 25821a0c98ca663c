//! Command grammar and extractor.
//!
//! The Game Master model embeds semantic commands in its narrative
//! output: a fixed set of line-anchored sigils, each followed by `::`
//! and a flat JSON object or the literal `null`. This module
//! recognizes the eight command forms, validates their payloads, and
//! strips the matched spans so command syntax never leaks into
//! player-visible text.
//!
//! A malformed payload drops that one command (logged) but never
//! aborts extraction of the others, and its span is still stripped.

use crate::character::{FocusTarget, InventoryItem};
use crate::dice::RollRequest;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// The eight command forms, identified by their sigil.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Focus,
    Status,
    DiceRoll,
    Hp,
    AwardXp,
    AwardItem,
    ConsumeItem,
    LevelUp,
}

impl CommandKind {
    /// The literal sigil marking this command in model output.
    pub fn sigil(&self) -> &'static str {
        match self {
            CommandKind::Focus => "FOCUS_TARGET",
            CommandKind::Status => "PLAYER_STATUS",
            CommandKind::DiceRoll => "DICE_ROLL",
            CommandKind::Hp => "PLAYER_HP",
            CommandKind::AwardXp => "AWARD_XP",
            CommandKind::AwardItem => "AWARD_ITEM",
            CommandKind::ConsumeItem => "CONSUME_ITEM",
            CommandKind::LevelUp => "LEVEL_UP",
        }
    }

    pub fn all() -> [CommandKind; 8] {
        [
            CommandKind::Focus,
            CommandKind::Status,
            CommandKind::DiceRoll,
            CommandKind::Hp,
            CommandKind::AwardXp,
            CommandKind::AwardItem,
            CommandKind::ConsumeItem,
            CommandKind::LevelUp,
        ]
    }
}

/// A parsed, validated command.
#[derive(Debug, Clone)]
pub enum Command {
    /// Replace the focus target, or clear it (`null` and `{}` both clear).
    FocusUpdate(Option<FocusTarget>),
    /// Replace the full status-effect list.
    StatusUpdate(Vec<String>),
    /// Activate the dice-roll flow.
    DiceRoll(RollRequest),
    /// Overwrite current and maximum health.
    HpUpdate { hp: i32, max_hp: i32 },
    /// Additive experience award.
    AwardXp { amount: u32, reason: String },
    /// Add an item, merging stackable kinds by name and kind.
    AwardItem(InventoryItem),
    /// Remove a quantity of an item by name.
    ConsumeItem { name: String, quantity: u32 },
    /// The model explicitly signals a level-up.
    LevelUp { reason: String },
}

/// Why a matched command candidate was rejected.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("dice roll must name 1 to 3 abilities, got {0}")]
    BadStatCount(usize),

    #[error("quantity must be positive")]
    NonPositiveQuantity,

    #[error("payload `null` is only valid for a focus update")]
    UnexpectedNull,
}

lazy_static! {
    /// One structural pattern per command form. The payload group is
    /// matched structurally (a flat JSON object or `null`); semantic
    /// validation happens afterward so a malformed payload still
    /// consumes its span.
    static ref COMMAND_PATTERNS: Vec<(CommandKind, Regex)> = CommandKind::all()
        .iter()
        .map(|kind| {
            let pattern = format!(
                r"(?m)^[ \t]*{}::[ \t]*(null|\{{[^{{}}]*\}})[ \t]*\r?$",
                kind.sigil()
            );
            (*kind, Regex::new(&pattern).expect("valid command pattern"))
        })
        .collect();

    /// Any sigil at the start of a line, payload or not. Used to cut a
    /// trailing partial command out of in-progress stream text.
    static ref ANY_SIGIL: Regex = Regex::new(
        r"(?m)^[ \t]*(FOCUS_TARGET|PLAYER_STATUS|DICE_ROLL|PLAYER_HP|AWARD_XP|AWARD_ITEM|CONSUME_ITEM|LEVEL_UP)::"
    )
    .expect("valid sigil pattern");

    static ref BLANK_RUN: Regex = Regex::new(r"\n{3,}").expect("valid blank-run pattern");
}

/// The result of running all eight extraction rules over a text block.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub commands: Vec<Command>,
    pub text: String,
}

/// Extract and strip all commands from finalized model output.
pub fn extract_commands(text: &str) -> Extraction {
    let mut commands = Vec::new();
    let mut cleaned = text.to_string();

    for (kind, pattern) in COMMAND_PATTERNS.iter() {
        let payloads: Vec<String> = pattern
            .captures_iter(&cleaned)
            .map(|caps| caps[1].to_string())
            .collect();

        if payloads.is_empty() {
            continue;
        }

        cleaned = pattern.replace_all(&cleaned, "").into_owned();

        for payload in payloads {
            match parse_payload(*kind, &payload) {
                Ok(command) => commands.push(command),
                Err(e) => {
                    warn!(sigil = kind.sigil(), %e, "dropping malformed command");
                }
            }
        }
    }

    Extraction {
        commands,
        text: tidy(&cleaned),
    }
}

/// Strip command syntax for live display while a stream is still arriving.
///
/// Complete matches are removed like in [`extract_commands`]; a
/// trailing command whose payload is still truncated mid-stream is cut
/// from the first sigil onward so the player never sees raw syntax.
pub fn strip_for_display(text: &str) -> String {
    let mut cleaned = text.to_string();
    for (_, pattern) in COMMAND_PATTERNS.iter() {
        cleaned = pattern.replace_all(&cleaned, "").into_owned();
    }
    if let Some(m) = ANY_SIGIL.find(&cleaned) {
        cleaned.truncate(m.start());
    }
    tidy(&cleaned)
}

fn tidy(text: &str) -> String {
    BLANK_RUN.replace_all(text, "\n\n").trim().to_string()
}

fn parse_payload(kind: CommandKind, payload: &str) -> Result<Command, CommandError> {
    if payload == "null" {
        return if kind == CommandKind::Focus {
            Ok(Command::FocusUpdate(None))
        } else {
            Err(CommandError::UnexpectedNull)
        };
    }

    match kind {
        CommandKind::Focus => {
            let value: serde_json::Value = serde_json::from_str(payload)?;
            let is_empty = value.as_object().map(|o| o.is_empty()).unwrap_or(false);
            if is_empty {
                return Ok(Command::FocusUpdate(None));
            }
            let focus: FocusTarget = serde_json::from_value(value)?;
            Ok(Command::FocusUpdate(Some(focus)))
        }
        CommandKind::Status => {
            #[derive(Deserialize)]
            struct StatusPayload {
                statuses: Vec<String>,
            }
            let parsed: StatusPayload = serde_json::from_str(payload)?;
            Ok(Command::StatusUpdate(parsed.statuses))
        }
        CommandKind::DiceRoll => {
            let request: RollRequest = serde_json::from_str(payload)?;
            if request.stats.is_empty() || request.stats.len() > 3 {
                return Err(CommandError::BadStatCount(request.stats.len()));
            }
            Ok(Command::DiceRoll(request))
        }
        CommandKind::Hp => {
            #[derive(Deserialize)]
            struct HpPayload {
                hp: i32,
                #[serde(rename = "maxHp")]
                max_hp: i32,
            }
            let parsed: HpPayload = serde_json::from_str(payload)?;
            Ok(Command::HpUpdate {
                hp: parsed.hp,
                max_hp: parsed.max_hp,
            })
        }
        CommandKind::AwardXp => {
            #[derive(Deserialize)]
            struct XpPayload {
                amount: u32,
                #[serde(default)]
                reason: String,
            }
            let parsed: XpPayload = serde_json::from_str(payload)?;
            Ok(Command::AwardXp {
                amount: parsed.amount,
                reason: parsed.reason,
            })
        }
        CommandKind::AwardItem => {
            let item: InventoryItem = serde_json::from_str(payload)?;
            if item.quantity == 0 {
                return Err(CommandError::NonPositiveQuantity);
            }
            Ok(Command::AwardItem(item))
        }
        CommandKind::ConsumeItem => {
            #[derive(Deserialize)]
            struct ConsumePayload {
                name: String,
                quantity: u32,
            }
            let parsed: ConsumePayload = serde_json::from_str(payload)?;
            if parsed.quantity == 0 {
                return Err(CommandError::NonPositiveQuantity);
            }
            Ok(Command::ConsumeItem {
                name: parsed.name,
                quantity: parsed.quantity,
            })
        }
        CommandKind::LevelUp => {
            #[derive(Deserialize)]
            struct LevelUpPayload {
                #[serde(default)]
                reason: String,
            }
            let parsed: LevelUpPayload = serde_json::from_str(payload)?;
            Ok(Command::LevelUp {
                reason: parsed.reason,
            })
        }
    }
}
