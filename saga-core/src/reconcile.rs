//! State reconciliation.
//!
//! Applies a finalized turn's extracted commands to a snapshot of the
//! game state. The engine is pure: snapshot in, snapshot out, no clock
//! or RNG, so a replayed turn always reconciles to the same state.
//!
//! Commands apply in extraction order. A command that cannot apply
//! (consuming more of an item than is held, a duplicate dice request)
//! is skipped with a log line; it never poisons the rest of the turn.

use crate::character::{Character, FocusTarget};
use crate::command::Command;
use crate::dice::RollRequest;
use crate::progression;
use tracing::warn;

/// Everything the reconciliation engine reads and writes.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub character: Character,
    pub focus: Option<FocusTarget>,
    /// Id of the most recently resolved dice request. A re-emitted
    /// request with this id is a replay artifact, not a new roll.
    pub last_resolved_roll_id: Option<String>,
}

impl StateSnapshot {
    pub fn new(character: Character) -> Self {
        Self {
            character,
            focus: None,
            last_resolved_roll_id: None,
        }
    }
}

/// A player-visible notice produced while reconciling.
#[derive(Debug, Clone, PartialEq)]
pub enum NarrationEvent {
    XpAwarded { amount: u32, reason: String },
    ItemAwarded { name: String, quantity: u32 },
    ItemConsumed { name: String, quantity: u32 },
    HpChanged { hp: i32, max_hp: i32 },
    LevelUpSignaled { reason: String },
}

impl NarrationEvent {
    /// Short system-line phrasing for the conversation log.
    pub fn message(&self) -> String {
        match self {
            NarrationEvent::XpAwarded { amount, reason } if reason.is_empty() => {
                format!("Gained {amount} XP.")
            }
            NarrationEvent::XpAwarded { amount, reason } => {
                format!("Gained {amount} XP: {reason}")
            }
            NarrationEvent::ItemAwarded { name, quantity } => {
                format!("Received {quantity}x {name}.")
            }
            NarrationEvent::ItemConsumed { name, quantity } => {
                format!("Used {quantity}x {name}.")
            }
            NarrationEvent::HpChanged { hp, max_hp } => format!("HP is now {hp}/{max_hp}."),
            NarrationEvent::LevelUpSignaled { reason } if reason.is_empty() => {
                "Ready to level up!".to_string()
            }
            NarrationEvent::LevelUpSignaled { reason } => {
                format!("Ready to level up! {reason}")
            }
        }
    }
}

/// The result of reconciling one turn.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub snapshot: StateSnapshot,
    /// A fresh dice request that must be resolved before play continues.
    pub pending_roll: Option<RollRequest>,
    /// The model explicitly signaled a level-up this turn.
    pub level_up_signaled: bool,
    pub events: Vec<NarrationEvent>,
}

impl ReconcileOutcome {
    /// Banked experience crosses the current threshold, whether or not
    /// the model said so.
    pub fn level_up_ready(&self) -> bool {
        progression::ready_to_level(&self.snapshot.character)
    }
}

/// Apply one turn's commands to a snapshot.
pub fn reconcile(snapshot: &StateSnapshot, commands: &[Command]) -> ReconcileOutcome {
    let mut next = snapshot.clone();
    let mut pending_roll = None;
    let mut level_up_signaled = false;
    let mut events = Vec::new();

    for command in commands {
        match command {
            Command::FocusUpdate(focus) => {
                next.focus = focus.clone();
            }
            Command::StatusUpdate(statuses) => {
                next.character.statuses = statuses.clone();
            }
            Command::DiceRoll(request) => {
                if next.last_resolved_roll_id.as_deref() == Some(request.id.as_str()) {
                    warn!(roll_id = %request.id, "suppressing already-resolved dice request");
                } else if pending_roll.is_some() {
                    warn!(roll_id = %request.id, "ignoring second dice request in one turn");
                } else {
                    pending_roll = Some(request.clone());
                }
            }
            Command::HpUpdate { hp, max_hp } => {
                let max_hp = (*max_hp).max(1);
                let hp = (*hp).clamp(0, max_hp);
                next.character.hp = hp;
                next.character.max_hp = max_hp;
                events.push(NarrationEvent::HpChanged { hp, max_hp });
            }
            Command::AwardXp { amount, reason } => {
                next.character.xp = next.character.xp.saturating_add(*amount);
                events.push(NarrationEvent::XpAwarded {
                    amount: *amount,
                    reason: reason.clone(),
                });
            }
            Command::AwardItem(item) => {
                award_item(&mut next.character, item);
                events.push(NarrationEvent::ItemAwarded {
                    name: item.name.clone(),
                    quantity: item.quantity,
                });
            }
            Command::ConsumeItem { name, quantity } => {
                if consume_item(&mut next.character, name, *quantity) {
                    events.push(NarrationEvent::ItemConsumed {
                        name: name.clone(),
                        quantity: *quantity,
                    });
                } else {
                    warn!(item = %name, quantity, "skipping consume of more than is held");
                }
            }
            Command::LevelUp { reason } => {
                level_up_signaled = true;
                events.push(NarrationEvent::LevelUpSignaled {
                    reason: reason.clone(),
                });
            }
        }
    }

    next.character.xp_to_next = progression::xp_to_next(next.character.level);

    ReconcileOutcome {
        snapshot: next,
        pending_roll,
        level_up_signaled,
        events,
    }
}

fn award_item(character: &mut Character, item: &crate::character::InventoryItem) {
    if item.kind.is_stackable() {
        if let Some(held) = character
            .inventory
            .iter_mut()
            .find(|held| held.name == item.name && held.kind == item.kind)
        {
            held.quantity = held.quantity.saturating_add(item.quantity);
            if held.description.is_empty() && !item.description.is_empty() {
                held.description = item.description.clone();
            }
            return;
        }
    }
    character.inventory.push(item.clone());
}

/// Remove `quantity` of a named item, oldest entries first. Returns
/// false (and changes nothing) if less than that is held in total.
fn consume_item(character: &mut Character, name: &str, quantity: u32) -> bool {
    if character.item_quantity(name) < quantity {
        return false;
    }
    let mut remaining = quantity;
    for held in character.inventory.iter_mut() {
        if held.name != name || remaining == 0 {
            continue;
        }
        let taken = held.quantity.min(remaining);
        held.quantity -= taken;
        remaining -= taken;
    }
    character.inventory.retain(|held| held.quantity > 0);
    true
}
