//! Core game state: the player character, inventory, focus target,
//! and the conversation log.
//!
//! Everything here is plain serializable data. Mutation happens in the
//! reconciliation and progression engines; this module only defines the
//! shapes and the small derived computations (ability modifiers, item
//! stacking rules).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lowest an ability score can be pushed by racial/class modifiers.
pub const MIN_ABILITY_SCORE: i32 = 3;

/// The break-even ability score (modifier 0).
pub const BASELINE_ABILITY_SCORE: i32 = 10;

// ============================================================================
// Abilities
// ============================================================================

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn name(&self) -> &'static str {
        match self {
            Ability::Strength => "Strength",
            Ability::Dexterity => "Dexterity",
            Ability::Constitution => "Constitution",
            Ability::Intelligence => "Intelligence",
            Ability::Wisdom => "Wisdom",
            Ability::Charisma => "Charisma",
        }
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Ability scores container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
}

impl AbilityScores {
    pub fn new(str: i32, dex: i32, con: i32, int: i32, wis: i32, cha: i32) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    pub fn get(&self, ability: Ability) -> i32 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn set(&mut self, ability: Ability, value: i32) {
        match ability {
            Ability::Strength => self.strength = value,
            Ability::Dexterity => self.dexterity = value,
            Ability::Constitution => self.constitution = value,
            Ability::Intelligence => self.intelligence = value,
            Ability::Wisdom => self.wisdom = value,
            Ability::Charisma => self.charisma = value,
        }
    }

    /// The derived modifier for an ability.
    ///
    /// Floor division handles scores below the baseline: 8-9 = -1,
    /// 10-11 = 0, 12-13 = +1, and so on.
    pub fn modifier(&self, ability: Ability) -> i32 {
        (self.get(ability) - BASELINE_ABILITY_SCORE).div_euclid(2)
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

// ============================================================================
// Race and class
// ============================================================================

/// A single ability-score modifier granted by a race or class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AbilityModifier {
    pub ability: Ability,
    pub amount: i32,
}

impl AbilityModifier {
    pub fn new(ability: Ability, amount: i32) -> Self {
        Self { ability, amount }
    }
}

/// A playable race: a named bundle of ability-score modifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Race {
    pub name: String,
    pub description: String,
    pub modifiers: Vec<AbilityModifier>,
}

impl Race {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            modifiers: Vec::new(),
        }
    }

    pub fn with_modifier(mut self, ability: Ability, amount: i32) -> Self {
        self.modifiers.push(AbilityModifier::new(ability, amount));
        self
    }

    /// The built-in races offered by the character creator.
    pub fn presets() -> Vec<Race> {
        use Ability::*;
        vec![
            Race::new("Human", "Adaptable and ambitious, at home anywhere.")
                .with_modifier(Charisma, 1)
                .with_modifier(Constitution, 1),
            Race::new("Elf", "Graceful and long-lived, attuned to old magic.")
                .with_modifier(Dexterity, 2)
                .with_modifier(Intelligence, 1)
                .with_modifier(Constitution, -1),
            Race::new("Dwarf", "Stout mountain folk with long memories.")
                .with_modifier(Constitution, 2)
                .with_modifier(Strength, 1)
                .with_modifier(Charisma, -1),
            Race::new("Orc", "Fierce and proud, forged by a hard land.")
                .with_modifier(Strength, 2)
                .with_modifier(Constitution, 1)
                .with_modifier(Intelligence, -1),
        ]
    }
}

/// A character class: a named bundle of ability-score modifiers plus
/// the abilities it starts with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Class {
    pub name: String,
    pub description: String,
    pub modifiers: Vec<AbilityModifier>,
    pub starting_abilities: Vec<LearnedAbility>,
}

impl Class {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            modifiers: Vec::new(),
            starting_abilities: Vec::new(),
        }
    }

    pub fn with_modifier(mut self, ability: Ability, amount: i32) -> Self {
        self.modifiers.push(AbilityModifier::new(ability, amount));
        self
    }

    pub fn with_starting_ability(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.starting_abilities.push(LearnedAbility {
            name: name.into(),
            description: description.into(),
        });
        self
    }

    /// The built-in classes offered by the character creator.
    pub fn presets() -> Vec<Class> {
        use Ability::*;
        vec![
            Class::new("Warrior", "Front-line fighter who solves problems with steel.")
                .with_modifier(Strength, 2)
                .with_modifier(Constitution, 1)
                .with_starting_ability("Power Strike", "A heavy blow that staggers a foe."),
            Class::new("Rogue", "Shadow-walker who favors wit over force.")
                .with_modifier(Dexterity, 2)
                .with_modifier(Charisma, 1)
                .with_starting_ability("Sleight of Hand", "Lift, palm, or plant a small object unseen."),
            Class::new("Mage", "Student of the arcane with a dangerous curiosity.")
                .with_modifier(Intelligence, 2)
                .with_modifier(Wisdom, 1)
                .with_starting_ability("Arcane Bolt", "A dart of raw magic that rarely misses."),
            Class::new("Cleric", "Keeper of an oath, channel for something greater.")
                .with_modifier(Wisdom, 2)
                .with_modifier(Constitution, 1)
                .with_starting_ability("Mend Wounds", "Close minor wounds with a touch."),
        ]
    }
}

/// An ability the character has learned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedAbility {
    pub name: String,
    pub description: String,
}

// ============================================================================
// Inventory
// ============================================================================

/// Closed set of item categories.
///
/// The wire format from the model is looser than this set, so common
/// synonyms alias into it (`potion` is a consumable, `weapon` is
/// equipment, and so on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[serde(alias = "potion", alias = "elixir")]
    Consumable,
    #[serde(alias = "gold", alias = "coin")]
    Currency,
    Key,
    #[serde(alias = "drink", alias = "ration")]
    Food,
    #[serde(alias = "miscellaneous")]
    Misc,
    #[serde(alias = "weapon", alias = "armor", alias = "tool")]
    Equipment,
    #[serde(alias = "quest_item")]
    Quest,
    #[serde(alias = "scroll", alias = "tome")]
    Book,
}

impl ItemKind {
    /// True when same-named items of this kind merge into one stack.
    /// Equipment, quest items, and books are each a distinct entry.
    pub fn is_stackable(&self) -> bool {
        match self {
            ItemKind::Consumable
            | ItemKind::Currency
            | ItemKind::Key
            | ItemKind::Food
            | ItemKind::Misc => true,
            ItemKind::Equipment | ItemKind::Quest | ItemKind::Book => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ItemKind::Consumable => "consumable",
            ItemKind::Currency => "currency",
            ItemKind::Key => "key",
            ItemKind::Food => "food",
            ItemKind::Misc => "misc",
            ItemKind::Equipment => "equipment",
            ItemKind::Quest => "quest",
            ItemKind::Book => "book",
        }
    }
}

/// One inventory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub quantity: u32,
}

impl InventoryItem {
    pub fn new(name: impl Into<String>, kind: ItemKind, quantity: u32) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind,
            quantity,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

// ============================================================================
// Focus target
// ============================================================================

/// The entity the narrative currently foregrounds.
///
/// Replaced wholesale or cleared on every model turn; it has no
/// identity beyond "current value".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusTarget {
    pub name: String,
    #[serde(default)]
    pub hp: Option<i32>,
    #[serde(default)]
    pub max_hp: Option<i32>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

// ============================================================================
// Character
// ============================================================================

/// The player character: the one mutable aggregate of the game.
///
/// Identity and backstory are fixed at creation; everything else is
/// mutated by the reconciliation and progression engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub race: Race,
    pub class: Class,
    pub backstory: String,
    pub world_setting: String,
    pub discovered_elements: Vec<String>,
    pub ability_scores: AbilityScores,
    pub hp: i32,
    pub max_hp: i32,
    pub statuses: Vec<String>,
    pub abilities: Vec<LearnedAbility>,
    pub inventory: Vec<InventoryItem>,
    pub level: u32,
    pub xp: u32,
    /// Experience required for the next level; `None` at max level.
    pub xp_to_next: Option<u32>,
}

impl Character {
    /// Shorthand for the derived modifier of one ability.
    pub fn modifier(&self, ability: Ability) -> i32 {
        self.ability_scores.modifier(ability)
    }

    /// Total quantity held of a named item, across all entries.
    pub fn item_quantity(&self, name: &str) -> u32 {
        self.inventory
            .iter()
            .filter(|i| i.name == name)
            .map(|i| i.quantity)
            .sum()
    }
}

// ============================================================================
// Conversation log
// ============================================================================

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    Player,
    Gm,
    System,
}

/// One entry in the append-only dialogue log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub sender: Sender,
    pub text: String,
    /// Unix seconds at creation.
    pub timestamp: u64,
    /// Generation ended early (length/safety/recitation).
    #[serde(default)]
    pub interrupted: bool,
    /// Still receiving stream chunks.
    #[serde(default)]
    pub streaming: bool,
}

impl ConversationTurn {
    fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            text: text.into(),
            timestamp: unix_now(),
            interrupted: false,
            streaming: false,
        }
    }

    pub fn player(text: impl Into<String>) -> Self {
        Self::new(Sender::Player, text)
    }

    pub fn gm(text: impl Into<String>) -> Self {
        Self::new(Sender::Gm, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Sender::System, text)
    }

    /// A GM turn that is still streaming in.
    pub fn gm_streaming() -> Self {
        let mut turn = Self::new(Sender::Gm, "");
        turn.streaming = true;
        turn
    }
}

/// Current time as unix seconds.
pub fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
