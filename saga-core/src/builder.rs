//! Character builder for the creation flow.
//!
//! Applies the race and class modifier bundles to a base score block,
//! enforces the ability-score floor, and derives starting vitals and
//! progression fields.

use crate::character::{
    AbilityScores, Character, Class, InventoryItem, Race, MIN_ABILITY_SCORE,
};
use crate::progression;
use thiserror::Error;

/// Base maximum health before the Constitution modifier.
pub const STARTING_HP_BASE: i32 = 18;

/// Error from character building.
#[derive(Debug, Clone, Error)]
pub enum BuilderError {
    #[error("Character name is required")]
    MissingName,

    #[error("Race selection is required")]
    MissingRace,

    #[error("Class selection is required")]
    MissingClass,
}

/// Builder for creating characters.
#[derive(Debug, Clone, Default)]
pub struct CharacterBuilder {
    name: Option<String>,
    race: Option<Race>,
    class: Option<Class>,
    backstory: Option<String>,
    world_setting: Option<String>,
    base_scores: Option<AbilityScores>,
    starting_inventory: Vec<InventoryItem>,
}

impl CharacterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the character's name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the character's race.
    pub fn race(mut self, race: Race) -> Self {
        self.race = Some(race);
        self
    }

    /// Set the character's class.
    pub fn class(mut self, class: Class) -> Self {
        self.class = Some(class);
        self
    }

    /// Set the character's backstory.
    pub fn backstory(mut self, backstory: impl Into<String>) -> Self {
        self.backstory = Some(backstory.into());
        self
    }

    /// Set the world-setting text the Game Master narrates within.
    pub fn world_setting(mut self, setting: impl Into<String>) -> Self {
        self.world_setting = Some(setting.into());
        self
    }

    /// Set the base ability scores before racial and class modifiers.
    pub fn base_scores(mut self, scores: AbilityScores) -> Self {
        self.base_scores = Some(scores);
        self
    }

    /// Add a starting inventory item.
    pub fn starting_item(mut self, item: InventoryItem) -> Self {
        self.starting_inventory.push(item);
        self
    }

    /// Build the character, returning an error if any required field is
    /// missing.
    pub fn build(self) -> Result<Character, BuilderError> {
        let name = self.name.filter(|n| !n.trim().is_empty());
        let name = name.ok_or(BuilderError::MissingName)?;
        let race = self.race.ok_or(BuilderError::MissingRace)?;
        let class = self.class.ok_or(BuilderError::MissingClass)?;

        let mut scores = self.base_scores.unwrap_or_default();

        // Apply the race and class modifier bundles, clamped to the floor.
        for modifier in race.modifiers.iter().chain(class.modifiers.iter()) {
            let current = scores.get(modifier.ability);
            scores.set(
                modifier.ability,
                (current + modifier.amount).max(MIN_ABILITY_SCORE),
            );
        }

        let con_mod = scores.modifier(crate::character::Ability::Constitution);
        let max_hp = (STARTING_HP_BASE + con_mod).max(1);

        let abilities = class.starting_abilities.clone();

        Ok(Character {
            name,
            race,
            class,
            backstory: self.backstory.unwrap_or_default(),
            world_setting: self.world_setting.unwrap_or_default(),
            discovered_elements: Vec::new(),
            ability_scores: scores,
            hp: max_hp,
            max_hp,
            statuses: Vec::new(),
            abilities,
            inventory: self.starting_inventory,
            level: 1,
            xp: 0,
            xp_to_next: progression::xp_to_next(1),
        })
    }
}

/// A ready-made character for tests and quick starts: Aldan, a Human
/// Warrior.
pub fn sample_hero() -> Character {
    let races = Race::presets();
    let classes = Class::presets();
    CharacterBuilder::new()
        .name("Aldan")
        .race(races[0].clone())
        .class(classes[0].clone())
        .backstory("A wanderer with more debts than friends.")
        .world_setting("A low-magic frontier kingdom after a long war.")
        .build()
        .expect("sample hero is fully specified")
}
