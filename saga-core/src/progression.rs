//! Experience and level progression.
//!
//! Experience accumulates toward a per-level threshold; crossing it
//! offers a level-up the player confirms by picking one ability score
//! to raise and, optionally, one new learned ability. Overflow
//! experience carries into the next level, so a large award can chain
//! several level-ups back to back.

use crate::character::{Ability, Character, LearnedAbility};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Levels past this cap no longer accrue toward a next threshold.
pub const MAX_LEVEL: u32 = 20;

/// Flat health gain per level, before the Constitution modifier.
pub const BASE_HP_GAIN: i32 = 8;

/// Experience required to advance from level `n` to `n + 1`, indexed
/// by `n - 1`. Thresholds reset each level rather than accumulate.
pub const XP_THRESHOLDS: [u32; (MAX_LEVEL - 1) as usize] = [
    300, 600, 900, 1400, 2100, 3000, 4100, 5400, 6900, 8600, 10500, 12600, 14900, 17400, 20100,
    23000, 26100, 29400, 32900,
];

/// Experience needed to advance past `level`, or `None` at the cap.
pub fn xp_to_next(level: u32) -> Option<u32> {
    if level == 0 || level >= MAX_LEVEL {
        return None;
    }
    Some(XP_THRESHOLDS[(level - 1) as usize])
}

/// Whether the character has banked enough experience to advance.
pub fn ready_to_level(character: &Character) -> bool {
    match xp_to_next(character.level) {
        Some(threshold) => character.xp >= threshold,
        None => false,
    }
}

/// A learnable ability proposed to the player during a level-up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbilityCandidate {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A level-up waiting on player input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingLevelUp {
    /// The level the character will hold once confirmed.
    pub new_level: u32,
    /// Abilities the player may pick one of. May be empty, in which
    /// case the level-up grants only the score increase.
    pub candidates: Vec<AbilityCandidate>,
    /// Offered without the experience to back it (debug path); the
    /// threshold check is skipped on apply.
    #[serde(default)]
    pub forced: bool,
}

/// The player's confirmed picks for a pending level-up.
#[derive(Debug, Clone)]
pub struct LevelUpChoice {
    /// Which ability score gains +1.
    pub score: Ability,
    /// The learned ability picked from the offered candidates, if any.
    pub ability: Option<AbilityCandidate>,
}

/// What a confirmed level-up changed.
#[derive(Debug, Clone)]
pub struct LevelUpResult {
    pub new_level: u32,
    pub hp_gain: i32,
    /// Leftover experience already crosses the next threshold, so
    /// another level-up should be offered immediately.
    pub again: bool,
}

#[derive(Debug, Error)]
pub enum ProgressionError {
    #[error("already at the level cap ({MAX_LEVEL})")]
    AtLevelCap,

    #[error("not enough experience to advance from level {level}")]
    NotEnoughXp { level: u32 },
}

/// Confirm a level-up, consuming the threshold's worth of experience.
///
/// The score increase lands before the health gain is computed, so
/// raising Constitution counts toward this level's own gain. Health
/// gain is floored at 1 even for a deeply negative modifier, and the
/// character is restored to full health.
pub fn apply_level_up(
    character: &mut Character,
    choice: &LevelUpChoice,
) -> Result<LevelUpResult, ProgressionError> {
    let threshold = xp_to_next(character.level).ok_or(ProgressionError::AtLevelCap)?;
    if character.xp < threshold {
        return Err(ProgressionError::NotEnoughXp {
            level: character.level,
        });
    }
    advance(character, choice, threshold)
}

/// Debug path: advance without requiring the threshold to be met.
/// Whatever experience is banked is debited, floored at zero.
pub fn force_apply_level_up(
    character: &mut Character,
    choice: &LevelUpChoice,
) -> Result<LevelUpResult, ProgressionError> {
    let threshold = xp_to_next(character.level).ok_or(ProgressionError::AtLevelCap)?;
    advance(character, choice, threshold)
}

fn advance(
    character: &mut Character,
    choice: &LevelUpChoice,
    threshold: u32,
) -> Result<LevelUpResult, ProgressionError> {
    character.xp = character.xp.saturating_sub(threshold);
    character.level += 1;

    let score = character.ability_scores.get(choice.score);
    character.ability_scores.set(choice.score, score + 1);

    let hp_gain = (BASE_HP_GAIN + character.modifier(Ability::Constitution)).max(1);
    character.max_hp += hp_gain;
    character.hp = character.max_hp;

    if let Some(candidate) = &choice.ability {
        character.abilities.push(LearnedAbility {
            name: candidate.name.clone(),
            description: candidate.description.clone(),
        });
    }

    character.xp_to_next = xp_to_next(character.level);

    Ok(LevelUpResult {
        new_level: character.level,
        hp_gain,
        again: ready_to_level(character),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::sample_hero;

    #[test]
    fn test_thresholds_are_monotonic() {
        for pair in XP_THRESHOLDS.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(xp_to_next(1), Some(300));
        assert_eq!(xp_to_next(19), Some(32900));
        assert_eq!(xp_to_next(MAX_LEVEL), None);
        assert_eq!(xp_to_next(0), None);
    }

    #[test]
    fn test_level_up_consumes_threshold_and_raises_score() {
        let mut hero = sample_hero();
        hero.xp = 320;
        let before_str = hero.ability_scores.get(Ability::Strength);
        let before_max = hero.max_hp;

        let result = apply_level_up(
            &mut hero,
            &LevelUpChoice {
                score: Ability::Strength,
                ability: None,
            },
        )
        .unwrap();

        assert_eq!(result.new_level, 2);
        assert_eq!(hero.level, 2);
        assert_eq!(hero.xp, 20);
        assert_eq!(hero.ability_scores.get(Ability::Strength), before_str + 1);
        // Sample hero has CON 12, so +1 modifier on top of the base gain.
        assert_eq!(result.hp_gain, BASE_HP_GAIN + 1);
        assert_eq!(hero.max_hp, before_max + BASE_HP_GAIN + 1);
        assert_eq!(hero.hp, hero.max_hp);
        assert_eq!(hero.xp_to_next, Some(600));
        assert!(!result.again);
    }

    #[test]
    fn test_constitution_pick_counts_toward_own_gain() {
        let mut hero = sample_hero();
        hero.xp = 300;
        hero.ability_scores.set(Ability::Constitution, 13);

        let result = apply_level_up(
            &mut hero,
            &LevelUpChoice {
                score: Ability::Constitution,
                ability: None,
            },
        )
        .unwrap();

        // 13 -> 14 is a +2 modifier.
        assert_eq!(result.hp_gain, BASE_HP_GAIN + 2);
    }

    #[test]
    fn test_overflow_chains_another_level_up() {
        let mut hero = sample_hero();
        hero.xp = 1000;

        let first = apply_level_up(
            &mut hero,
            &LevelUpChoice {
                score: Ability::Wisdom,
                ability: None,
            },
        )
        .unwrap();
        assert!(first.again, "700 leftover crosses the 600 threshold");

        let second = apply_level_up(
            &mut hero,
            &LevelUpChoice {
                score: Ability::Wisdom,
                ability: None,
            },
        )
        .unwrap();
        assert_eq!(second.new_level, 3);
        assert_eq!(hero.xp, 100);
        assert!(!second.again);
    }

    #[test]
    fn test_not_enough_xp_is_rejected() {
        let mut hero = sample_hero();
        hero.xp = 299;
        let err = apply_level_up(
            &mut hero,
            &LevelUpChoice {
                score: Ability::Strength,
                ability: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, ProgressionError::NotEnoughXp { level: 1 }));
    }

    #[test]
    fn test_forced_level_up_debits_what_is_there() {
        let mut hero = sample_hero();
        hero.xp = 120;
        let result = force_apply_level_up(
            &mut hero,
            &LevelUpChoice {
                score: Ability::Strength,
                ability: None,
            },
        )
        .unwrap();
        assert_eq!(result.new_level, 2);
        assert_eq!(hero.xp, 0);
    }

    #[test]
    fn test_level_cap_is_terminal() {
        let mut hero = sample_hero();
        hero.level = MAX_LEVEL;
        hero.xp = 50_000;
        let err = apply_level_up(
            &mut hero,
            &LevelUpChoice {
                score: Ability::Strength,
                ability: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, ProgressionError::AtLevelCap));
    }

    #[test]
    fn test_chosen_ability_is_learned() {
        let mut hero = sample_hero();
        hero.xp = 300;
        apply_level_up(
            &mut hero,
            &LevelUpChoice {
                score: Ability::Intelligence,
                ability: Some(AbilityCandidate {
                    name: "Second Wind".into(),
                    description: "Catch your breath mid-fight.".into(),
                }),
            },
        )
        .unwrap();

        // One starting ability from the class, plus the new pick.
        assert_eq!(hero.abilities.last().unwrap().name, "Second Wind");
    }
}
