//! Dice resolution engine.
//!
//! Maps a roll request (up to three named abilities) plus the current
//! ability scores to d20 outcomes with deterministic modifier math.
//! No error paths: an absent score defaults to the baseline.

use crate::character::{Ability, AbilityScores, BASELINE_ABILITY_SCORE};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A roll the model has asked the player to make.
///
/// Created by the model's output, consumed exactly once, then
/// discarded. An id that was already resolved must never be
/// re-activated; the reconciliation engine enforces that guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollRequest {
    pub id: String,
    #[serde(rename = "statsToRoll")]
    pub stats: Vec<Ability>,
    pub description: String,
}

/// One die rolled against one ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRoll {
    pub ability: Ability,
    pub die: i32,
    pub modifier: i32,
    pub total: i32,
}

/// The resolved report for a roll request, in the order requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollReport {
    pub id: String,
    pub description: String,
    pub rolls: Vec<StatRoll>,
}

impl RollReport {
    /// The report phrased as a player turn for the model.
    pub fn player_message(&self) -> String {
        let mut out = format!("Dice roll results for \"{}\":", self.description);
        for roll in &self.rolls {
            out.push_str(&format!(
                " {}: d20 {} {} {} = {}.",
                roll.ability,
                roll.die,
                if roll.modifier < 0 { "-" } else { "+" },
                roll.modifier.abs(),
                roll.total
            ));
        }
        out
    }
}

impl fmt::Display for RollReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.player_message())
    }
}

/// The derived modifier for a raw score: `floor((score - 10) / 2)`.
pub fn ability_modifier(score: i32) -> i32 {
    (score - BASELINE_ABILITY_SCORE).div_euclid(2)
}

/// Resolve a roll request against the current ability scores.
pub fn resolve_roll(request: &RollRequest, scores: &AbilityScores) -> RollReport {
    resolve_roll_with_rng(request, scores, &mut rand::thread_rng())
}

/// Resolve with a specific RNG (useful for testing).
pub fn resolve_roll_with_rng<R: Rng>(
    request: &RollRequest,
    scores: &AbilityScores,
    rng: &mut R,
) -> RollReport {
    let rolls = request
        .stats
        .iter()
        .map(|&ability| {
            let die = rng.gen_range(1..=20);
            let modifier = ability_modifier(scores.get(ability));
            StatRoll {
                ability,
                die,
                modifier,
                total: die + modifier,
            }
        })
        .collect();

    RollReport {
        id: request.id.clone(),
        description: request.description.clone(),
        rolls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn request(stats: Vec<Ability>) -> RollRequest {
        RollRequest {
            id: "roll-1".to_string(),
            stats,
            description: "Climbing the cliff".to_string(),
        }
    }

    #[test]
    fn test_modifier_table() {
        assert_eq!(ability_modifier(10), 0);
        assert_eq!(ability_modifier(8), -1);
        assert_eq!(ability_modifier(16), 3);
        assert_eq!(ability_modifier(3), -4);
        assert_eq!(ability_modifier(11), 0);
        assert_eq!(ability_modifier(20), 5);
    }

    #[test]
    fn test_roll_range_and_order() {
        let scores = AbilityScores::new(16, 8, 10, 10, 10, 10);
        let req = request(vec![Ability::Strength, Ability::Dexterity]);

        for _ in 0..100 {
            let report = resolve_roll(&req, &scores);
            assert_eq!(report.rolls.len(), 2);
            assert_eq!(report.rolls[0].ability, Ability::Strength);
            assert_eq!(report.rolls[1].ability, Ability::Dexterity);

            let str_roll = report.rolls[0];
            assert!((1..=20).contains(&str_roll.die));
            assert_eq!(str_roll.modifier, 3);
            assert_eq!(str_roll.total, str_roll.die + 3);

            let dex_roll = report.rolls[1];
            assert_eq!(dex_roll.modifier, -1);
            assert_eq!(dex_roll.total, dex_roll.die - 1);
        }
    }

    #[test]
    fn test_report_keeps_correlation() {
        let scores = AbilityScores::default();
        let report = resolve_roll(&request(vec![Ability::Wisdom]), &scores);
        assert_eq!(report.id, "roll-1");
        assert_eq!(report.description, "Climbing the cliff");
    }

    #[test]
    fn test_deterministic_with_rng() {
        let scores = AbilityScores::default();
        let mut rng = StepRng::new(0, 0);
        let a = resolve_roll_with_rng(&request(vec![Ability::Strength]), &scores, &mut rng);
        let mut rng = StepRng::new(0, 0);
        let b = resolve_roll_with_rng(&request(vec![Ability::Strength]), &scores, &mut rng);
        assert_eq!(a.rolls[0].die, b.rolls[0].die);
    }

    #[test]
    fn test_player_message_format() {
        let report = RollReport {
            id: "roll-2".to_string(),
            description: "Forcing the gate".to_string(),
            rolls: vec![StatRoll {
                ability: Ability::Strength,
                die: 14,
                modifier: 2,
                total: 16,
            }],
        };
        let message = report.player_message();
        assert!(message.contains("Forcing the gate"));
        assert!(message.contains("Strength: d20 14 + 2 = 16"));
    }

    #[test]
    fn test_wire_shape() {
        let req: RollRequest = serde_json::from_str(
            r#"{"id":"r9","statsToRoll":["Strength","Wisdom"],"description":"Holding the door"}"#,
        )
        .unwrap();
        assert_eq!(req.stats, vec![Ability::Strength, Ability::Wisdom]);
    }
}
