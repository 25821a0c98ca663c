//! Level-up flow through the session, scripted Game Master.

use saga_core::progression::{AbilityCandidate, LevelUpChoice};
use saga_core::testing::TestHarness;
use saga_core::{Ability, SessionError};

fn candidates() -> Vec<AbilityCandidate> {
    vec![
        AbilityCandidate {
            name: "Shield Bash".into(),
            description: "Knock a foe off balance.".into(),
        },
        AbilityCandidate {
            name: "Iron Skin".into(),
            description: "Shrug off a glancing blow.".into(),
        },
    ]
}

async fn earn_xp(harness: &mut TestHarness, amount: u32) {
    harness
        .exchange(
            "I finish the job.",
            &format!("Done and dusted.\n\nAWARD_XP:: {{\"amount\":{amount},\"reason\":\"The job\"}}\n"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_full_level_up_flow() {
    let mut harness = TestHarness::new();
    earn_xp(&mut harness, 350).await;

    let pending = harness.session.begin_level_up(candidates()).unwrap();
    assert_eq!(pending.new_level, 2);
    harness.assert_input_locked();

    harness
        .session
        .confirm_level_up(LevelUpChoice {
            score: Ability::Strength,
            ability: Some(candidates().remove(0)),
        })
        .await
        .unwrap();

    let character = harness.session.character();
    assert_eq!(character.level, 2);
    assert_eq!(character.xp, 50);
    assert_eq!(character.hp, character.max_hp);
    assert!(character.abilities.iter().any(|a| a.name == "Shield Bash"));
    harness.assert_system_note_contains("reached level 2");
    harness.assert_input_unlocked();
}

#[tokio::test]
async fn test_ability_pick_required_when_offered() {
    let mut harness = TestHarness::new();
    earn_xp(&mut harness, 300).await;
    harness.session.begin_level_up(candidates()).unwrap();

    assert!(matches!(
        harness
            .session
            .confirm_level_up(LevelUpChoice {
                score: Ability::Dexterity,
                ability: None,
            })
            .await,
        Err(SessionError::AbilityChoiceRequired)
    ));

    // Picking something that was never offered is also rejected.
    assert!(matches!(
        harness
            .session
            .confirm_level_up(LevelUpChoice {
                score: Ability::Dexterity,
                ability: Some(AbilityCandidate {
                    name: "Invented Move".into(),
                    description: String::new(),
                }),
            })
            .await,
        Err(SessionError::UnknownAbilityChoice)
    ));
}

#[tokio::test]
async fn test_no_candidates_means_score_only() {
    let mut harness = TestHarness::new();
    earn_xp(&mut harness, 300).await;
    harness.session.begin_level_up(Vec::new()).unwrap();

    harness
        .session
        .confirm_level_up(LevelUpChoice {
            score: Ability::Constitution,
            ability: None,
        })
        .await
        .unwrap();

    assert_eq!(harness.session.character().level, 2);
}

#[tokio::test]
async fn test_chained_level_ups() {
    let mut harness = TestHarness::new();
    earn_xp(&mut harness, 1000).await;

    harness.session.begin_level_up(Vec::new()).unwrap();
    harness
        .session
        .confirm_level_up(LevelUpChoice {
            score: Ability::Wisdom,
            ability: None,
        })
        .await
        .unwrap();

    // 700 XP remain against a 600 threshold: still locked, level again.
    assert!(harness.session.level_up_available());
    harness.assert_input_locked();

    harness.session.begin_level_up(Vec::new()).unwrap();
    harness
        .session
        .confirm_level_up(LevelUpChoice {
            score: Ability::Wisdom,
            ability: None,
        })
        .await
        .unwrap();

    assert_eq!(harness.session.character().level, 3);
    assert_eq!(harness.session.character().xp, 100);
    harness.assert_input_unlocked();
}

#[tokio::test]
async fn test_model_signal_offers_level_up() {
    let mut harness = TestHarness::new();
    harness
        .exchange(
            "I claim my reward.",
            concat!(
                "You have earned it.\n\n",
                "AWARD_XP:: {\"amount\":300,\"reason\":\"The quest\"}\n",
                "LEVEL_UP:: {\"reason\":\"A hero's welcome\"}\n",
            ),
        )
        .await
        .unwrap();

    assert!(harness.session.level_up_available());
    harness.assert_system_note_contains("Ready to level up");
    assert!(harness.session.begin_level_up(Vec::new()).is_ok());
}

#[tokio::test]
async fn test_level_up_signal_without_xp_forces_offer() {
    let mut harness = TestHarness::new();
    harness
        .exchange(
            "I kneel before the king.",
            "Rise, knight.\n\nLEVEL_UP:: {\"reason\":\"A hero's welcome\"}\n",
        )
        .await
        .unwrap();

    // No experience was banked, yet the story called for a level-up.
    assert_eq!(harness.session.character().xp, 0);
    assert!(harness.session.level_up_available());
    harness.assert_input_locked();

    let pending = harness.session.begin_level_up(Vec::new()).unwrap();
    assert!(pending.forced);

    harness
        .session
        .confirm_level_up(LevelUpChoice {
            score: Ability::Charisma,
            ability: None,
        })
        .await
        .unwrap();

    assert_eq!(harness.session.character().level, 2);
    assert_eq!(harness.session.character().xp, 0);
    harness.assert_input_unlocked();
}

#[tokio::test]
async fn test_forced_level_up_skips_threshold() {
    let mut harness = TestHarness::new();
    harness.session.force_level_up(Vec::new()).unwrap();
    harness
        .session
        .confirm_level_up(LevelUpChoice {
            score: Ability::Strength,
            ability: None,
        })
        .await
        .unwrap();
    assert_eq!(harness.session.character().level, 2);
    assert_eq!(harness.session.character().xp, 0);
}

#[tokio::test]
async fn test_begin_without_offer_rejected() {
    let mut harness = TestHarness::new();
    assert!(matches!(
        harness.session.begin_level_up(Vec::new()),
        Err(SessionError::NoLevelUpOffered)
    ));
}
