//! End-to-end turn loop tests against a scripted Game Master.

use gemini::FinishReason;
use rand::rngs::mock::StepRng;
use saga_core::session::MAX_AUTO_RETRIES;
use saga_core::testing::TestHarness;
use saga_core::{SessionError, TurnPhase};

#[tokio::test]
async fn test_basic_exchange() {
    let mut harness = TestHarness::new();
    harness
        .exchange("I push open the tavern door.", "Warm light spills out to meet you.")
        .await
        .unwrap();

    harness.assert_last_gm_contains("Warm light");
    harness.assert_input_unlocked();
    assert_eq!(harness.session.turns().len(), 2);
    assert_eq!(harness.session.phase(), TurnPhase::Idle);
}

#[tokio::test]
async fn test_commands_stripped_and_applied() {
    let mut harness = TestHarness::new();
    harness
        .exchange(
            "I haggle with the merchant.",
            concat!(
                "He laughs, but hands over the goods.\n\n",
                "AWARD_XP:: {\"amount\":25,\"reason\":\"Sharp haggling\"}\n",
                "AWARD_ITEM:: {\"name\":\"Rope\",\"description\":\"Fifty feet\",\"type\":\"misc\",\"quantity\":1}\n",
            ),
        )
        .await
        .unwrap();

    harness.assert_last_gm_contains("hands over the goods");
    let gm_text = &harness.session.turns()[1].text;
    assert!(!gm_text.contains("AWARD_XP"));
    harness.assert_xp(25);
    harness.assert_item_quantity("Rope", 1);
    harness.assert_system_note_contains("Gained 25 XP");
}

#[tokio::test]
async fn test_dice_roll_gates_input_until_resolved() {
    let mut harness = TestHarness::new();
    harness
        .exchange(
            "I try to lift the portcullis.",
            concat!(
                "The iron is heavier than it looks.\n\n",
                "DICE_ROLL:: {\"id\":\"gate-1\",\"statsToRoll\":[\"Strength\"],\"description\":\"Lifting the portcullis\"}\n",
            ),
        )
        .await
        .unwrap();

    assert_eq!(harness.session.pending_roll().unwrap().id, "gate-1");
    harness.assert_input_locked();
    assert!(matches!(
        harness.session.send("I keep talking instead", |_| {}).await,
        Err(SessionError::RollPending)
    ));

    harness.gm.script("With a groan of metal, it rises.");
    let report = harness
        .session
        .resolve_roll_with_rng(&mut StepRng::new(0, 0), |_| {})
        .await
        .unwrap();

    assert_eq!(report.id, "gate-1");
    assert_eq!(report.rolls.len(), 1);
    assert!(harness.session.pending_roll().is_none());
    assert_eq!(
        harness.session.snapshot().last_resolved_roll_id.as_deref(),
        Some("gate-1")
    );
    harness.assert_input_unlocked();

    // The results went back as a player message.
    let request = harness.gm.last_request().unwrap();
    let last_content = request.contents.last().unwrap();
    assert!(last_content.text().contains("Dice roll results"));
}

#[tokio::test]
async fn test_replayed_roll_id_is_suppressed() {
    let mut harness = TestHarness::new();
    harness
        .exchange(
            "I jump the chasm.",
            "DICE_ROLL:: {\"id\":\"jump-1\",\"statsToRoll\":[\"Dexterity\"],\"description\":\"The chasm\"}\n",
        )
        .await
        .unwrap();

    // The model echoes the same request id back with its narration.
    harness.gm.script(concat!(
        "You barely make it.\n\n",
        "DICE_ROLL:: {\"id\":\"jump-1\",\"statsToRoll\":[\"Dexterity\"],\"description\":\"The chasm\"}\n",
    ));
    harness
        .session
        .resolve_roll_with_rng(&mut StepRng::new(0, 0), |_| {})
        .await
        .unwrap();

    assert!(harness.session.pending_roll().is_none());
    harness.assert_input_unlocked();
}

#[tokio::test]
async fn test_auto_turn_retries_on_truncation() {
    let mut harness = TestHarness::new();
    harness
        .gm
        .script_with_finish("The scene starts but trails o", FinishReason::MaxTokens);
    harness.gm.script("You wake beneath a broken waystone.");

    harness.session.begin(|_| {}).await.unwrap();

    assert_eq!(harness.gm.remaining_scripts(), 0);
    assert_eq!(harness.session.auto_retries(), 1);
    harness.assert_last_gm_contains("broken waystone");
    // Only the successful reply is in the log.
    assert_eq!(harness.session.turns().len(), 1);
    assert!(!harness.session.turns()[0].interrupted);
}

#[tokio::test]
async fn test_auto_retry_ceiling_leaves_note() {
    let mut harness = TestHarness::new();
    for _ in 0..=MAX_AUTO_RETRIES {
        harness
            .gm
            .script_with_finish("Cut o", FinishReason::Safety);
    }

    harness.session.begin(|_| {}).await.unwrap();

    assert_eq!(harness.gm.remaining_scripts(), 0);
    assert_eq!(harness.session.auto_retries(), MAX_AUTO_RETRIES);
    assert!(harness.session.turns()[0].interrupted);
    harness.assert_system_note_contains("cut short");
}

#[tokio::test]
async fn test_manual_send_does_not_auto_retry() {
    let mut harness = TestHarness::new();
    harness
        .gm
        .script_with_finish("The narration stops mid-", FinishReason::MaxTokens);

    harness.session.send("I look around.", |_| {}).await.unwrap();

    assert_eq!(harness.gm.remaining_scripts(), 0);
    assert_eq!(harness.session.auto_retries(), 0);
    let gm_turn = &harness.session.turns()[1];
    assert!(gm_turn.interrupted);
    harness.assert_system_note_contains("regenerate");
}

#[tokio::test]
async fn test_stream_error_keeps_partial_text() {
    let mut harness = TestHarness::new();
    harness.gm.script_stream_error(
        "Rain begins to fall",
        gemini::Error::Network("connection reset".into()),
    );

    let result = harness.session.send("I camp for the night.", |_| {}).await;
    assert!(matches!(result, Err(SessionError::Gm(_))));

    let gm_turn = &harness.session.turns()[1];
    assert!(gm_turn.interrupted);
    assert_eq!(gm_turn.text, "Rain begins to fall");
    assert_eq!(harness.session.phase(), TurnPhase::Idle);

    // The session is usable again.
    harness
        .exchange("I try again.", "The fire catches at last.")
        .await
        .unwrap();
    harness.assert_last_gm_contains("fire catches");
}

#[tokio::test]
async fn test_regenerate_replaces_last_model_turn() {
    let mut harness = TestHarness::new();
    harness
        .exchange("I enter the crypt.", "Dust hangs in the air.")
        .await
        .unwrap();

    harness.gm.script("Something shifts in the dark ahead.");
    harness.session.regenerate_last(|_| {}).await.unwrap();

    harness.assert_last_gm_contains("shifts in the dark");
    assert_eq!(harness.session.turns().len(), 2);

    // The prompting player turn is sent exactly once.
    let request = harness.gm.last_request().unwrap();
    let repeats = request
        .contents
        .iter()
        .filter(|c| c.text().contains("enter the crypt"))
        .count();
    assert_eq!(repeats, 1);
}

#[tokio::test]
async fn test_regenerate_with_no_model_turn() {
    let mut harness = TestHarness::new();
    assert!(matches!(
        harness.session.regenerate_last(|_| {}).await,
        Err(SessionError::NothingToRegenerate)
    ));
}

#[tokio::test]
async fn test_display_observer_never_sees_command_syntax() {
    let mut harness = TestHarness::new();
    harness.gm.script_chunks(vec![
        Ok(gemini::StreamChunk {
            text: Some("A coin purse lands at your feet.\n\nAWARD_ITEM:: {\"name\":\"Gold\",".into()),
            finish_reason: None,
            usage: None,
        }),
        Ok(gemini::StreamChunk {
            text: Some("\"description\":\"\",\"type\":\"gold\",\"quantity\":10}\n".into()),
            finish_reason: None,
            usage: None,
        }),
        Ok(gemini::StreamChunk {
            text: None,
            finish_reason: Some(FinishReason::Stop),
            usage: None,
        }),
    ]);

    let mut frames = Vec::new();
    harness
        .session
        .send("I catch it.", |display| frames.push(display.to_string()))
        .await
        .unwrap();

    assert!(!frames.is_empty());
    for frame in &frames {
        assert!(!frame.contains("AWARD_ITEM"), "leaked syntax: {frame:?}");
    }
    harness.assert_item_quantity("Gold", 10);
}

#[tokio::test]
async fn test_level_up_availability_locks_input() {
    let mut harness = TestHarness::new();
    harness
        .exchange(
            "I slay the wyrm.",
            "The beast falls.\n\nAWARD_XP:: {\"amount\":350,\"reason\":\"The wyrm\"}\n",
        )
        .await
        .unwrap();

    assert!(harness.session.level_up_available());
    harness.assert_input_locked();
    assert!(matches!(
        harness.session.send("Onward!", |_| {}).await,
        Err(SessionError::LevelUpPending)
    ));
}
