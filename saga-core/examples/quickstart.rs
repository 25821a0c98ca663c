//! Minimal terminal game loop. Needs GEMINI_API_KEY (or a .env file).
//!
//!     cargo run --example quickstart

use saga_core::progression::LevelUpChoice;
use saga_core::session::{GameSession, SessionConfig};
use saga_core::{sample_hero, Ability, SaveSlot, Sender};
use std::io::{BufRead, Write};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "saga_core=info".into()),
        )
        .init();

    let client = gemini::Gemini::from_env()?;
    let slot = SaveSlot::new("saga-save.json");
    let config = SessionConfig::default().with_save_slot(slot.clone());

    let mut session = match slot.load().await {
        Some(saved) => {
            println!(
                "Resuming {} (level {})...",
                saved.character.name, saved.character.level
            );
            GameSession::resume(client, saved, config)
        }
        None => {
            let mut session = GameSession::new(client, sample_hero(), config);
            session.begin(|_| {}).await?;
            session
        }
    };
    print_new_turns(&session, 0);

    let stdin = std::io::stdin();
    loop {
        if let Some(request) = session.pending_roll() {
            println!("[roll] {}", request.description);
            prompt("press enter to roll")?;
            stdin.lock().read_line(&mut String::new())?;

            let seen = session.turns().len();
            let report = session.resolve_roll(|_| {}).await?;
            for roll in &report.rolls {
                println!(
                    "  {}: d20 {} {:+} = {}",
                    roll.ability, roll.die, roll.modifier, roll.total
                );
            }
            print_new_turns(&session, seen);
            continue;
        }

        if session.level_up_available() {
            // Keep the demo simple: no ability candidates, Strength +1.
            session.begin_level_up(Vec::new())?;
            session
                .confirm_level_up(LevelUpChoice {
                    score: Ability::Strength,
                    ability: None,
                })
                .await?;
            let character = session.character();
            println!(
                "*** Level {}! HP {}/{} ***\n",
                character.level, character.hp, character.max_hp
            );
            continue;
        }

        prompt("> ")?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() || line == "quit" {
            break;
        }

        let seen = session.turns().len();
        session.send(line, |_| {}).await?;
        print_new_turns(&session, seen);
    }

    Ok(())
}

fn print_new_turns(session: &GameSession, seen: usize) {
    for turn in &session.turns()[seen..] {
        match turn.sender {
            Sender::Gm => println!("\n{}\n", turn.text),
            Sender::System => println!("  [{}]", turn.text),
            Sender::Player => {}
        }
    }
}

fn prompt(text: &str) -> std::io::Result<()> {
    print!("{text}");
    std::io::stdout().flush()
}
