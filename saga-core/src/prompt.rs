//! System-instruction assembly for the Game Master model.
//!
//! The instruction has three parts: the table rules, the command
//! protocol, and a rendered character sheet. The sheet is rebuilt from
//! current state every time the chat session is recreated, which is
//! how state changes reach the model.

use crate::character::{Ability, Character};
use std::fmt::Write;

const GM_BASE: &str = include_str!("prompts/gm_base.txt");
const COMMAND_PROTOCOL: &str = include_str!("prompts/command_protocol.txt");

/// The full system instruction for a Game Master chat session.
pub fn system_instruction(character: &Character) -> String {
    format!(
        "{}\n\n{}\n\n{}",
        GM_BASE.trim(),
        COMMAND_PROTOCOL.trim(),
        character_sheet(character)
    )
}

/// The character sheet as the model sees it.
pub fn character_sheet(character: &Character) -> String {
    let mut sheet = String::new();
    let _ = writeln!(sheet, "THE PLAYER'S CHARACTER");
    let _ = writeln!(sheet);
    let _ = writeln!(
        sheet,
        "{}, a {} {} (level {})",
        character.name, character.race.name, character.class.name, character.level
    );
    match character.xp_to_next {
        Some(threshold) => {
            let _ = writeln!(sheet, "XP: {}/{}", character.xp, threshold);
        }
        None => {
            let _ = writeln!(sheet, "XP: {} (level cap reached)", character.xp);
        }
    }
    let _ = writeln!(sheet, "HP: {}/{}", character.hp, character.max_hp);
    let _ = writeln!(sheet);

    let _ = writeln!(sheet, "Ability scores:");
    for ability in Ability::all() {
        let score = character.ability_scores.get(ability);
        let modifier = character.ability_scores.modifier(ability);
        let _ = writeln!(sheet, "  {ability}: {score} ({modifier:+})");
    }

    if !character.statuses.is_empty() {
        let _ = writeln!(sheet, "Conditions: {}", character.statuses.join(", "));
    }

    if !character.abilities.is_empty() {
        let _ = writeln!(sheet);
        let _ = writeln!(sheet, "Abilities:");
        for ability in &character.abilities {
            let _ = writeln!(sheet, "  {}: {}", ability.name, ability.description);
        }
    }

    if !character.inventory.is_empty() {
        let _ = writeln!(sheet);
        let _ = writeln!(sheet, "Inventory:");
        for item in &character.inventory {
            let _ = writeln!(sheet, "  {}x {} ({})", item.quantity, item.name, item.kind.name());
        }
    }

    if !character.backstory.is_empty() {
        let _ = writeln!(sheet);
        let _ = writeln!(sheet, "Backstory: {}", character.backstory);
    }
    if !character.world_setting.is_empty() {
        let _ = writeln!(sheet, "World: {}", character.world_setting);
    }
    if !character.discovered_elements.is_empty() {
        let _ = writeln!(
            sheet,
            "Established world elements: {}",
            character.discovered_elements.join("; ")
        );
    }

    sheet.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::sample_hero;

    #[test]
    fn test_instruction_contains_all_three_sections() {
        let instruction = system_instruction(&sample_hero());
        assert!(instruction.contains("Game Master"));
        assert!(instruction.contains("COMMAND PROTOCOL"));
        assert!(instruction.contains("THE PLAYER'S CHARACTER"));
    }

    #[test]
    fn test_sheet_reflects_current_state() {
        let mut hero = sample_hero();
        hero.hp = 5;
        hero.statuses = vec!["poisoned".to_string()];
        let sheet = character_sheet(&hero);
        assert!(sheet.contains(&format!("HP: 5/{}", hero.max_hp)));
        assert!(sheet.contains("Conditions: poisoned"));
        assert!(sheet.contains("XP: 0/300"));
    }

    #[test]
    fn test_protocol_documents_every_sigil() {
        for sigil in crate::command::CommandKind::all() {
            assert!(
                COMMAND_PROTOCOL.contains(sigil.sigil()),
                "protocol text missing {}",
                sigil.sigil()
            );
        }
    }
}
