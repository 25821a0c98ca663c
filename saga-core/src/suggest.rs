//! Level-up ability suggestions.
//!
//! A separate one-shot model call proposes learnable abilities when a
//! level-up is pending. The call is best-effort: any failure (network,
//! refusal, unparseable output) degrades to an empty candidate list
//! and the level-up proceeds with just the score increase.

use crate::character::Character;
use crate::progression::AbilityCandidate;
use crate::prompt;
use gemini::{Content, Gemini, Request};
use tracing::warn;

const SUGGESTER_INSTRUCTION: &str = include_str!("prompts/ability_suggester.txt");

/// Ask the model for ability candidates fitting the character.
pub async fn suggest_abilities(client: &Gemini, character: &Character) -> Vec<AbilityCandidate> {
    let request = Request::new(vec![Content::user(prompt::character_sheet(character))])
        .with_system_instruction(SUGGESTER_INSTRUCTION.trim())
        .with_max_output_tokens(1024);

    match client.generate(request).await {
        Ok(response) => {
            let candidates = parse_candidates(&response.text);
            if candidates.is_empty() {
                warn!("ability suggester returned no usable candidates");
            }
            candidates
        }
        Err(e) => {
            warn!(%e, "ability suggester request failed");
            Vec::new()
        }
    }
}

/// Pull a candidate array out of model output.
///
/// Tolerates prose or code fences around the array by scanning for the
/// outermost brackets. Candidates without a name are discarded.
pub fn parse_candidates(text: &str) -> Vec<AbilityCandidate> {
    let start = match text.find('[') {
        Some(i) => i,
        None => return Vec::new(),
    };
    let end = match text.rfind(']') {
        Some(i) if i > start => i,
        _ => return Vec::new(),
    };

    let candidates: Vec<AbilityCandidate> = match serde_json::from_str(&text[start..=end]) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(%e, "could not parse ability candidates");
            return Vec::new();
        }
    };

    candidates
        .into_iter()
        .filter(|c| !c.name.trim().is_empty())
        .collect()
}
