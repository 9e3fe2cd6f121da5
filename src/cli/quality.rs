//! Quality argument validation with "did you mean" suggestions

use strsim::{jaro_winkler, normalized_levenshtein};

/// Below this combined score no suggestion is made
const MIN_SIMILARITY: f64 = 0.65;

/// Closest configured quality level to a mistyped `input`
///
/// Scores are 70% Jaro-Winkler and 30% normalized Levenshtein; Jaro-Winkler
/// rewards the shared prefixes typical of level names.
pub fn suggest_quality(input: &str, options: &[String]) -> Option<String> {
    let input_lower = input.to_lowercase();

    options
        .iter()
        .map(|candidate| {
            let candidate_lower = candidate.to_lowercase();
            let score = jaro_winkler(&input_lower, &candidate_lower) * 0.7
                + normalized_levenshtein(&input_lower, &candidate_lower) * 0.3;
            (candidate, score)
        })
        .filter(|(_, score)| *score >= MIN_SIMILARITY)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate.clone())
}

/// Error text for an unknown quality level
pub fn unknown_quality_message(input: &str, options: &[String]) -> String {
    let mut message = format!("Unknown quality '{input}'");
    if let Some(suggestion) = suggest_quality(input, options) {
        message.push_str(&format!(". Did you mean '{suggestion}'?"));
    }
    if !options.is_empty() {
        message.push_str(&format!(" Valid levels: {}", options.join(", ")));
    }
    message
}
