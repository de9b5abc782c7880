//! Text normalization shared by the matcher and the custom command store

use std::collections::HashMap;

/// Trim and lowercase; the canonical form every comparison runs on
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Length in characters, so CJK phrases score the same way Latin ones do
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Rewrite common misrecognitions (e.g., "full green" -> "fullscreen")
/// Longer aliases are applied first so "mute it" wins over "mute"
pub fn apply_aliases(text: &str, aliases: &HashMap<String, String>) -> String {
    let mut result = text.to_lowercase();
    if aliases.is_empty() {
        return result;
    }

    let mut ordered: Vec<(String, &String)> = aliases
        .iter()
        .map(|(from, to)| (from.trim().to_lowercase(), to))
        .filter(|(from, _)| !from.is_empty())
        .collect();
    ordered.sort_by(|a, b| char_len(&b.0).cmp(&char_len(&a.0)).then_with(|| a.0.cmp(&b.0)));

    for (from, to) in ordered {
        result = result.replace(&from, &to.to_lowercase());
    }
    result
}
