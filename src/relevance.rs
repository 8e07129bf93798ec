// src/relevance.rs
//! Keyword relevance gate.

use crate::ingest::types::CandidateItem;

/// Case-insensitive substring match of any keyword against any text field.
///
/// An empty keyword list disables the gate. Missing fields never match.
/// Keywords are expected to be trimmed and non-blank (see config loading).
pub fn is_relevant(item: &CandidateItem, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let fields: Vec<String> = item
        .payload
        .text_fields()
        .into_iter()
        .filter(|f| !f.is_empty())
        .map(str::to_lowercase)
        .collect();
    if fields.is_empty() {
        return false;
    }
    keywords
        .iter()
        .map(|k| k.to_lowercase())
        .filter(|k| !k.is_empty())
        .any(|k| fields.iter().any(|f| f.contains(&k)))
}

/// Keywords that matched, for logging.
pub fn matched_keywords<'a>(item: &CandidateItem, keywords: &'a [String]) -> Vec<&'a str> {
    let fields: Vec<String> = item
        .payload
        .text_fields()
        .into_iter()
        .map(str::to_lowercase)
        .collect();
    keywords
        .iter()
        .filter(|k| {
            let k = k.to_lowercase();
            !k.is_empty() && fields.iter().any(|f| f.contains(&k))
        })
        .map(String::as_str)
        .collect()
}
