//! Query expansion for "or" disjunctions.

use once_cell::sync::Lazy;
use regex::Regex;

/// Whitespace-delimited literal "or". Case-insensitivity comes from
/// lower-casing the query before splitting.
static OR_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+or\s+").unwrap());

/// Split a raw query into independent search terms.
///
/// `"pizza or pasta"` becomes `["pizza", "pasta"]`; a query without the
/// disjunction token yields a single trimmed, lower-cased term. Empty
/// terms are dropped.
pub fn expand_query(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    OR_SPLIT
        .split(&lowered)
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::to_string)
        .collect()
}
