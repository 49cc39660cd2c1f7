//! Response parsing and repair
//!
//! Models wrap JSON in prose and Markdown fences. These helpers strip the fences, cut
//! out the outermost object or array and deserialize it. Callers choose between a hard
//! `ParseFailure`, a substituted default, or a bounded number of regenerations.

use crate::error::ApiError;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Extra upstream generations allowed where downstream JSON consumption is strict.
pub const DEFAULT_MAX_EXTRA_ATTEMPTS: u32 = 2;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```[A-Za-z0-9_-]*").expect("valid fence regex"))
}

fn object_regex() -> &'static Regex {
    static OBJECT: OnceLock<Regex> = OnceLock::new();
    OBJECT.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid object regex"))
}

fn array_regex() -> &'static Regex {
    static ARRAY: OnceLock<Regex> = OnceLock::new();
    ARRAY.get_or_init(|| Regex::new(r"(?s)\[.*\]").expect("valid array regex"))
}

/// Remove Markdown code-fence markers (with or without a language tag).
pub fn strip_code_fences(raw: &str) -> String {
    fence_regex().replace_all(raw, "").trim().to_string()
}

/// Candidate substrings in the order they should be tried.
///
/// Whichever of `{` or `[` appears first is tried first, then the other bracket type,
/// then the fence-stripped text itself. Each bracket match is greedy up to the last
/// matching closer.
pub fn json_candidates(raw: &str) -> Vec<String> {
    let cleaned = strip_code_fences(raw);
    let object_start = cleaned.find('{');
    let array_start = cleaned.find('[');

    let prefer_array = match (object_start, array_start) {
        (Some(o), Some(a)) => a < o,
        (None, Some(_)) => true,
        _ => false,
    };
    let (primary, secondary) = if prefer_array {
        (array_regex(), object_regex())
    } else {
        (object_regex(), array_regex())
    };

    let mut candidates: Vec<String> = Vec::with_capacity(3);
    for found in [primary.find(&cleaned), secondary.find(&cleaned)]
        .into_iter()
        .flatten()
    {
        candidates.push(found.as_str().to_string());
    }
    if !candidates.iter().any(|c| *c == cleaned) {
        candidates.push(cleaned);
    }
    candidates
}

/// Locate the outermost JSON-looking substring.
pub fn extract_json_candidate(raw: &str) -> Option<String> {
    let cleaned = strip_code_fences(raw);
    json_candidates(raw).into_iter().find(|c| *c != cleaned)
}

/// Parse structured data out of free-form model text.
///
/// The first candidate that deserializes wins; the error reported is the one from the
/// first candidate.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, ApiError> {
    let mut first_error = None;
    for candidate in json_candidates(raw) {
        match serde_json::from_str(&candidate) {
            Ok(value) => return Ok(value),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    let reason = first_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "empty response".to_string());
    Err(ApiError::ParseFailure(format!(
        "{} (input: {})",
        reason,
        truncate(raw.trim(), 120)
    )))
}

/// Parse, substituting `default` when the text holds no usable JSON.
pub fn parse_or_default<T: DeserializeOwned>(raw: &str, default: T) -> T {
    parse_or_else(raw, || default)
}

/// Parse, computing a fallback when the text holds no usable JSON.
pub fn parse_or_else<T: DeserializeOwned>(raw: &str, fallback: impl FnOnce() -> T) -> T {
    match parse_json(raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "Model output not parseable, using fallback value");
            fallback()
        }
    }
}

/// Parsed value together with the text it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Repaired<T> {
    pub value: T,
    pub raw: String,
    pub regenerations: u32,
}

/// Parse `initial`, regenerating upstream up to `max_extra_attempts` more times.
///
/// Upstream errors propagate unchanged; only parse failures trigger a regeneration.
/// The last parse failure is returned once the budget is spent.
pub async fn parse_with_retry<T, F, Fut>(
    initial: String,
    max_extra_attempts: u32,
    mut regenerate: F,
) -> Result<Repaired<T>, ApiError>
where
    T: DeserializeOwned,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, ApiError>>,
{
    let mut raw = initial;
    let mut regenerations = 0u32;
    loop {
        match parse_json::<T>(&raw) {
            Ok(value) => {
                return Ok(Repaired {
                    value,
                    raw,
                    regenerations,
                })
            }
            Err(err) if regenerations < max_extra_attempts => {
                regenerations += 1;
                debug!(attempt = regenerations, error = %err, "Regenerating unparseable output");
                raw = regenerate().await?;
            }
            Err(err) => return Err(err),
        }
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
