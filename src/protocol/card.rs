//! Agent card parsing and validation.
//!
//! Real agents vary a lot in how complete their cards are, so parsing is
//! two-staged: a strict serde decode, then a lenient rebuild from whatever
//! recognisable fields are present.

use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::types::{default_card_version, AgentCard, Capability, Provider};

const UNKNOWN_AGENT: &str = "Unknown Agent";

/// Normalize an agent base URL.
///
/// Trims whitespace, prefixes `http://` when no scheme is present and
/// strips trailing slashes. `"h:1/"` and `"http://h:1"` normalize equally.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let with_scheme = if has_http_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };
    with_scheme.trim_end_matches('/').to_string()
}

/// True for `http://` and `https://` prefixes, case-insensitive
pub fn has_http_scheme(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Registration check on a parsed card: non-empty `name` and an http(s) `url`.
pub fn validate_card(card: &AgentCard) -> Result<(), String> {
    if card.name.trim().is_empty() {
        return Err("card has no name".to_string());
    }
    let url = card.url.trim();
    if url.is_empty() || !has_http_scheme(url) || url::Url::parse(url).is_err() {
        return Err(format!("card url '{}' is not an http(s) url", card.url));
    }
    Ok(())
}

/// Parse a card body fetched from `base_url`.
///
/// Returns `None` only when the body is not a JSON object at all; every
/// object yields a card, falling back to a minimal one built from the
/// recognisable subset of fields.
pub fn parse_card(base_url: &str, body: Value) -> Option<AgentCard> {
    if !body.is_object() {
        return None;
    }

    let mut card = match serde_json::from_value::<AgentCard>(body.clone()) {
        Ok(card) => card,
        Err(e) => {
            warn!(url = %base_url, "Agent card failed strict parsing, using minimal card: {}", e);
            minimal_card(base_url, &body)
        }
    };

    if card.url.trim().is_empty() {
        card.url = base_url.to_string();
    }
    Some(card)
}

fn minimal_card(base_url: &str, body: &Value) -> AgentCard {
    let string_field = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_string);

    let capabilities = body
        .get("capabilities")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| match serde_json::from_value::<Capability>(entry.clone()) {
                    Ok(cap) => Some(cap),
                    Err(e) => {
                        debug!(url = %base_url, "Skipping unparsable capability: {}", e);
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let provider = body
        .get("provider")
        .and_then(|p| serde_json::from_value::<Provider>(p.clone()).ok());

    let metadata: HashMap<String, Value> = body
        .get("metadata")
        .and_then(Value::as_object)
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    AgentCard {
        name: string_field("name").unwrap_or_else(|| UNKNOWN_AGENT.to_string()),
        description: Some(string_field("description").unwrap_or_default()),
        url: base_url.to_string(),
        version: string_field("version").unwrap_or_else(default_card_version),
        provider,
        documentation_url: None,
        capabilities,
        protocols: HashMap::new(),
        metadata,
    }
}
