//! Serialization of attribute policies.
//!
//! A policy is the conjunction of every attribute pair supplied at
//! encryption time, written `(name:value AND name:value ...)`. There is no
//! disjunction, negation, or threshold form. Attribute names and values must
//! not contain `(`, `)`, `:` or the literal separator `" AND "`; the format
//! does no escaping.

use std::collections::BTreeMap;

use crate::AbeError;

/// Render attributes as a policy string. Pairs are emitted in key order so
/// the output is deterministic for a given attribute set.
pub fn generate(attributes: &BTreeMap<String, String>) -> String {
    let conditions: Vec<String> = attributes
        .iter()
        .map(|(key, value)| format!("{key}:{value}"))
        .collect();
    format!("({})", conditions.join(" AND "))
}

/// Parse a policy string back into its attribute pairs.
pub fn parse(policy: &str) -> Result<BTreeMap<String, String>, AbeError> {
    let stripped: String = policy.chars().filter(|c| !matches!(c, '(' | ')')).collect();

    let mut attributes = BTreeMap::new();
    for condition in stripped.split(" AND ") {
        let condition = condition.trim();
        if condition.is_empty() {
            continue;
        }
        let (key, value) = condition
            .split_once(':')
            .ok_or_else(|| AbeError::MalformedPolicy(policy.to_string()))?;
        attributes.insert(key.to_string(), value.to_string());
    }
    Ok(attributes)
}

/// True when every required pair has an exact equal in the held attributes.
/// Extra held attributes are ignored; an empty policy is satisfied by
/// anything.
pub fn satisfies(required: &BTreeMap<String, String>, held: &BTreeMap<String, String>) -> bool {
    required
        .iter()
        .all(|(key, value)| held.get(key).is_some_and(|held_value| held_value == value))
}
