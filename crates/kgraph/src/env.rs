use std::env;

pub(crate) const WORKSPACE_ALIGNMENT: &str = "KGRAPH_WORKSPACE_ALIGNMENT";
pub(crate) const PLAN_CACHE: &str = "KGRAPH_PLAN_CACHE";
pub(crate) const DUMP_PLANS: &str = "KGRAPH_DUMP_PLANS";

pub(crate) fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

/// Reads `key` from the process environment, treating blank values as unset.
pub(crate) fn var(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}
