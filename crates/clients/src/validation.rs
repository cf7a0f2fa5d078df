use crate::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;

static CLIENT_ID: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(_[a-z0-9]+)*$").ok());

pub fn validate_non_empty(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(())
}

/// Client ids must be usable as file names, map keys and URL segments:
/// groups of `[a-z0-9]` joined by single underscores (`chrome`, `node_js`).
pub fn validate_client_id(id: &str) -> Result<(), ValidationError> {
    validate_non_empty(id, "Client ID")?;
    let valid = CLIENT_ID
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(id));
    if !valid {
        return Err(ValidationError::InvalidId(id.to_string()));
    }
    Ok(())
}

pub fn validate_client_name(name: &str) -> Result<(), ValidationError> {
    validate_non_empty(name, "name")
}
