//! Input validation for ids that end up in file paths.
//!
//! Agent ids, store names and task ids are all used to build paths under the
//! store root, so they are checked before use to rule out path traversal and
//! reserved device names.

use crate::errors::{Result, StoreError};

/// Maximum allowed length for ids.
pub const MAX_ID_LENGTH: usize = 128;

/// Reserved names that cannot be used as IDs (case-insensitive).
const RESERVED_NAMES: &[&str] = &[
    ".", "..", "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7",
    "com8", "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Validates that an ID is safe for use in file paths.
///
/// An ID is valid if:
/// - It is not empty
/// - It is no longer than MAX_ID_LENGTH characters
/// - It contains only alphanumeric characters, dashes, dots and underscores
/// - It does not start with a dot and is not a reserved system name
///
/// # Examples
///
/// ```
/// use waypoint::validation::validate_id;
///
/// assert!(validate_id("agent-001").is_ok());
/// assert!(validate_id("task_2024.3").is_ok());
/// assert!(validate_id("").is_err());
/// assert!(validate_id("../etc/passwd").is_err());
/// ```
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(StoreError::Validation("ID cannot be empty".to_string()));
    }

    if id.len() > MAX_ID_LENGTH {
        return Err(StoreError::Validation(format!(
            "ID too long: {} characters (max {MAX_ID_LENGTH})",
            id.len()
        )));
    }

    let valid_chars = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if !valid_chars || id.starts_with('.') {
        return Err(StoreError::Validation(format!(
            "ID '{id}' contains invalid characters. Use only alphanumeric characters, dashes (-), dots (.) and underscores (_), not starting with a dot"
        )));
    }

    let id_lower = id.to_lowercase();
    if RESERVED_NAMES.contains(&id_lower.as_str()) {
        return Err(StoreError::Validation(format!(
            "ID '{id}' uses a reserved name"
        )));
    }

    Ok(())
}

/// Store names additionally may not collide with the transaction log or
/// the archive directory.
pub fn validate_store_name(name: &str) -> Result<()> {
    validate_id(name)?;
    if name == "transaction_log" || name == "archive" || name.ends_with(".json") {
        return Err(StoreError::Validation(format!(
            "store name '{name}' is reserved"
        )));
    }
    Ok(())
}

/// Clap value parser for IDs.
pub fn clap_id_validator(s: &str) -> std::result::Result<String, String> {
    validate_id(s).map_err(|e| e.to_string())?;
    Ok(s.to_string())
}
