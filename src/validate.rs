//! Input rules applied by callers before they reach the stores. The stores
//! themselves assume well-formed names.

use crate::error::{AgoraError, Result};

pub const MAX_NAME_LEN: usize = 64;
pub const MAX_DESCRIPTION_LEN: usize = 500;
pub const MAX_MESSAGE_LEN: usize = 10_000;

fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AgoraError::Validation(format!("{kind} name must not be empty")));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AgoraError::Validation(format!(
            "{kind} name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AgoraError::Validation(format!(
            "{kind} name '{name}' may only contain ASCII letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}

pub fn validate_room_name(name: &str) -> Result<()> {
    validate_name("room", name)
}

pub fn validate_agent_name(name: &str) -> Result<()> {
    validate_name("agent", name)
}

pub fn validate_description(description: &str) -> Result<()> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(AgoraError::Validation(format!(
            "description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_message(body: &str) -> Result<()> {
    if body.trim().is_empty() {
        return Err(AgoraError::Validation("message must not be empty".into()));
    }
    if body.chars().count() > MAX_MESSAGE_LEN {
        return Err(AgoraError::Validation(format!(
            "message must be at most {MAX_MESSAGE_LEN} characters"
        )));
    }
    Ok(())
}
