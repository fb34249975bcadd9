//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted nickname, in characters.
const MAX_NICKNAME_LEN: usize = 24;

/// Validates that a nickname is non-blank and reasonably short.
///
/// Nicknames are free-form otherwise; rejoin matching compares them
/// case-insensitively.
pub fn validate_nickname(nickname: &str) -> Result<(), ValidationError> {
    let trimmed = nickname.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("nickname_blank");
        err.message = Some("Nickname must not be empty".into());
        return Err(err);
    }

    if trimmed.chars().count() > MAX_NICKNAME_LEN {
        let mut err = ValidationError::new("nickname_length");
        err.message =
            Some(format!("Nickname must be at most {MAX_NICKNAME_LEN} characters").into());
        return Err(err);
    }

    Ok(())
}
