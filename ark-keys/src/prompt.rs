//! Interactive password input and password policy.
//!
//! Prompting is a blocking suspension point: the calling command waits for
//! the user with no timeout.

use crate::error::{KeyError, KeyResult};
use std::io::{self, BufRead, IsTerminal, Write};

const MIN_PASSWORD_LEN: usize = 8;

/// Source of passwords. The terminal in production, a script in tests.
pub trait PasswordPrompt: Send + Sync {
    fn read_password(&self, prompt: &str) -> io::Result<String>;
}

/// Reads from the controlling terminal without echo, or one trimmed line
/// from stdin when input is piped.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn read_password(&self, prompt: &str) -> io::Result<String> {
        if io::stdin().is_terminal() {
            return rpassword::prompt_password(prompt);
        }

        let mut stderr = io::stderr();
        stderr.write_all(prompt.as_bytes())?;
        stderr.flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

/// Prompts for the master password. Empty input is rejected.
pub fn get_master_password(prompt: &dyn PasswordPrompt) -> KeyResult<String> {
    let password = prompt
        .read_password("Enter master password: ")
        .map_err(|e| KeyError::PromptFailed(e.to_string()))?;
    if password.is_empty() {
        return Err(KeyError::PromptFailed("password cannot be empty".into()));
    }
    Ok(password)
}

/// First-time setup: asks twice, enforces the minimum length.
pub fn setup_master_password(prompt: &dyn PasswordPrompt) -> KeyResult<String> {
    let password = prompt
        .read_password("Enter master password: ")
        .map_err(|e| KeyError::PromptFailed(e.to_string()))?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(KeyError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }

    let confirm = prompt
        .read_password("Confirm master password: ")
        .map_err(|e| KeyError::PromptFailed(e.to_string()))?;
    if password != confirm {
        return Err(KeyError::PromptFailed("passwords do not match".into()));
    }
    Ok(password)
}

pub fn get_password_with_confirmation(
    prompt: &dyn PasswordPrompt,
    message: &str,
    confirm_message: &str,
) -> KeyResult<String> {
    let password = prompt
        .read_password(message)
        .map_err(|e| KeyError::PromptFailed(e.to_string()))?;
    let confirm = prompt
        .read_password(confirm_message)
        .map_err(|e| KeyError::PromptFailed(e.to_string()))?;
    if password != confirm {
        return Err(KeyError::PromptFailed("passwords do not match".into()));
    }
    Ok(password)
}

/// Rejects passwords that are short or miss a character class.
pub fn validate_password_strength(password: &str) -> KeyResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(KeyError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }

    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| c.is_ascii_punctuation());

    let missing = if !has_upper {
        Some("uppercase letter")
    } else if !has_lower {
        Some("lowercase letter")
    } else if !has_digit {
        Some("digit")
    } else if !has_special {
        Some("special character")
    } else {
        None
    };

    match missing {
        Some(class) => Err(KeyError::WeakPassword(format!(
            "password must contain at least one {class}"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_rules() {
        assert!(validate_password_strength("Sh0rt!").is_err());
        assert!(validate_password_strength("alllowercase1!").is_err());
        assert!(validate_password_strength("ALLUPPERCASE1!").is_err());
        assert!(validate_password_strength("NoDigitsHere!").is_err());
        assert!(validate_password_strength("NoSpecial123").is_err());
        validate_password_strength("G00d-Enough").unwrap();
    }

    #[test]
    fn strength_error_names_missing_class() {
        let err = validate_password_strength("NoSpecial123").unwrap_err();
        assert!(err.to_string().contains("special character"));
    }
}
