use crate::core::error::UserError;

/// Usernames are email addresses; RFC 5321 caps a path at 254 octets
pub const MAX_USERNAME_LEN: usize = 254;

/// bcrypt ignores everything past the 72nd byte
pub const MAX_PASSWORD_LEN: usize = 72;

/// Canonical form used for storage, lookup and uniqueness
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Normalize and validate a username, returning the canonical form
pub fn validate_username(username: &str) -> Result<String, UserError> {
    let username = normalize_username(username);

    if username.is_empty() {
        return Err(UserError::invalid_arguments("username must not be empty"));
    }

    if username.len() > MAX_USERNAME_LEN {
        return Err(UserError::invalid_arguments(format!(
            "username longer than {} bytes",
            MAX_USERNAME_LEN
        )));
    }

    if username.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(UserError::invalid_arguments("username contains whitespace"));
    }

    match username.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {}
        _ => return Err(UserError::invalid_arguments("username must be an email address")),
    }

    Ok(username)
}

pub fn validate_password(password: &str) -> Result<(), UserError> {
    if password.is_empty() {
        return Err(UserError::invalid_arguments("password must not be empty"));
    }

    if password.len() > MAX_PASSWORD_LEN {
        return Err(UserError::invalid_arguments(format!(
            "password longer than {} bytes",
            MAX_PASSWORD_LEN
        )));
    }

    Ok(())
}
