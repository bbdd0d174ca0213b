use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

const MIN_LENGTH: usize = 8;

// Short list of the most frequently seen passwords. Enough to catch the
// obvious choices without shipping a wordlist file.
const COMMON_PASSWORDS: &[&str] = &[
    "password", "12345678", "123456789", "1234567890", "qwerty123", "password1",
    "iloveyou", "sunshine", "princess", "football", "baseball", "superman",
    "trustno1", "welcome1", "letmein1", "dragon12", "master12", "monkey12",
    "abc12345", "changeme",
];

/// Strength policy applied on registration and password change: minimum
/// length, not entirely numeric, not on the common list, not too close to the
/// account email. Returns every violated rule, not just the first.
pub fn validate_strength(password: &str, email: &str) -> Vec<String> {
    let mut messages = Vec::new();

    if password.chars().count() < MIN_LENGTH {
        messages.push(format!(
            "This password is too short. It must contain at least {MIN_LENGTH} characters."
        ));
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        messages.push("This password is entirely numeric.".to_string());
    }
    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        messages.push("This password is too common.".to_string());
    }
    if too_similar_to_email(&lowered, email) {
        messages.push("The password is too similar to the email.".to_string());
    }

    messages
}

fn too_similar_to_email(password_lower: &str, email: &str) -> bool {
    let local = email.split('@').next().unwrap_or_default().to_lowercase();
    if local.len() < 4 {
        return false;
    }
    password_lower.contains(&local) || local.contains(password_lower)
}
