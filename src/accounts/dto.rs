use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accounts::password::validate_strength;
use crate::error::{ApiError, FieldErrors};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Request body for registration, with password confirmation.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub password2: String,
}

impl RegisterRequest {
    /// Normalize the email and apply every registration rule, collecting all
    /// field errors rather than stopping at the first. Email uniqueness is
    /// checked by the handler, which owns the DB.
    pub fn validate(&mut self) -> Result<(), ApiError> {
        self.email = self.email.trim().to_lowercase();

        let mut errors = FieldErrors::new();
        if !is_valid_email(&self.email) {
            errors
                .entry("email".into())
                .or_default()
                .push("Enter a valid email address".into());
        }
        if self.password != self.password2 {
            errors
                .entry("password2".into())
                .or_default()
                .push("Passwords do not match".into());
        }
        let strength = validate_strength(&self.password, &self.email);
        if !strength.is_empty() {
            errors.insert("password".into(), strength);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}

/// Registration response: the email and nothing else.
#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Opaque-token login response.
#[derive(Debug, Serialize)]
pub struct TokenLoginResponse {
    pub user_id: Uuid,
    pub token: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct JwtPairResponse {
    pub access: String,
    pub refresh: String,
}

/// `/jwt/custom/` payload: the pair plus the caller's identity echoed as plain
/// response fields.
#[derive(Debug, Serialize)]
pub struct CustomJwtPairResponse {
    pub access: String,
    pub refresh: String,
    pub email: String,
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub new_password1: String,
}

impl ChangePasswordRequest {
    /// Confirmation and strength rules. The old-password check happens in the
    /// handler against the stored hash.
    pub fn validate(&self, email: &str) -> Result<(), ApiError> {
        if self.new_password != self.new_password1 {
            return Err(ApiError::field("password", "Passwords do not match"));
        }
        let strength = validate_strength(&self.new_password, email);
        if !strength.is_empty() {
            let mut errors = FieldErrors::new();
            errors.insert("password".into(), strength);
            return Err(ApiError::Validation(errors));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ResendActivationRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user_id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdateRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub image: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, password: &str, password2: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: password.into(),
            password2: password2.into(),
        }
    }

    fn field_errors(err: ApiError) -> FieldErrors {
        match err {
            ApiError::Validation(errors) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_passwords_yield_password2_error_even_with_valid_email() {
        let mut req = request("testuser@example.com", "Password1!", "Password2!");
        let errors = field_errors(req.validate().unwrap_err());
        assert_eq!(errors["password2"], vec!["Passwords do not match"]);
    }

    #[test]
    fn weak_password_yields_password_error_when_confirmation_matches() {
        let mut req = request("testuser@example.com", "123", "123");
        let errors = field_errors(req.validate().unwrap_err());
        assert!(errors.contains_key("password"));
        assert!(!errors.contains_key("password2"));
    }

    #[test]
    fn email_is_normalized_before_validation() {
        let mut req = request("  TestUser@Example.COM ", "StrongPassword123!", "StrongPassword123!");
        req.validate().expect("valid request");
        assert_eq!(req.email, "testuser@example.com");
    }

    #[test]
    fn malformed_email_yields_email_error() {
        let mut req = request("not-an-email", "StrongPassword123!", "StrongPassword123!");
        let errors = field_errors(req.validate().unwrap_err());
        assert!(errors.contains_key("email"));
    }

    #[test]
    fn all_violations_are_collected_at_once() {
        let mut req = request("not-an-email", "123", "456");
        let errors = field_errors(req.validate().unwrap_err());
        assert!(errors.contains_key("email"));
        assert!(errors.contains_key("password"));
        assert!(errors.contains_key("password2"));
    }

    #[test]
    fn change_password_mismatch_is_rejected() {
        let req = ChangePasswordRequest {
            old_password: "OldPassword123!".into(),
            new_password: "NewPassword123!".into(),
            new_password1: "Different123!".into(),
        };
        let errors = field_errors(req.validate("user@example.com").unwrap_err());
        assert_eq!(errors["password"], vec!["Passwords do not match"]);
    }

    #[test]
    fn change_password_enforces_strength_policy() {
        let req = ChangePasswordRequest {
            old_password: "OldPassword123!".into(),
            new_password: "123".into(),
            new_password1: "123".into(),
        };
        let errors = field_errors(req.validate("user@example.com").unwrap_err());
        assert!(errors.contains_key("password"));
    }
}
