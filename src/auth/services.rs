use lazy_static::lazy_static;
use regex::Regex;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::dto::{AuthResponse, PublicUser};
use super::jwt::JwtKeys;
use super::repo_types::User;
use crate::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_NAME_CHARS: usize = 100;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Checks registration input and returns the trimmed name.
pub(crate) fn validate_registration<'a>(
    name: &'a str,
    email: &str,
    password: &str,
) -> Result<&'a str, AppError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::Validation("Invalid name".into()));
    }
    if !is_valid_email(email) {
        return Err(AppError::Validation("Invalid email".into()));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation("Password too short".into()));
    }
    Ok(name)
}

pub(crate) fn issue_tokens(keys: &JwtKeys, user: User) -> Result<AuthResponse, AppError> {
    let access_token = keys.sign_access(user.id)?;
    let refresh_token = keys.sign_refresh(user.id)?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: PublicUser::from(user),
    })
}

/// Loads the caller and refuses disabled accounts.
pub async fn ensure_enabled(db: &PgPool, user_id: Uuid) -> Result<User, AppError> {
    let user = User::find_by_id(db, user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;
    if user.disabled {
        warn!(%user_id, "disabled account refused");
        return Err(AppError::Forbidden("Account is disabled".into()));
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use time::OffsetDateTime;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a.b+tag@sub.example.co"));
        assert!(!is_valid_email("alice@example"));
        assert!(!is_valid_email("alice example@x.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn registration_rules() {
        assert_eq!(
            validate_registration(" Alice ", "alice@example.com", "longenough").unwrap(),
            "Alice"
        );
        assert!(matches!(
            validate_registration("  ", "alice@example.com", "longenough"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_registration("Alice", "nope", "longenough"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_registration("Alice", "alice@example.com", "short"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn issued_tokens_belong_to_user() {
        let keys = JwtKeys::from(&JwtConfig {
            secret: "s".into(),
            issuer: "i".into(),
            audience: "a".into(),
            ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        });
        let user = User {
            id: Uuid::new_v4(),
            name: "Bob".into(),
            email: "bob@example.com".into(),
            password_hash: "x".into(),
            disabled: false,
            created_at: OffsetDateTime::now_utc(),
        };
        let id = user.id;
        let res = issue_tokens(&keys, user).unwrap();
        assert_eq!(keys.verify(&res.access_token).unwrap().sub, id);
        assert_eq!(keys.verify_refresh(&res.refresh_token).unwrap().sub, id);
        assert_eq!(res.user.email, "bob@example.com");
    }
}
