use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// User record. The hash never leaves the server in JSON.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_verified: bool,
    pub created_date: OffsetDateTime,
    pub updated_date: OffsetDateTime,
}

/// 1:1 companion record holding the descriptive fields.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub user_id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub created_date: OffsetDateTime,
    pub updated_date: OffsetDateTime,
}

/// Server-side opaque bearer token, at most one per user.
#[derive(Debug, Clone, FromRow)]
pub struct AuthToken {
    pub token: String,
    pub user_id: Uuid,
    pub created_date: OffsetDateTime,
}

const USER_COLUMNS: &str = "id, email, password_hash, is_active, is_staff, is_superuser, \
                            is_verified, created_date, updated_date";

impl User {
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a user and its empty profile row in one transaction, so a
    /// half-created account can never be observed.
    pub async fn create_with_profile(
        db: &PgPool,
        email: &str,
        password_hash: &str,
    ) -> anyhow::Result<User> {
        let mut tx = db.begin().await?;
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO profiles (user_id) VALUES ($1)")
            .bind(user.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(user)
    }

    /// Flip the verified flag. Idempotent: re-running on a verified user is a
    /// no-op update.
    pub async fn set_verified(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET is_verified = TRUE, updated_date = now() WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn update_password(db: &PgPool, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_date = now() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(db)
            .await?;
        Ok(())
    }
}

const PROFILE_COLUMNS: &str =
    "user_id, first_name, last_name, bio, image, created_date, updated_date";

impl Profile {
    pub async fn find_by_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(profile)
    }

    pub async fn update(
        db: &PgPool,
        user_id: Uuid,
        first_name: Option<&str>,
        last_name: Option<&str>,
        bio: Option<&str>,
        image: Option<&str>,
    ) -> anyhow::Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "UPDATE profiles
             SET first_name = $2, last_name = $3, bio = $4, image = $5, updated_date = now()
             WHERE user_id = $1
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(user_id)
        .bind(first_name)
        .bind(last_name)
        .bind(bio)
        .bind(image)
        .fetch_optional(db)
        .await?;
        Ok(profile)
    }
}

pub(crate) fn generate_token_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(40)
        .map(char::from)
        .collect()
}

impl AuthToken {
    /// Get-or-create, one live token per user. Two concurrent creators race on
    /// the unique user_id constraint; the loser's insert returns no row and it
    /// re-reads the winner's token.
    pub async fn get_or_create(db: &PgPool, user_id: Uuid) -> anyhow::Result<String> {
        if let Some(existing) = Self::find_by_user(db, user_id).await? {
            return Ok(existing.token);
        }

        let key = generate_token_key();
        let inserted = sqlx::query_scalar::<_, String>(
            "INSERT INTO auth_tokens (token, user_id) VALUES ($1, $2)
             ON CONFLICT (user_id) DO NOTHING
             RETURNING token",
        )
        .bind(&key)
        .bind(user_id)
        .fetch_optional(db)
        .await?;

        match inserted {
            Some(token) => Ok(token),
            None => {
                let existing = Self::find_by_user(db, user_id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("auth token vanished after conflict"))?;
                Ok(existing.token)
            }
        }
    }

    pub async fn find_by_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Option<AuthToken>> {
        let row = sqlx::query_as::<_, AuthToken>(
            "SELECT token, user_id, created_date FROM auth_tokens WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn find_by_key(db: &PgPool, token: &str) -> anyhow::Result<Option<AuthToken>> {
        let row = sqlx::query_as::<_, AuthToken>(
            "SELECT token, user_id, created_date FROM auth_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    pub async fn delete(db: &PgPool, token: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM auth_tokens WHERE token = $1")
            .bind(token)
            .execute(db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_keys_are_40_alphanumeric_chars_and_unique() {
        let a = generate_token_key();
        let b = generate_token_key();
        assert_eq!(a.len(), 40);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn user_serialization_never_exposes_the_hash() {
        let user = User {
            id: Uuid::new_v4(),
            email: "user@example.com".into(),
            password_hash: "argon2-secret".into(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            is_verified: false,
            created_date: OffsetDateTime::UNIX_EPOCH,
            updated_date: OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2-secret"));
        assert!(json.contains("user@example.com"));
    }
}
