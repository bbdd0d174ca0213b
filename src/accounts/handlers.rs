use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::{
    accounts::{
        dto::{
            ChangePasswordRequest, CustomJwtPairResponse, JwtPairResponse, LoginRequest,
            ProfileResponse, ProfileUpdateRequest, RefreshRequest, RegisterRequest,
            RegisteredUser, ResendActivationRequest, TokenLoginResponse, VerifyRequest,
        },
        extractors::{AuthUser, TokenUser},
        jwt::{JwtKeys, VerifyError},
        mailer::OutgoingEmail,
        password::{hash_password, verify_password},
        repo::{AuthToken, Profile, User},
    },
    error::ApiError,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register/", post(register))
        .route("/token/register/", post(token_register))
        .route("/token/login/", post(token_login))
        .route("/custom/token/login", post(token_login))
        .route("/custom/token/login/", post(token_login))
        .route("/discard/token/", post(discard_token))
        .route("/jwt/create/", post(jwt_create))
        .route("/jwt/refresh/", post(jwt_refresh))
        .route("/jwt/verify/", post(jwt_verify))
        .route("/jwt/custom/", post(jwt_custom))
        .route("/change/password", put(change_password))
        .route("/profile/", get(get_profile).put(update_profile))
        .route("/activation/confirm/:token/", get(activation_confirm))
        .route("/activation/resend/", post(activation_resend))
}

async fn create_account(
    state: &AppState,
    mut payload: RegisterRequest,
) -> Result<User, ApiError> {
    payload.validate()?;

    if User::find_by_email(&state.db, &payload.email)
        .await
        .map_err(ApiError::Internal)?
        .is_some()
    {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::field("email", "Email already registered"));
    }

    let hash = hash_password(&payload.password).map_err(ApiError::Internal)?;
    let user = User::create_with_profile(&state.db, &payload.email, &hash)
        .await
        .map_err(ApiError::Internal)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user)
}

fn enqueue_activation_email(state: &AppState, user: &User) -> Result<(), ApiError> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign_activation(user.id).map_err(ApiError::Internal)?;
    let link = format!("{}/activation/confirm/{}/", state.config.base_url, token);
    state.mailer.enqueue(OutgoingEmail {
        to: user.email.clone(),
        subject: "Account activation".into(),
        body: format!(
            "Hello,\n\nUse the link below to activate your account:\n{link}\n\n\
             If you did not request this, please ignore this email.\n"
        ),
    });
    Ok(())
}

#[instrument(skip(state, payload))]
async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisteredUser>), ApiError> {
    let user = create_account(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(RegisteredUser { email: user.email })))
}

#[instrument(skip(state, payload))]
async fn token_register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisteredUser>), ApiError> {
    let user = create_account(&state, payload).await?;
    enqueue_activation_email(&state, &user)?;
    Ok((StatusCode::CREATED, Json(RegisteredUser { email: user.email })))
}

/// Deliberately identical failure for unknown email, wrong password and
/// inactive account.
fn login_failed() -> ApiError {
    ApiError::NonField("Unable to log in with provided credentials.".into())
}

async fn authenticate(state: &AppState, payload: &LoginRequest) -> Result<User, ApiError> {
    let email = payload.email.trim().to_lowercase();
    let user = User::find_by_email(&state.db, &email)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| {
            warn!(email = %email, "login unknown email");
            login_failed()
        })?;

    let ok = verify_password(&payload.password, &user.password_hash)
        .map_err(ApiError::Internal)?;
    if !ok || !user.is_active {
        warn!(email = %email, user_id = %user.id, "login rejected");
        return Err(login_failed());
    }
    Ok(user)
}

#[instrument(skip(state, payload))]
async fn token_login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenLoginResponse>, ApiError> {
    let user = authenticate(&state, &payload).await?;
    let token = AuthToken::get_or_create(&state.db, user.id)
        .await
        .map_err(ApiError::Internal)?;
    info!(user_id = %user.id, "opaque token issued");
    Ok(Json(TokenLoginResponse {
        user_id: user.id,
        token,
        email: user.email,
    }))
}

#[instrument(skip(state, caller))]
async fn discard_token(
    State(state): State<AppState>,
    caller: TokenUser,
) -> Result<StatusCode, ApiError> {
    AuthToken::delete(&state.db, &caller.token)
        .await
        .map_err(ApiError::Internal)?;
    info!(user_id = %caller.user_id, "opaque token discarded");
    Ok(StatusCode::NO_CONTENT)
}

/// JWT endpoints answer 401 on bad credentials, unlike the opaque-token login.
fn jwt_login_failed() -> ApiError {
    ApiError::Unauthorized("No active account found with the given credentials".into())
}

async fn jwt_pair(state: &AppState, payload: &LoginRequest) -> Result<(User, String, String), ApiError> {
    let user = authenticate(state, payload).await.map_err(|e| match e {
        ApiError::NonField(_) => jwt_login_failed(),
        other => other,
    })?;
    let keys = JwtKeys::from_ref(state);
    let access = keys.sign_access(user.id).map_err(ApiError::Internal)?;
    let refresh = keys.sign_refresh(user.id).map_err(ApiError::Internal)?;
    Ok((user, access, refresh))
}

#[instrument(skip(state, payload))]
async fn jwt_create(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<JwtPairResponse>, ApiError> {
    let (_, access, refresh) = jwt_pair(&state, &payload).await?;
    Ok(Json(JwtPairResponse { access, refresh }))
}

#[instrument(skip(state, payload))]
async fn jwt_custom(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<CustomJwtPairResponse>, ApiError> {
    let (user, access, refresh) = jwt_pair(&state, &payload).await?;
    Ok(Json(CustomJwtPairResponse {
        access,
        refresh,
        email: user.email,
        user_id: user.id,
    }))
}

#[instrument(skip(state, payload))]
async fn jwt_refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<JwtPairResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh)
        .map_err(|_| ApiError::Unauthorized("Token is invalid or expired".into()))?;
    let access = keys.sign_access(claims.sub).map_err(ApiError::Internal)?;
    let refresh = keys.sign_refresh(claims.sub).map_err(ApiError::Internal)?;
    Ok(Json(JwtPairResponse { access, refresh }))
}

#[instrument(skip(state, payload))]
async fn jwt_verify(
    State(state): State<AppState>,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    keys.verify(&payload.token)
        .map_err(|_| ApiError::Unauthorized("Token is invalid or expired".into()))?;
    Ok(Json(json!({})))
}

#[instrument(skip(state, payload))]
async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound)?;

    payload.validate(&user.email)?;

    let ok = verify_password(&payload.old_password, &user.password_hash)
        .map_err(ApiError::Internal)?;
    if !ok {
        return Err(ApiError::field("old_password", "your password is wrong"));
    }

    let hash = hash_password(&payload.new_password).map_err(ApiError::Internal)?;
    User::update_password(&state.db, user.id, &hash)
        .await
        .map_err(ApiError::Internal)?;
    info!(user_id = %user.id, "password changed");
    Ok(Json(json!({ "message": "password changed successfully" })))
}

#[instrument(skip(state))]
async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound)?;
    let profile = Profile::find_by_user(&state.db, user_id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(profile_response(&user.email, profile)))
}

#[instrument(skip(state, payload))]
async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ProfileUpdateRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound)?;
    let profile = Profile::update(
        &state.db,
        user_id,
        payload.first_name.as_deref(),
        payload.last_name.as_deref(),
        payload.bio.as_deref(),
        payload.image.as_deref(),
    )
    .await
    .map_err(ApiError::Internal)?
    .ok_or(ApiError::NotFound)?;
    Ok(Json(profile_response(&user.email, profile)))
}

fn profile_response(email: &str, profile: Profile) -> ProfileResponse {
    ProfileResponse {
        user_id: profile.user_id,
        email: email.to_string(),
        first_name: profile.first_name,
        last_name: profile.last_name,
        bio: profile.bio,
        image: profile.image,
    }
}

#[instrument(skip(state, token))]
async fn activation_confirm(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify_activation(&token).map_err(|e| match e {
        VerifyError::Expired => ApiError::token_expired(),
        VerifyError::Invalid => ApiError::token_invalid(),
    })?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound)?;

    if user.is_verified {
        return Ok(Json(
            json!({ "detail": "your account has already been activated" }),
        ));
    }

    // Persist before responding so the flag survives a crash right after the
    // response is written.
    User::set_verified(&state.db, user.id)
        .await
        .map_err(ApiError::Internal)?;
    info!(user_id = %user.id, "account activated");

    state.mailer.enqueue(OutgoingEmail {
        to: user.email.clone(),
        subject: "Your account has been activated".into(),
        body: "Hello,\n\nYour account has been activated successfully.\n".into(),
    });

    Ok(Json(
        json!({ "detail": "your account has been activated successfully" }),
    ))
}

#[instrument(skip(state, payload))]
async fn activation_resend(
    State(state): State<AppState>,
    Json(payload): Json<ResendActivationRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    let user = User::find_by_email(&state.db, &email)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::field("email", "Email not registered"))?;

    if user.is_verified {
        return Err(ApiError::field("email", "Email already verified"));
    }

    enqueue_activation_email(&state, &user)?;
    Ok(Json(json!({ "detail": "activation email resent" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn registered_user_response_exposes_email_only() {
        let response = RegisteredUser {
            email: "testuser@example.com".into(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, json!({ "email": "testuser@example.com" }));
    }

    #[test]
    fn token_login_response_serialization() {
        let response = TokenLoginResponse {
            user_id: uuid::Uuid::new_v4(),
            token: "c1b2f1e5cf3c40d292f49d".into(),
            email: "testuser@example.com".into(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("user_id").is_some());
        assert!(json.get("token").is_some());
        assert_eq!(json["email"], "testuser@example.com");
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_fail_identically() {
        // Both paths funnel through login_failed(); the serialized responses
        // must be byte-identical so callers cannot probe which emails exist.
        let a = login_failed().into_response();
        let b = login_failed().into_response();
        assert_eq!(a.status(), b.status());
        let a = axum::body::to_bytes(a.into_body(), usize::MAX).await.unwrap();
        let b = axum::body::to_bytes(b.into_body(), usize::MAX).await.unwrap();
        assert_eq!(a, b);
    }
}
