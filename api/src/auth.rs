use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use urbalert_shared::{UpdateProfile, User, UserRole};

use crate::{db, error::AppError, AppState};

const MAX_DISPLAY_NAME_CHARS: usize = 100;

/// Sanitised display name, or `None` if nothing is left after cleaning or the
/// name is longer than allowed.
fn clean_display_name(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return None;
    }

    let name = ammonia::clean(raw).trim().to_string();
    (!name.is_empty()).then_some(name)
}

// ── Token claims ──

/// Claims of a bearer token issued by the identity provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // provider user id
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub exp: usize,
}

/// The authenticated caller, resolved once per request and handed to the
/// operations that need it.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub role: UserRole,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Unauthorized)
        }
    }
}

// ── Extract authenticated caller from Authorization header ──

pub fn extract_claims(headers: &HeaderMap, jwt_secret: &str) -> Result<Claims, AppError> {
    let token = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthenticated)?;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        AppError::Unauthenticated
    })?;

    Ok(data.claims)
}

/// Verifies the bearer token and loads the caller's role from their profile.
pub async fn session(state: &AppState, headers: &HeaderMap) -> Result<Session, AppError> {
    let claims = extract_claims(headers, &state.jwt_secret)?;

    let user = db::run(&state.db, move |conn| db::find_user(conn, &claims.sub)).await?;

    Ok(Session {
        user_id: user.id,
        role: user.role,
    })
}

// ── Handlers ──

/// POST /api/auth/session — upsert the caller's profile after sign-in
pub async fn start_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<User>, AppError> {
    let claims = extract_claims(&headers, &state.jwt_secret)?;
    let display_name = claims.name.as_deref().and_then(clean_display_name);

    let user = db::run(&state.db, move |conn| {
        conn.execute(
            "INSERT INTO users (id, email, display_name, last_login_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(id) DO UPDATE SET
                email = COALESCE(?2, email),
                last_login_at = datetime('now')",
            params![claims.sub, claims.email, display_name],
        )?;

        db::find_user(conn, &claims.sub)
    })
    .await?;

    tracing::info!(user_id = %user.id, "session started");
    Ok(Json(user))
}

/// GET /api/auth/me — return current user
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<User>, AppError> {
    let claims = extract_claims(&headers, &state.jwt_secret)?;

    let user = db::run(&state.db, move |conn| db::find_user(conn, &claims.sub)).await?;

    Ok(Json(user))
}

/// PATCH /api/auth/me — edit display name or phone number
pub async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<UpdateProfile>, JsonRejection>,
) -> Result<Json<User>, AppError> {
    let Json(payload) = payload?;
    let session = session(&state, &headers).await?;

    let display_name = payload
        .display_name
        .map(|n| {
            clean_display_name(&n).ok_or_else(|| {
                AppError::Validation(format!(
                    "Display name must be between 1 and {MAX_DISPLAY_NAME_CHARS} characters"
                ))
            })
        })
        .transpose()?;
    let phone_number = payload.phone_number.map(|p| p.trim().to_string());

    let user = db::run(&state.db, move |conn| {
        conn.execute(
            "UPDATE users SET
                display_name = COALESCE(?2, display_name),
                phone_number = COALESCE(?3, phone_number),
                updated_at = datetime('now')
             WHERE id = ?1",
            params![session.user_id, display_name, phone_number],
        )?;

        db::find_user(conn, &session.user_id)
    })
    .await?;

    Ok(Json(user))
}
