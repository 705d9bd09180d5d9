use axum::{
    extract::{rejection::{JsonRejection, PathRejection}, Path, State},
    http::HeaderMap,
    Json,
};
use rusqlite::params;
use urbalert_shared::{SetRole, User};

use crate::{auth, db, error::AppError, AppState};

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<User>>, AppError> {
    auth::session(&state, &headers).await?.require_admin()?;

    let users = db::run(&state.db, |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY created_at ASC, id ASC",
            db::USER_COLUMNS
        ))?;

        let rows = stmt
            .query_map([], db::user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    })
    .await?;

    Ok(Json(users))
}

/// PUT /api/admin/users/:id/role
pub async fn set_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: Result<Path<String>, PathRejection>,
    payload: Result<Json<SetRole>, JsonRejection>,
) -> Result<Json<User>, AppError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    let session = auth::session(&state, &headers).await?;
    session.require_admin()?;

    let role = payload.role;
    let user = db::run(&state.db, move |conn| {
        let affected = conn.execute(
            "UPDATE users SET role = ?2, updated_at = datetime('now') WHERE id = ?1",
            params![id, role.as_str()],
        )?;

        if affected == 0 {
            return Err(AppError::NotFound("user"));
        }

        db::find_user(conn, &id)
    })
    .await?;

    tracing::info!(admin = %session.user_id, user_id = %user.id, role = %user.role, "role changed");
    Ok(Json(user))
}
