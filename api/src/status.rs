use axum::{
    extract::{rejection::{JsonRejection, PathRejection}, Path, State},
    http::HeaderMap,
    Json,
};
use rusqlite::{params, Connection, TransactionBehavior};
use urbalert_shared::{Report, ReportStatus, SetStatus};

use crate::{auth, db, error::AppError, AppState};

/// Moves a report to `next`, refusing anything but a forward transition.
/// Re-applying the current status returns the report untouched.
pub fn set_status(conn: &mut Connection, report_id: i64, next: ReportStatus) -> Result<Report, AppError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let report = db::find_report(&tx, report_id)?;
    if report.status == next {
        return Ok(report);
    }
    if !report.status.can_transition_to(next) {
        return Err(AppError::InvalidTransition {
            from: report.status,
            to: next,
        });
    }

    let affected = tx.execute(
        "UPDATE reports SET status = ?3, updated_at = datetime('now')
         WHERE id = ?1 AND status = ?2",
        params![report_id, report.status.as_str(), next.as_str()],
    )?;
    if affected == 0 {
        return Err(AppError::NotFound("report"));
    }

    let updated = db::find_report(&tx, report_id)?;
    tx.commit()?;

    Ok(updated)
}

/// PUT /api/reports/:id/status — authorities only
pub async fn put_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    report_id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<SetStatus>, JsonRejection>,
) -> Result<Json<Report>, AppError> {
    let Path(report_id) = report_id?;
    let Json(payload) = payload?;
    let session = auth::session(&state, &headers).await?;
    session.require_admin()?;

    let next = payload.status;
    let report = db::run(&state.db, move |conn| set_status(conn, report_id, next)).await?;

    tracing::info!(report_id, admin = %session.user_id, status = %report.status, "status changed");
    Ok(Json(report))
}
