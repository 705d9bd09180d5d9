use axum::{
    extract::{rejection::{JsonRejection, PathRejection}, Path, State},
    http::HeaderMap,
    Json,
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use urbalert_shared::{CastVote, Report, Vote, VoteType};

use crate::{auth, db, error::AppError, AppState};

/// Change to a report's count when a user casts `next` over `previous`.
///
/// A first vote counts once, switching direction undoes the old vote as well,
/// and repeating the same direction changes nothing.
pub fn vote_delta(previous: Option<VoteType>, next: VoteType) -> i64 {
    match previous {
        None => next.weight(),
        Some(prev) if prev == next => 0,
        Some(_) => 2 * next.weight(),
    }
}

/// Records `user_id`'s vote on a report and returns the report afterwards.
///
/// The existing vote is read inside an immediate transaction, which holds the
/// database write lock, so concurrent voters cannot lose each other's updates.
pub fn cast_vote(
    conn: &mut Connection,
    report_id: i64,
    user_id: &str,
    vote_type: VoteType,
) -> Result<Report, AppError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let report = db::find_report(&tx, report_id)?;
    db::find_user(&tx, user_id)?;

    let previous: Option<VoteType> = tx
        .query_row(
            "SELECT vote_type FROM votes WHERE report_id = ?1 AND user_id = ?2",
            params![report_id, user_id],
            |row| db::parse_column(row, 0),
        )
        .optional()?;

    let delta = vote_delta(previous, vote_type);
    if delta == 0 {
        return Ok(report);
    }

    tx.execute(
        "UPDATE reports SET votes = votes + ?2 WHERE id = ?1",
        params![report_id, delta],
    )?;
    tx.execute(
        "INSERT INTO votes (report_id, user_id, vote_type)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(report_id, user_id) DO UPDATE SET
            vote_type = excluded.vote_type,
            created_at = datetime('now')",
        params![report_id, user_id, vote_type.as_str()],
    )?;

    let updated = db::find_report(&tx, report_id)?;
    tx.commit()?;

    Ok(updated)
}

/// GET /api/reports/:id/vote — the caller's vote on a report, if any
pub async fn get_vote(
    State(state): State<AppState>,
    headers: HeaderMap,
    report_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Option<Vote>>, AppError> {
    let Path(report_id) = report_id?;
    let session = auth::session(&state, &headers).await?;

    let vote = db::run(&state.db, move |conn| {
        db::find_report(conn, report_id)?;

        let vote = conn
            .query_row(
                "SELECT report_id, user_id, vote_type, created_at FROM votes
                 WHERE report_id = ?1 AND user_id = ?2",
                params![report_id, session.user_id],
                |row| {
                    Ok(Vote {
                        report_id: row.get(0)?,
                        user_id: row.get(1)?,
                        vote_type: db::parse_column(row, 2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;

        Ok(vote)
    })
    .await?;

    Ok(Json(vote))
}

/// POST /api/reports/:id/vote — idempotent per direction, switchable
pub async fn post_vote(
    State(state): State<AppState>,
    headers: HeaderMap,
    report_id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<CastVote>, JsonRejection>,
) -> Result<Json<Report>, AppError> {
    let Path(report_id) = report_id?;
    let Json(payload) = payload?;
    let session = auth::session(&state, &headers).await?;
    let user_id = session.user_id.clone();
    let vote_type = payload.vote_type;

    let report =
        db::run(&state.db, move |conn| cast_vote(conn, report_id, &user_id, vote_type)).await?;

    tracing::info!(report_id, user_id = %session.user_id, vote = %vote_type, votes = report.votes, "vote cast");
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::vote_delta;
    use urbalert_shared::VoteType::{Down, Up};

    #[test]
    fn first_vote_counts_once() {
        assert_eq!(vote_delta(None, Up), 1);
        assert_eq!(vote_delta(None, Down), -1);
    }

    #[test]
    fn repeated_vote_is_a_no_op() {
        assert_eq!(vote_delta(Some(Up), Up), 0);
        assert_eq!(vote_delta(Some(Down), Down), 0);
    }

    #[test]
    fn switching_moves_by_two() {
        assert_eq!(vote_delta(Some(Down), Up), 2);
        assert_eq!(vote_delta(Some(Up), Down), -2);
    }
}
