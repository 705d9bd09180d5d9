use std::collections::BTreeMap;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    Json,
};
use rusqlite::{params, types::Value, Connection};
use serde::Deserialize;
use urbalert_shared::{
    CreateReport, Location, Paginated, Report, ReportStats, ReportStatus, ReportType, UpdateReport,
};

use crate::{
    auth, db,
    error::AppError,
    geo::{self, BoundingBox},
    AppState,
};

const MAX_DESCRIPTION_CHARS: usize = 2000;
const DEFAULT_PER_PAGE: i64 = 20;
const MAX_PER_PAGE: i64 = 100;

/// Length is measured on what the user typed; escaping may lengthen the
/// stored text.
fn clean_description(raw: &str) -> Result<String, AppError> {
    if raw.trim().chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(AppError::Validation(format!(
            "The maximum length of the description is {MAX_DESCRIPTION_CHARS}"
        )));
    }

    let description = ammonia::clean(raw).trim().to_string();
    if description.is_empty() {
        return Err(AppError::Validation("Description must not be empty".into()));
    }

    Ok(description)
}

fn check_location(location: Location) -> Result<(), AppError> {
    geo::validate_location(location).map_err(AppError::Validation)
}

// ── Proximity search ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NearbySort {
    #[default]
    Newest,
    Distance,
}

/// Reports whose great-circle distance from `center` is at most `radius_km`.
///
/// Only the latitude band of the bounding box goes to SQLite; the haversine
/// pass takes care of longitude and the box corners.
pub fn find_nearby(
    conn: &Connection,
    center: Location,
    radius_km: f64,
    sort: NearbySort,
) -> Result<Vec<Report>, AppError> {
    let bbox = BoundingBox::around(center, radius_km);
    tracing::trace!(
        north = bbox.north,
        south = bbox.south,
        east = bbox.east,
        west = bbox.west,
        "nearby bounding box"
    );

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM reports
         WHERE latitude >= ?1 AND latitude <= ?2
         ORDER BY created_at DESC, id DESC",
        db::REPORT_COLUMNS
    ))?;

    let mut nearby = stmt
        .query_map(params![bbox.south, bbox.north], db::report_from_row)?
        .filter_map(|row| match row {
            Ok(report) => {
                let distance = geo::haversine_km(center, report.location);
                (distance <= radius_km).then_some(Ok((report, distance)))
            }
            Err(e) => Some(Err(e)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if sort == NearbySort::Distance {
        nearby.sort_by(|(_, a), (_, b)| a.total_cmp(b));
    }

    Ok(nearby.into_iter().map(|(report, _)| report).collect())
}

#[derive(Deserialize)]
pub struct NearbyQuery {
    lat: f64,
    lon: f64,
    radius_km: Option<f64>,
    #[serde(default)]
    sort: NearbySort,
}

/// GET /api/reports/nearby?lat=..&lon=..&radius_km=..&sort=distance
pub async fn nearby(
    State(state): State<AppState>,
    params: Result<Query<NearbyQuery>, QueryRejection>,
) -> Result<Json<Vec<Report>>, AppError> {
    let Query(params) = params?;
    let center = Location {
        latitude: params.lat,
        longitude: params.lon,
    };
    check_location(center)?;

    let radius_km = params.radius_km.unwrap_or(state.default_radius_km);
    if !(radius_km.is_finite() && radius_km > 0.0 && radius_km <= state.max_radius_km) {
        return Err(AppError::Validation(format!(
            "Radius must be greater than 0 and at most {} km",
            state.max_radius_km
        )));
    }

    let sort = params.sort;
    let reports = db::run(&state.db, move |conn| find_nearby(conn, center, radius_km, sort)).await?;

    tracing::debug!(count = reports.len(), radius_km, "nearby reports");
    Ok(Json(reports))
}

// ── Listing ──

#[derive(Deserialize)]
pub struct ListParams {
    r#type: Option<ReportType>,
    status: Option<ReportStatus>,
    user_id: Option<String>,
    page: Option<i64>,
    per_page: Option<i64>,
}

/// GET /api/reports?type=road&status=pending&user_id=..&page=1&per_page=20
pub async fn list_reports(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Paginated<Report>>, AppError> {
    let Query(params) = params?;
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params
        .per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);
    let offset = (page - 1)
        .checked_mul(per_page)
        .ok_or_else(|| AppError::Validation(format!("Page {page} is out of range")))?;

    let mut clauses = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(report_type) = params.r#type {
        values.push(Value::Text(report_type.as_str().into()));
        clauses.push(format!("report_type = ?{}", values.len()));
    }
    if let Some(status) = params.status {
        values.push(Value::Text(status.as_str().into()));
        clauses.push(format!("status = ?{}", values.len()));
    }
    if let Some(user_id) = params.user_id {
        values.push(Value::Text(user_id));
        clauses.push(format!("user_id = ?{}", values.len()));
    }
    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let result = db::run(&state.db, move |conn| {
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM reports {where_clause}"),
            rusqlite::params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let limit_idx = values.len() + 1;
        let mut paged = values;
        paged.push(Value::Integer(per_page));
        paged.push(Value::Integer(offset));

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reports {where_clause}
             ORDER BY created_at DESC, id DESC
             LIMIT ?{} OFFSET ?{}",
            db::REPORT_COLUMNS,
            limit_idx,
            limit_idx + 1
        ))?;

        let items = stmt
            .query_map(rusqlite::params_from_iter(paged.iter()), db::report_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Paginated {
            items,
            total,
            page,
            per_page,
        })
    })
    .await?;

    Ok(Json(result))
}

/// GET /api/reports/stats
pub async fn report_stats(State(state): State<AppState>) -> Result<Json<ReportStats>, AppError> {
    let stats = db::run(&state.db, |conn| {
        let mut by_status: BTreeMap<ReportStatus, i64> =
            ReportStatus::ALL.iter().map(|&s| (s, 0)).collect();
        let mut by_type: BTreeMap<ReportType, i64> =
            ReportType::ALL.iter().map(|&t| (t, 0)).collect();
        let mut total = 0;

        let mut stmt = conn.prepare(
            "SELECT status, report_type, COUNT(*) FROM reports GROUP BY status, report_type",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                db::parse_column::<ReportStatus>(row, 0)?,
                db::parse_column::<ReportType>(row, 1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        for row in rows {
            let (status, report_type, count) = row?;
            *by_status.entry(status).or_default() += count;
            *by_type.entry(report_type).or_default() += count;
            total += count;
        }

        Ok(ReportStats {
            total,
            by_status,
            by_type,
        })
    })
    .await?;

    Ok(Json(stats))
}

// ── Single report ──

/// GET /api/reports/:id
pub async fn get_report(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Report>, AppError> {
    let Path(id) = id?;
    let report = db::run(&state.db, move |conn| db::find_report(conn, id)).await?;
    Ok(Json(report))
}

/// POST /api/reports
pub async fn create_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateReport>, JsonRejection>,
) -> Result<(StatusCode, Json<Report>), AppError> {
    let Json(payload) = payload?;
    let session = auth::session(&state, &headers).await?;

    let description = clean_description(&payload.description)?;
    check_location(payload.location)?;

    let report = db::run(&state.db, move |conn| {
        conn.execute(
            "INSERT INTO reports (report_type, description, latitude, longitude, photo_url, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                payload.report_type.as_str(),
                description,
                payload.location.latitude,
                payload.location.longitude,
                payload.photo_url,
                session.user_id,
            ],
        )?;

        let id = conn.last_insert_rowid();
        db::find_report(conn, id)
    })
    .await?;

    tracing::info!(
        report_id = report.id,
        user_id = %report.user_id,
        report_type = %report.report_type,
        "report created"
    );
    Ok((StatusCode::CREATED, Json(report)))
}

/// PATCH /api/reports/:id — owner edits while the report is still pending
pub async fn update_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateReport>, JsonRejection>,
) -> Result<Json<Report>, AppError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    let session = auth::session(&state, &headers).await?;

    let description = payload
        .description
        .as_deref()
        .map(clean_description)
        .transpose()?;
    if let Some(location) = payload.location {
        check_location(location)?;
    }

    let report = db::run(&state.db, move |conn| {
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let current = db::find_report(&tx, id)?;
        if current.user_id != session.user_id {
            return Err(AppError::Unauthorized);
        }
        if current.status != ReportStatus::Pending {
            return Err(AppError::Conflict("Only pending reports can be edited"));
        }

        let location = payload.location.unwrap_or(current.location);
        tx.execute(
            "UPDATE reports SET
                report_type = ?2,
                description = ?3,
                latitude = ?4,
                longitude = ?5,
                photo_url = ?6,
                updated_at = datetime('now')
             WHERE id = ?1",
            params![
                id,
                payload.report_type.unwrap_or(current.report_type).as_str(),
                description.unwrap_or(current.description),
                location.latitude,
                location.longitude,
                payload.photo_url.or(current.photo_url),
            ],
        )?;

        let updated = db::find_report(&tx, id)?;
        tx.commit()?;
        Ok(updated)
    })
    .await?;

    Ok(Json(report))
}

/// DELETE /api/reports/:id — owner or admin; votes go with it
pub async fn delete_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let Path(id) = id?;
    let session = auth::session(&state, &headers).await?;
    let actor = session.user_id.clone();

    db::run(&state.db, move |conn| {
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let report = db::find_report(&tx, id)?;
        if report.user_id != session.user_id && !session.is_admin() {
            return Err(AppError::Unauthorized);
        }

        tx.execute("DELETE FROM reports WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(())
    })
    .await?;

    tracing::info!(report_id = id, user_id = %actor, "report deleted");
    Ok(StatusCode::NO_CONTENT)
}
