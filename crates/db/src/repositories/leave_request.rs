use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::Row;

use leaveflow_core::{
    EmployeeId, LeaveCategory, LeaveDuration, LeaveRequest, LeaveRequestStore, RequestId,
    RequestStatus, StoreError,
};

use super::{backend_error, decode_error};
use crate::DbPool;

const SELECT_COLUMNS: &str = "id, employee_id, category, start_date, end_date, duration, \
     total_days, reason, comments, status, is_emergency, is_backdated, approver_id, \
     rejection_reason, created_at, updated_at";

pub struct SqlLeaveRequestRepository {
    pool: DbPool,
}

impl SqlLeaveRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn date_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(raw: &str, column: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| decode_error(format!("invalid {column} `{raw}`")))
}

fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|_| decode_error(format!("invalid {column} `{raw}`")))
}

fn days_to_f64(days: Decimal) -> f64 {
    // Day counts sit on the half-day grid, which f64 represents exactly.
    days.to_f64().unwrap_or_default()
}

fn days_from_f64(raw: f64, column: &str) -> Result<Decimal, StoreError> {
    Decimal::try_from(raw).map_err(|_| decode_error(format!("invalid {column} `{raw}`")))
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<LeaveRequest, StoreError> {
    let id: String = row.try_get("id").map_err(|e| decode_error(e.to_string()))?;
    let employee_id: String =
        row.try_get("employee_id").map_err(|e| decode_error(e.to_string()))?;
    let category_raw: String =
        row.try_get("category").map_err(|e| decode_error(e.to_string()))?;
    let start_date_raw: String =
        row.try_get("start_date").map_err(|e| decode_error(e.to_string()))?;
    let end_date_raw: String =
        row.try_get("end_date").map_err(|e| decode_error(e.to_string()))?;
    let duration_raw: String =
        row.try_get("duration").map_err(|e| decode_error(e.to_string()))?;
    let total_days_raw: f64 =
        row.try_get("total_days").map_err(|e| decode_error(e.to_string()))?;
    let reason: String = row.try_get("reason").map_err(|e| decode_error(e.to_string()))?;
    let comments: Option<String> =
        row.try_get("comments").map_err(|e| decode_error(e.to_string()))?;
    let status_raw: String = row.try_get("status").map_err(|e| decode_error(e.to_string()))?;
    let is_emergency: i64 =
        row.try_get("is_emergency").map_err(|e| decode_error(e.to_string()))?;
    let is_backdated: i64 =
        row.try_get("is_backdated").map_err(|e| decode_error(e.to_string()))?;
    let approver_id: Option<String> =
        row.try_get("approver_id").map_err(|e| decode_error(e.to_string()))?;
    let rejection_reason: Option<String> =
        row.try_get("rejection_reason").map_err(|e| decode_error(e.to_string()))?;
    let created_at_raw: String =
        row.try_get("created_at").map_err(|e| decode_error(e.to_string()))?;
    let updated_at_raw: String =
        row.try_get("updated_at").map_err(|e| decode_error(e.to_string()))?;

    let category = LeaveCategory::parse(&category_raw)
        .ok_or_else(|| decode_error(format!("unknown category `{category_raw}`")))?;
    let duration = LeaveDuration::parse(&duration_raw)
        .ok_or_else(|| decode_error(format!("unknown duration `{duration_raw}`")))?;
    let status = RequestStatus::parse(&status_raw)
        .ok_or_else(|| decode_error(format!("unknown status `{status_raw}`")))?;

    Ok(LeaveRequest {
        id: RequestId(id),
        employee_id: EmployeeId(employee_id),
        category,
        start_date: parse_date(&start_date_raw, "start_date")?,
        end_date: parse_date(&end_date_raw, "end_date")?,
        duration,
        total_days: days_from_f64(total_days_raw, "total_days")?,
        reason,
        comments,
        status,
        is_emergency: is_emergency != 0,
        is_backdated: is_backdated != 0,
        approver: approver_id.map(EmployeeId),
        rejection_reason,
        created_at: parse_timestamp(&created_at_raw, "created_at")?,
        updated_at: parse_timestamp(&updated_at_raw, "updated_at")?,
    })
}

#[async_trait]
impl LeaveRequestStore for SqlLeaveRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<LeaveRequest>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM leave_request WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_error)?;

        match row {
            Some(ref row) => Ok(Some(row_to_request(row)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, request: LeaveRequest) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO leave_request
                 (id, employee_id, category, start_date, end_date, duration, total_days,
                  reason, comments, status, is_emergency, is_backdated, approver_id,
                  rejection_reason, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.employee_id.0)
        .bind(request.category.as_str())
        .bind(date_str(request.start_date))
        .bind(date_str(request.end_date))
        .bind(request.duration.as_str())
        .bind(days_to_f64(request.total_days))
        .bind(&request.reason)
        .bind(&request.comments)
        .bind(request.status.as_str())
        .bind(i64::from(request.is_emergency))
        .bind(i64::from(request.is_backdated))
        .bind(request.approver.as_ref().map(|id| id.0.clone()))
        .bind(&request.rejection_reason)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) => {
                let unique_violation = error
                    .as_database_error()
                    .is_some_and(|db_error| db_error.is_unique_violation());
                if unique_violation {
                    Err(StoreError::DuplicateRequest(request.id.clone()))
                } else {
                    Err(backend_error(error))
                }
            }
        }
    }

    async fn transition(
        &self,
        id: &RequestId,
        expected: RequestStatus,
        updated: LeaveRequest,
    ) -> Result<(), StoreError> {
        // The freshness guard lives in the WHERE clause: the write lands only
        // while the stored status still matches the caller's expectation.
        let result = sqlx::query(
            "UPDATE leave_request
             SET status = ?, comments = ?, approver_id = ?, rejection_reason = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(updated.status.as_str())
        .bind(&updated.comments)
        .bind(updated.approver.as_ref().map(|approver| approver.0.clone()))
        .bind(&updated.rejection_reason)
        .bind(updated.updated_at.to_rfc3339())
        .bind(&id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        match self.find_by_id(id).await? {
            None => Err(StoreError::MissingRequest(id.clone())),
            Some(current) => {
                tracing::warn!(
                    request = %id,
                    expected = %expected,
                    actual = %current.status,
                    "conditional transition lost to a concurrent writer"
                );
                Err(StoreError::StaleState { id: id.clone(), expected, actual: current.status })
            }
        }
    }

    async fn find_overlapping(
        &self,
        employee_id: &EmployeeId,
        start: NaiveDate,
        end: NaiveDate,
        exclude: Option<&RequestId>,
    ) -> Result<Vec<LeaveRequest>, StoreError> {
        let mut sql = format!(
            "SELECT {SELECT_COLUMNS} FROM leave_request
             WHERE employee_id = ?
               AND status IN ('approved', 'auto_approved')
               AND NOT (end_date < ? OR start_date > ?)"
        );
        if exclude.is_some() {
            sql.push_str(" AND id <> ?");
        }
        sql.push_str(" ORDER BY start_date, id");

        let mut query = sqlx::query(&sql)
            .bind(&employee_id.0)
            .bind(date_str(start))
            .bind(date_str(end));
        if let Some(exclude) = exclude {
            query = query.bind(&exclude.0);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(backend_error)?;
        rows.iter().map(row_to_request).collect()
    }

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<LeaveRequest>, StoreError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM leave_request
             WHERE employee_id = ? ORDER BY created_at, id"
        );
        let rows = sqlx::query(&sql)
            .bind(&employee_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(backend_error)?;
        rows.iter().map(row_to_request).collect()
    }

    async fn list_pending_owned_by(
        &self,
        owners: &[EmployeeId],
    ) -> Result<Vec<LeaveRequest>, StoreError> {
        if owners.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; owners.len()].join(", ");
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM leave_request
             WHERE status = 'pending' AND employee_id IN ({placeholders})
             ORDER BY created_at, id"
        );

        let mut query = sqlx::query(&sql);
        for owner in owners {
            query = query.bind(&owner.0);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(backend_error)?;
        rows.iter().map(row_to_request).collect()
    }
}
