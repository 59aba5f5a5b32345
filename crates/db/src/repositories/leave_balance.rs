use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::Row;

use leaveflow_core::{
    BalanceKey, DeductionMode, EmployeeId, LeaveBalance, LeaveBalanceStore, LeaveCategory,
    StoreError,
};

use super::{backend_error, decode_error};
use crate::DbPool;

pub struct SqlLeaveBalanceRepository {
    pool: DbPool,
}

impl SqlLeaveBalanceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, key: &BalanceKey) -> Result<Option<LeaveBalance>, StoreError> {
        let row = sqlx::query(
            "SELECT employee_id, category, year, total_days, used_days, updated_at
             FROM leave_balance
             WHERE employee_id = ? AND category = ? AND year = ?",
        )
        .bind(&key.employee_id.0)
        .bind(key.category.as_str())
        .bind(key.year)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        match row {
            Some(ref row) => Ok(Some(row_to_balance(row)?)),
            None => Ok(None),
        }
    }

    async fn require(&self, key: &BalanceKey) -> Result<LeaveBalance, StoreError> {
        self.fetch(key).await?.ok_or_else(|| StoreError::MissingBalance(key.clone()))
    }
}

fn days_to_f64(days: Decimal) -> f64 {
    days.to_f64().unwrap_or_default()
}

fn row_to_balance(row: &sqlx::sqlite::SqliteRow) -> Result<LeaveBalance, StoreError> {
    let employee_id: String =
        row.try_get("employee_id").map_err(|e| decode_error(e.to_string()))?;
    let category_raw: String =
        row.try_get("category").map_err(|e| decode_error(e.to_string()))?;
    let year: i64 = row.try_get("year").map_err(|e| decode_error(e.to_string()))?;
    let total_days: f64 =
        row.try_get("total_days").map_err(|e| decode_error(e.to_string()))?;
    let used_days: f64 = row.try_get("used_days").map_err(|e| decode_error(e.to_string()))?;
    let updated_at_raw: String =
        row.try_get("updated_at").map_err(|e| decode_error(e.to_string()))?;

    let category = LeaveCategory::parse(&category_raw)
        .ok_or_else(|| decode_error(format!("unknown category `{category_raw}`")))?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at_raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|_| decode_error(format!("invalid updated_at `{updated_at_raw}`")))?;

    Ok(LeaveBalance {
        employee_id: EmployeeId(employee_id),
        category,
        year: year as i32,
        total_days: Decimal::try_from(total_days)
            .map_err(|_| decode_error(format!("invalid total_days `{total_days}`")))?,
        used_days: Decimal::try_from(used_days)
            .map_err(|_| decode_error(format!("invalid used_days `{used_days}`")))?,
        updated_at,
    })
}

#[async_trait]
impl LeaveBalanceStore for SqlLeaveBalanceRepository {
    async fn find(&self, key: &BalanceKey) -> Result<Option<LeaveBalance>, StoreError> {
        self.fetch(key).await
    }

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
        year: Option<i32>,
    ) -> Result<Vec<LeaveBalance>, StoreError> {
        let mut sql = String::from(
            "SELECT employee_id, category, year, total_days, used_days, updated_at
             FROM leave_balance WHERE employee_id = ?",
        );
        if year.is_some() {
            sql.push_str(" AND year = ?");
        }
        sql.push_str(" ORDER BY year, category");

        let mut query = sqlx::query(&sql).bind(&employee_id.0);
        if let Some(year) = year {
            query = query.bind(year);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(backend_error)?;
        rows.iter().map(row_to_balance).collect()
    }

    async fn initialize_if_absent(
        &self,
        balance: LeaveBalance,
    ) -> Result<LeaveBalance, StoreError> {
        sqlx::query(
            "INSERT INTO leave_balance (employee_id, category, year, total_days, used_days, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(employee_id, category, year) DO NOTHING",
        )
        .bind(&balance.employee_id.0)
        .bind(balance.category.as_str())
        .bind(balance.year)
        .bind(days_to_f64(balance.total_days))
        .bind(days_to_f64(balance.used_days))
        .bind(balance.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        self.require(&balance.key()).await
    }

    async fn deduct(
        &self,
        key: &BalanceKey,
        days: Decimal,
        mode: DeductionMode,
    ) -> Result<LeaveBalance, StoreError> {
        // The availability check rides in the WHERE clause so two concurrent
        // deductions can never both pass against the same snapshot.
        let sql = match mode {
            DeductionMode::Checked => {
                "UPDATE leave_balance
                 SET used_days = used_days + ?, updated_at = ?
                 WHERE employee_id = ? AND category = ? AND year = ?
                   AND total_days - used_days >= ?"
            }
            DeductionMode::Overdraft => {
                "UPDATE leave_balance
                 SET used_days = used_days + ?, updated_at = ?
                 WHERE employee_id = ? AND category = ? AND year = ?"
            }
        };

        let mut query = sqlx::query(sql)
            .bind(days_to_f64(days))
            .bind(Utc::now().to_rfc3339())
            .bind(&key.employee_id.0)
            .bind(key.category.as_str())
            .bind(key.year);
        if mode == DeductionMode::Checked {
            query = query.bind(days_to_f64(days));
        }

        let result = query.execute(&self.pool).await.map_err(backend_error)?;
        if result.rows_affected() > 0 {
            return self.require(key).await;
        }

        let current = self.require(key).await?;
        tracing::warn!(
            balance = %key,
            requested = %days,
            available = %current.available_days(),
            "conditional deduction refused"
        );
        Err(StoreError::InsufficientBalance {
            key: key.clone(),
            requested: days,
            available: current.available_days(),
        })
    }

    async fn restore(&self, key: &BalanceKey, days: Decimal) -> Result<LeaveBalance, StoreError> {
        let result = sqlx::query(
            "UPDATE leave_balance
             SET used_days = used_days - ?, updated_at = ?
             WHERE employee_id = ? AND category = ? AND year = ?
               AND used_days >= ?",
        )
        .bind(days_to_f64(days))
        .bind(Utc::now().to_rfc3339())
        .bind(&key.employee_id.0)
        .bind(key.category.as_str())
        .bind(key.year)
        .bind(days_to_f64(days))
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        if result.rows_affected() > 0 {
            return self.require(key).await;
        }

        let current = self.require(key).await?;
        Err(StoreError::RestoreExceedsUsage {
            key: key.clone(),
            requested: days,
            used: current.used_days,
        })
    }
}
