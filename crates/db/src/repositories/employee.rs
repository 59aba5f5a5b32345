use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::Row;

use leaveflow_core::{Employee, EmployeeDirectory, EmployeeId, OrgChart, StoreError};

use super::{backend_error, decode_error};
use crate::DbPool;

pub struct SqlEmployeeDirectory {
    pool: DbPool,
}

impl SqlEmployeeDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Seeds or updates a directory row. The engine itself never writes
    /// employees; this backs provisioning and tests.
    pub async fn upsert(&self, employee: &Employee) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO employee (id, name, department, manager_id, join_date)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 department = excluded.department,
                 manager_id = excluded.manager_id,
                 join_date = excluded.join_date",
        )
        .bind(&employee.id.0)
        .bind(&employee.name)
        .bind(&employee.department)
        .bind(employee.manager_id.as_ref().map(|id| id.0.clone()))
        .bind(employee.join_date.format("%Y-%m-%d").to_string())
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;
        Ok(())
    }
}

pub(crate) fn row_to_employee(row: &sqlx::sqlite::SqliteRow) -> Result<Employee, StoreError> {
    let id: String = row.try_get("id").map_err(|e| decode_error(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| decode_error(e.to_string()))?;
    let department: String =
        row.try_get("department").map_err(|e| decode_error(e.to_string()))?;
    let manager_id: Option<String> =
        row.try_get("manager_id").map_err(|e| decode_error(e.to_string()))?;
    let join_date_raw: String =
        row.try_get("join_date").map_err(|e| decode_error(e.to_string()))?;
    let join_date = NaiveDate::parse_from_str(&join_date_raw, "%Y-%m-%d")
        .map_err(|_| decode_error(format!("invalid join_date `{join_date_raw}`")))?;

    Ok(Employee {
        id: EmployeeId(id),
        name,
        department,
        manager_id: manager_id.map(EmployeeId),
        join_date,
    })
}

#[async_trait]
impl EmployeeDirectory for SqlEmployeeDirectory {
    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, department, manager_id, join_date FROM employee WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        match row {
            Some(ref row) => Ok(Some(row_to_employee(row)?)),
            None => Ok(None),
        }
    }

    async fn org_chart(&self) -> Result<OrgChart, StoreError> {
        let rows =
            sqlx::query("SELECT id, name, department, manager_id, join_date FROM employee")
                .fetch_all(&self.pool)
                .await
                .map_err(backend_error)?;

        let employees = rows
            .iter()
            .map(row_to_employee)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(OrgChart::from_employees(employees))
    }
}
