use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::delegation::ActiveLeaveCalendar;
use crate::domain::employee::{Employee, EmployeeId, OrgChart};
use crate::domain::leave_balance::{BalanceKey, DeductionMode, LeaveBalance};
use crate::domain::leave_request::{LeaveRequest, RequestId, RequestStatus};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("stale state for request `{id}`: expected {expected}, found {actual}")]
    StaleState { id: RequestId, expected: RequestStatus, actual: RequestStatus },
    #[error("insufficient balance for {key}: requested {requested}, available {available}")]
    InsufficientBalance { key: BalanceKey, requested: Decimal, available: Decimal },
    #[error("restore of {requested} days exceeds {used} used for {key}")]
    RestoreExceedsUsage { key: BalanceKey, requested: Decimal, used: Decimal },
    #[error("no request with id `{0}`")]
    MissingRequest(RequestId),
    #[error("no balance row for {0}")]
    MissingBalance(BalanceKey),
    #[error("duplicate request id `{0}`")]
    DuplicateRequest(RequestId),
    #[error("backend failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, StoreError>;

    /// A fresh hierarchy snapshot; callers must not hold it across engine
    /// calls.
    async fn org_chart(&self) -> Result<OrgChart, StoreError>;
}

#[async_trait]
pub trait LeaveRequestStore: Send + Sync {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<LeaveRequest>, StoreError>;

    async fn insert(&self, request: LeaveRequest) -> Result<(), StoreError>;

    /// Compare-and-swap write: replaces the row only while its status still
    /// equals `expected`. A concurrent winner surfaces as
    /// [`StoreError::StaleState`].
    async fn transition(
        &self,
        id: &RequestId,
        expected: RequestStatus,
        updated: LeaveRequest,
    ) -> Result<(), StoreError>;

    /// Approved/auto-approved requests of the employee intersecting the
    /// inclusive range, optionally excluding one id (the approval-time
    /// re-check against the request itself).
    async fn find_overlapping(
        &self,
        employee_id: &EmployeeId,
        start: NaiveDate,
        end: NaiveDate,
        exclude: Option<&RequestId>,
    ) -> Result<Vec<LeaveRequest>, StoreError>;

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<LeaveRequest>, StoreError>;

    /// Pending requests owned by any of the given employees.
    async fn list_pending_owned_by(
        &self,
        owners: &[EmployeeId],
    ) -> Result<Vec<LeaveRequest>, StoreError>;
}

#[async_trait]
pub trait LeaveBalanceStore: Send + Sync {
    async fn find(&self, key: &BalanceKey) -> Result<Option<LeaveBalance>, StoreError>;

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
        year: Option<i32>,
    ) -> Result<Vec<LeaveBalance>, StoreError>;

    /// Creates the row if absent and returns whichever row is now present.
    async fn initialize_if_absent(
        &self,
        balance: LeaveBalance,
    ) -> Result<LeaveBalance, StoreError>;

    /// Atomic conditional consumption: "add to usage iff available ≥ days"
    /// in checked mode; overdraft mode adds unconditionally.
    async fn deduct(
        &self,
        key: &BalanceKey,
        days: Decimal,
        mode: DeductionMode,
    ) -> Result<LeaveBalance, StoreError>;

    /// Atomic conditional credit: "subtract from usage iff used ≥ days".
    async fn restore(&self, key: &BalanceKey, days: Decimal) -> Result<LeaveBalance, StoreError>;
}

/// Adapts a request store into the delegation resolver's availability lookup.
pub struct StoreBackedCalendar<R>(pub Arc<R>);

#[async_trait]
impl<R> ActiveLeaveCalendar for StoreBackedCalendar<R>
where
    R: LeaveRequestStore,
{
    async fn on_leave(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
    ) -> Result<bool, StoreError> {
        let covering = self.0.find_overlapping(employee_id, date, date, None).await?;
        Ok(!covering.is_empty())
    }
}

#[derive(Default)]
pub struct InMemoryEmployeeDirectory {
    employees: RwLock<HashMap<EmployeeId, Employee>>,
}

impl InMemoryEmployeeDirectory {
    pub fn with_employees(employees: Vec<Employee>) -> Self {
        Self {
            employees: RwLock::new(
                employees.into_iter().map(|employee| (employee.id.clone(), employee)).collect(),
            ),
        }
    }

    pub async fn upsert(&self, employee: Employee) {
        let mut employees = self.employees.write().await;
        employees.insert(employee.id.clone(), employee);
    }
}

#[async_trait]
impl EmployeeDirectory for InMemoryEmployeeDirectory {
    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, StoreError> {
        let employees = self.employees.read().await;
        Ok(employees.get(id).cloned())
    }

    async fn org_chart(&self) -> Result<OrgChart, StoreError> {
        let employees = self.employees.read().await;
        Ok(OrgChart::from_employees(employees.values().cloned()))
    }
}

#[derive(Default)]
pub struct InMemoryLeaveRequestStore {
    requests: RwLock<HashMap<String, LeaveRequest>>,
}

#[async_trait]
impl LeaveRequestStore for InMemoryLeaveRequestStore {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<LeaveRequest>, StoreError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn insert(&self, request: LeaveRequest) -> Result<(), StoreError> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id.0) {
            return Err(StoreError::DuplicateRequest(request.id.clone()));
        }
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn transition(
        &self,
        id: &RequestId,
        expected: RequestStatus,
        updated: LeaveRequest,
    ) -> Result<(), StoreError> {
        let mut requests = self.requests.write().await;
        let current =
            requests.get_mut(&id.0).ok_or_else(|| StoreError::MissingRequest(id.clone()))?;
        if current.status != expected {
            return Err(StoreError::StaleState {
                id: id.clone(),
                expected,
                actual: current.status,
            });
        }
        *current = updated;
        Ok(())
    }

    async fn find_overlapping(
        &self,
        employee_id: &EmployeeId,
        start: NaiveDate,
        end: NaiveDate,
        exclude: Option<&RequestId>,
    ) -> Result<Vec<LeaveRequest>, StoreError> {
        let requests = self.requests.read().await;
        let mut matching: Vec<LeaveRequest> = requests
            .values()
            .filter(|request| {
                request.employee_id == *employee_id
                    && request.status.blocks_overlap()
                    && Some(&request.id) != exclude
                    && request.overlaps(start, end)
            })
            .cloned()
            .collect();
        matching.sort_by_key(|request| (request.start_date, request.id.0.clone()));
        Ok(matching)
    }

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<LeaveRequest>, StoreError> {
        let requests = self.requests.read().await;
        let mut matching: Vec<LeaveRequest> = requests
            .values()
            .filter(|request| request.employee_id == *employee_id)
            .cloned()
            .collect();
        matching.sort_by_key(|request| (request.created_at, request.id.0.clone()));
        Ok(matching)
    }

    async fn list_pending_owned_by(
        &self,
        owners: &[EmployeeId],
    ) -> Result<Vec<LeaveRequest>, StoreError> {
        let requests = self.requests.read().await;
        let mut matching: Vec<LeaveRequest> = requests
            .values()
            .filter(|request| {
                request.status == RequestStatus::Pending
                    && owners.contains(&request.employee_id)
            })
            .cloned()
            .collect();
        matching.sort_by_key(|request| (request.created_at, request.id.0.clone()));
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemoryLeaveBalanceStore {
    balances: RwLock<HashMap<BalanceKey, LeaveBalance>>,
}

#[async_trait]
impl LeaveBalanceStore for InMemoryLeaveBalanceStore {
    async fn find(&self, key: &BalanceKey) -> Result<Option<LeaveBalance>, StoreError> {
        let balances = self.balances.read().await;
        Ok(balances.get(key).cloned())
    }

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
        year: Option<i32>,
    ) -> Result<Vec<LeaveBalance>, StoreError> {
        let balances = self.balances.read().await;
        let mut matching: Vec<LeaveBalance> = balances
            .values()
            .filter(|balance| {
                balance.employee_id == *employee_id
                    && year.map_or(true, |year| balance.year == year)
            })
            .cloned()
            .collect();
        matching.sort_by_key(|balance| (balance.year, balance.category));
        Ok(matching)
    }

    async fn initialize_if_absent(
        &self,
        balance: LeaveBalance,
    ) -> Result<LeaveBalance, StoreError> {
        let mut balances = self.balances.write().await;
        Ok(balances.entry(balance.key()).or_insert(balance).clone())
    }

    async fn deduct(
        &self,
        key: &BalanceKey,
        days: Decimal,
        mode: DeductionMode,
    ) -> Result<LeaveBalance, StoreError> {
        let mut balances = self.balances.write().await;
        let balance =
            balances.get_mut(key).ok_or_else(|| StoreError::MissingBalance(key.clone()))?;
        if mode == DeductionMode::Checked {
            let available = balance.available_days();
            if days > available {
                return Err(StoreError::InsufficientBalance {
                    key: key.clone(),
                    requested: days,
                    available,
                });
            }
        }
        balance.used_days += days;
        balance.updated_at = Utc::now();
        Ok(balance.clone())
    }

    async fn restore(&self, key: &BalanceKey, days: Decimal) -> Result<LeaveBalance, StoreError> {
        let mut balances = self.balances.write().await;
        let balance =
            balances.get_mut(key).ok_or_else(|| StoreError::MissingBalance(key.clone()))?;
        if days > balance.used_days {
            return Err(StoreError::RestoreExceedsUsage {
                key: key.clone(),
                requested: days,
                used: balance.used_days,
            });
        }
        balance.used_days -= days;
        balance.updated_at = Utc::now();
        Ok(balance.clone())
    }
}
