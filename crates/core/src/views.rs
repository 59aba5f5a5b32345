use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::leave_balance::LeaveBalance;
use crate::domain::leave_request::{LeaveCategory, LeaveDuration, LeaveRequest, RequestStatus};

/// Transport-facing projection of a request; an HTTP/RPC/CLI shim can
/// serialize it as-is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestView {
    pub id: String,
    pub employee_id: String,
    pub category: LeaveCategory,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration: LeaveDuration,
    pub total_days: Decimal,
    pub status: RequestStatus,
    pub reason: String,
    pub comments: Option<String>,
    pub is_emergency: bool,
    pub is_backdated: bool,
    pub approver: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&LeaveRequest> for RequestView {
    fn from(request: &LeaveRequest) -> Self {
        Self {
            id: request.id.0.clone(),
            employee_id: request.employee_id.0.clone(),
            category: request.category,
            start_date: request.start_date,
            end_date: request.end_date,
            duration: request.duration,
            total_days: request.total_days,
            status: request.status,
            reason: request.reason.clone(),
            comments: request.comments.clone(),
            is_emergency: request.is_emergency,
            is_backdated: request.is_backdated,
            approver: request.approver.as_ref().map(|id| id.0.clone()),
            rejection_reason: request.rejection_reason.clone(),
            created_at: request.created_at,
            updated_at: request.updated_at,
        }
    }
}

impl From<LeaveRequest> for RequestView {
    fn from(request: LeaveRequest) -> Self {
        Self::from(&request)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BalanceView {
    pub employee_id: String,
    pub category: LeaveCategory,
    pub year: i32,
    pub total_days: Decimal,
    pub used_days: Decimal,
    pub available_days: Decimal,
}

impl From<&LeaveBalance> for BalanceView {
    fn from(balance: &LeaveBalance) -> Self {
        Self {
            employee_id: balance.employee_id.0.clone(),
            category: balance.category,
            year: balance.year,
            total_days: balance.total_days,
            used_days: balance.used_days,
            available_days: balance.available_days(),
        }
    }
}

impl From<LeaveBalance> for BalanceView {
    fn from(balance: LeaveBalance) -> Self {
        Self::from(&balance)
    }
}
