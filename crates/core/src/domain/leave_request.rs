use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::employee::EmployeeId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveCategory {
    Vacation,
    Sick,
    Personal,
    Emergency,
    Maternity,
    Paternity,
    Bereavement,
    Compensatory,
    Unpaid,
}

impl LeaveCategory {
    pub const ALL: [LeaveCategory; 9] = [
        Self::Vacation,
        Self::Sick,
        Self::Personal,
        Self::Emergency,
        Self::Maternity,
        Self::Paternity,
        Self::Bereavement,
        Self::Compensatory,
        Self::Unpaid,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vacation => "vacation",
            Self::Sick => "sick",
            Self::Personal => "personal",
            Self::Emergency => "emergency",
            Self::Maternity => "maternity",
            Self::Paternity => "paternity",
            Self::Bereavement => "bereavement",
            Self::Compensatory => "compensatory",
            Self::Unpaid => "unpaid",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.as_str() == raw.trim().to_ascii_lowercase())
    }
}

impl fmt::Display for LeaveCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveDuration {
    FullDay,
    HalfDay,
}

impl LeaveDuration {
    pub fn multiplier(self) -> Decimal {
        match self {
            Self::FullDay => Decimal::ONE,
            Self::HalfDay => Decimal::new(5, 1),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullDay => "full_day",
            Self::HalfDay => "half_day",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "full_day" => Some(Self::FullDay),
            "half_day" => Some(Self::HalfDay),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    AutoApproved,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether a request in this status blocks an overlapping submission.
    pub fn blocks_overlap(self) -> bool {
        matches!(self, Self::Approved | Self::AutoApproved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::AutoApproved => "auto_approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "auto_approved" => Some(Self::AutoApproved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fields a caller proposes before the engine has admitted anything.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDraft {
    pub employee_id: EmployeeId,
    pub category: LeaveCategory,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration: LeaveDuration,
    pub reason: String,
    pub comments: Option<String>,
    pub is_emergency: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: RequestId,
    pub employee_id: EmployeeId,
    pub category: LeaveCategory,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration: LeaveDuration,
    pub total_days: Decimal,
    pub reason: String,
    pub comments: Option<String>,
    pub status: RequestStatus,
    pub is_emergency: bool,
    pub is_backdated: bool,
    pub approver: Option<EmployeeId>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeaveRequest {
    /// Materializes an admitted draft. `total_days` is supplied by the
    /// coordinator from calendar arithmetic and is never carried over from
    /// caller input; `is_backdated` is derived from the submission date.
    pub fn admit(
        draft: RequestDraft,
        total_days: Decimal,
        status: RequestStatus,
        submitted_on: NaiveDate,
        now: DateTime<Utc>,
    ) -> Self {
        let is_backdated = draft.start_date < submitted_on;
        Self {
            id: RequestId::generate(),
            employee_id: draft.employee_id,
            category: draft.category,
            start_date: draft.start_date,
            end_date: draft.end_date,
            duration: draft.duration,
            total_days,
            reason: draft.reason,
            comments: draft.comments,
            status,
            is_emergency: draft.is_emergency,
            is_backdated,
            approver: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Inclusive-range intersection test.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        !(self.end_date < start || self.start_date > end)
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// The ledger year the request draws from.
    pub fn start_year(&self) -> i32 {
        self.start_date.year()
    }
}
