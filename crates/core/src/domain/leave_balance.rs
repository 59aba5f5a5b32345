use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeId;
use crate::domain::leave_request::LeaveCategory;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceKey {
    pub employee_id: EmployeeId,
    pub category: LeaveCategory,
    pub year: i32,
}

impl BalanceKey {
    pub fn new(employee_id: EmployeeId, category: LeaveCategory, year: i32) -> Self {
        Self { employee_id, category, year }
    }
}

impl fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.employee_id, self.category, self.year)
    }
}

/// How a ledger deduction treats availability. Checked deduction refuses to
/// drive usage past the allocation; overdraft is reserved for emergency
/// auto-approval, which is accounted for after the fact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeductionMode {
    Checked,
    Overdraft,
}

/// Per employee/category/year day counters. Rows are created once and never
/// deleted; only the lifecycle coordinator mutates `used_days`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaveBalance {
    pub employee_id: EmployeeId,
    pub category: LeaveCategory,
    pub year: i32,
    pub total_days: Decimal,
    pub used_days: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl LeaveBalance {
    pub fn new(
        employee_id: EmployeeId,
        category: LeaveCategory,
        year: i32,
        total_days: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self { employee_id, category, year, total_days, used_days: Decimal::ZERO, updated_at: now }
    }

    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.employee_id.clone(), self.category, self.year)
    }

    /// Clamped at zero: overdrafted emergency usage never shows as a negative
    /// entitlement.
    pub fn available_days(&self) -> Decimal {
        (self.total_days - self.used_days).max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::LeaveBalance;
    use crate::domain::employee::EmployeeId;
    use crate::domain::leave_request::LeaveCategory;

    #[test]
    fn available_days_clamps_at_zero() {
        let mut balance = LeaveBalance::new(
            EmployeeId::new("e-1"),
            LeaveCategory::Emergency,
            2026,
            Decimal::from(2),
            Utc::now(),
        );
        balance.used_days = Decimal::new(35, 1);
        assert_eq!(balance.available_days(), Decimal::ZERO);

        balance.used_days = Decimal::new(5, 1);
        assert_eq!(balance.available_days(), Decimal::new(15, 1));
    }

    #[test]
    fn key_is_stable_per_category_and_year() {
        let balance = LeaveBalance::new(
            EmployeeId::new("e-1"),
            LeaveCategory::Vacation,
            2026,
            Decimal::from(20),
            Utc::now(),
        );
        assert_eq!(balance.key().to_string(), "e-1/vacation/2026");
    }
}
