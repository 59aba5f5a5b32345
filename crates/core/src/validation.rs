use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calendar::{classify, DayClass, WorkCalendar};
use crate::config::LeavePolicyConfig;
use crate::domain::employee::Employee;
use crate::domain::leave_balance::LeaveBalance;
use crate::domain::leave_request::{LeaveRequest, RequestDraft, RequestId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    EndBeforeStart {
        start: NaiveDate,
        end: NaiveDate,
    },
    StartsBeforeJoining {
        start: NaiveDate,
        join_date: NaiveDate,
    },
    OverlapsExisting {
        other_id: RequestId,
        other_start: NaiveDate,
        other_end: NaiveDate,
    },
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },
    SpanTooLong {
        calendar_days: i64,
        max_days: i64,
    },
    NoWorkingDays,
    BeyondBackdatedWindow {
        days_back: i64,
        window_days: i64,
    },
    EmptyDecisionReason,
}

impl RejectionReason {
    pub fn reason(&self) -> String {
        match self {
            Self::EndBeforeStart { start, end } => {
                format!("end date {end} is before start date {start}")
            }
            Self::StartsBeforeJoining { start, join_date } => {
                format!("start date {start} precedes the joining date {join_date}")
            }
            Self::OverlapsExisting { other_id, other_start, other_end } => {
                format!(
                    "overlaps approved leave `{other_id}` covering {other_start} to {other_end}"
                )
            }
            Self::InsufficientBalance { requested, available } => {
                format!("requested {requested} days with only {available} available")
            }
            Self::SpanTooLong { calendar_days, max_days } => {
                format!("spans {calendar_days} calendar days, above the {max_days}-day limit")
            }
            Self::NoWorkingDays => "must include at least one working day".to_string(),
            Self::BeyondBackdatedWindow { days_back, window_days } => {
                format!(
                    "starts {days_back} days in the past, beyond the {window_days}-day backdated window"
                )
            }
            Self::EmptyDecisionReason => "a rejection reason is required".to_string(),
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason())
    }
}

pub fn summarize(reasons: &[RejectionReason]) -> String {
    reasons.iter().map(RejectionReason::reason).collect::<Vec<_>>().join("; ")
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    Backdated { days_back: i64 },
    LowBalanceAfterApproval { remaining: Decimal, threshold: Decimal },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValidationOutcome {
    pub reasons: Vec<RejectionReason>,
    pub warnings: Vec<ValidationWarning>,
    /// Working days × duration modifier, as computed during validation.
    pub requested_days: Decimal,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.reasons.is_empty()
    }
}

/// Read-only snapshots the decision is made over. `existing` carries the
/// employee's potentially conflicting requests; `exclude` removes the request
/// under decision from its own approval-time re-check.
#[derive(Clone, Copy, Debug)]
pub struct ValidationInput<'a> {
    pub employee: &'a Employee,
    pub draft: &'a RequestDraft,
    pub balance: &'a LeaveBalance,
    pub existing: &'a [LeaveRequest],
    pub today: NaiveDate,
    pub exclude: Option<&'a RequestId>,
}

/// Pure decision function over the proposed request and its snapshots.
/// Only the date-range rule short-circuits; every other rule accumulates so
/// the caller sees all problems at once.
#[derive(Clone, Debug)]
pub struct LeaveValidator {
    calendar: WorkCalendar,
    emergency_auto_approve_ceiling: Decimal,
    backdated_window_days: i64,
    low_balance_warning_threshold: Decimal,
    max_request_span_days: i64,
}

impl LeaveValidator {
    pub fn new(config: &LeavePolicyConfig) -> Self {
        Self {
            calendar: config.work_calendar(),
            emergency_auto_approve_ceiling: config.emergency_auto_approve_ceiling,
            backdated_window_days: config.backdated_window_days,
            low_balance_warning_threshold: config.low_balance_warning_threshold,
            max_request_span_days: config.max_request_span_days,
        }
    }

    pub fn calendar(&self) -> &WorkCalendar {
        &self.calendar
    }

    pub fn validate(&self, input: &ValidationInput<'_>) -> ValidationOutcome {
        let draft = input.draft;
        let mut reasons = Vec::new();
        let mut warnings = Vec::new();

        if draft.end_date < draft.start_date {
            return ValidationOutcome {
                reasons: vec![RejectionReason::EndBeforeStart {
                    start: draft.start_date,
                    end: draft.end_date,
                }],
                warnings,
                requested_days: Decimal::ZERO,
            };
        }

        if draft.start_date < input.employee.join_date {
            reasons.push(RejectionReason::StartsBeforeJoining {
                start: draft.start_date,
                join_date: input.employee.join_date,
            });
        }

        for other in input.existing {
            if Some(&other.id) == input.exclude {
                continue;
            }
            if other.employee_id != draft.employee_id || !other.status.blocks_overlap() {
                continue;
            }
            if other.overlaps(draft.start_date, draft.end_date) {
                reasons.push(RejectionReason::OverlapsExisting {
                    other_id: other.id.clone(),
                    other_start: other.start_date,
                    other_end: other.end_date,
                });
            }
        }

        let requested_days =
            self.calendar.requested_days(draft.start_date, draft.end_date, draft.duration);

        let emergency_bypass =
            draft.is_emergency && requested_days <= self.emergency_auto_approve_ceiling;
        if !emergency_bypass {
            let available = input.balance.available_days();
            if requested_days > available {
                reasons.push(RejectionReason::InsufficientBalance {
                    requested: requested_days,
                    available,
                });
            } else {
                let remaining = available - requested_days;
                if remaining < self.low_balance_warning_threshold {
                    warnings.push(ValidationWarning::LowBalanceAfterApproval {
                        remaining,
                        threshold: self.low_balance_warning_threshold,
                    });
                }
            }
        }

        let calendar_days = (draft.end_date - draft.start_date).num_days() + 1;
        if calendar_days > self.max_request_span_days {
            reasons.push(RejectionReason::SpanTooLong {
                calendar_days,
                max_days: self.max_request_span_days,
            });
        }

        if self.calendar.working_days(draft.start_date, draft.end_date) == 0 {
            reasons.push(RejectionReason::NoWorkingDays);
        }

        if classify(draft.start_date, input.today) == DayClass::Backdated {
            let days_back = (input.today - draft.start_date).num_days();
            if days_back > self.backdated_window_days {
                reasons.push(RejectionReason::BeyondBackdatedWindow {
                    days_back,
                    window_days: self.backdated_window_days,
                });
            } else {
                warnings.push(ValidationWarning::Backdated { days_back });
            }
        }

        ValidationOutcome { reasons, warnings, requested_days }
    }
}
