use rust_decimal::Decimal;
use thiserror::Error;

use crate::delegation::{AuthorizationError, DelegationError};
use crate::domain::employee::EmployeeId;
use crate::domain::leave_balance::BalanceKey;
use crate::domain::leave_request::{RequestId, RequestStatus};
use crate::stores::StoreError;
use crate::validation::{summarize, RejectionReason};

/// Caller-facing failure taxonomy. Nothing here is retried automatically:
/// `StateConflict` and `LedgerConflict` tell the caller to re-fetch current
/// state and decide; `Store` passes infrastructure failures through opaquely.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("employee `{0}` not found")]
    EmployeeNotFound(EmployeeId),
    #[error("leave request `{0}` not found")]
    RequestNotFound(RequestId),
    #[error("validation failed: {}", summarize(.0))]
    ValidationFailed(Vec<RejectionReason>),
    #[error(transparent)]
    Unauthorized(#[from] AuthorizationError),
    #[error("request `{id}` is {actual} but the operation requires {expected}")]
    StateConflict { id: RequestId, expected: RequestStatus, actual: RequestStatus },
    #[error("ledger conflict for {key}: requested {requested}, {available} available")]
    LedgerConflict { key: BalanceKey, requested: Decimal, available: Decimal },
    #[error("store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::StaleState { id, expected, actual } => {
                Self::StateConflict { id, expected, actual }
            }
            StoreError::InsufficientBalance { key, requested, available } => {
                Self::LedgerConflict { key, requested, available }
            }
            StoreError::RestoreExceedsUsage { key, requested, used } => {
                // The restorable amount plays the role of availability.
                Self::LedgerConflict { key, requested, available: used }
            }
            other => Self::Store(other),
        }
    }
}

impl From<DelegationError> for EngineError {
    fn from(error: DelegationError) -> Self {
        match error {
            DelegationError::Unauthorized(unauthorized) => Self::Unauthorized(unauthorized),
            DelegationError::Store(store) => store.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::EngineError;
    use crate::domain::employee::EmployeeId;
    use crate::domain::leave_balance::BalanceKey;
    use crate::domain::leave_request::{LeaveCategory, RequestId, RequestStatus};
    use crate::stores::StoreError;
    use crate::validation::RejectionReason;

    #[test]
    fn stale_state_maps_to_state_conflict() {
        let error: EngineError = StoreError::StaleState {
            id: RequestId::new("r-1"),
            expected: RequestStatus::Pending,
            actual: RequestStatus::Approved,
        }
        .into();
        assert!(matches!(
            error,
            EngineError::StateConflict { expected: RequestStatus::Pending, actual: RequestStatus::Approved, .. }
        ));
    }

    #[test]
    fn insufficient_balance_maps_to_ledger_conflict() {
        let key = BalanceKey::new(EmployeeId::new("e-1"), LeaveCategory::Vacation, 2026);
        let error: EngineError = StoreError::InsufficientBalance {
            key,
            requested: Decimal::from(3),
            available: Decimal::ONE,
        }
        .into();
        assert!(matches!(error, EngineError::LedgerConflict { .. }));
    }

    #[test]
    fn validation_failure_lists_every_reason() {
        let error = EngineError::ValidationFailed(vec![
            RejectionReason::NoWorkingDays,
            RejectionReason::EmptyDecisionReason,
        ]);
        let message = error.to_string();
        assert!(message.contains("must include at least one working day"));
        assert!(message.contains("a rejection reason is required"));
    }
}
