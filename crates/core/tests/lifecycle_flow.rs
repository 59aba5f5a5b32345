use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use leaveflow_core::{
    ApplyRequest, EmployeeId, Employee, EngineError, InMemoryAuditSink,
    InMemoryEmployeeDirectory, InMemoryLeaveBalanceStore, InMemoryLeaveRequestStore,
    LeaveCategory, LeaveDuration, LeavePolicyConfig, LeaveService, RequestId, RequestStatus,
    ValidationWarning,
};

type TestService = LeaveService<
    InMemoryLeaveRequestStore,
    InMemoryLeaveBalanceStore,
    InMemoryEmployeeDirectory,
>;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

// Monday of a plain working week.
fn today() -> NaiveDate {
    date(2026, 6, 15)
}

fn employee(id: &str, department: &str, manager: Option<&str>) -> Employee {
    Employee {
        id: EmployeeId::new(id),
        name: id.to_string(),
        department: department.to_string(),
        manager_id: manager.map(EmployeeId::new),
        join_date: date(2024, 1, 2),
    }
}

fn service() -> TestService {
    service_with_config(LeavePolicyConfig::default())
}

fn service_with_config(config: LeavePolicyConfig) -> TestService {
    LeaveService::new(
        Arc::new(InMemoryLeaveRequestStore::default()),
        Arc::new(InMemoryLeaveBalanceStore::default()),
        Arc::new(InMemoryEmployeeDirectory::with_employees(vec![
            employee("e-root", "people", None),
            employee("e-mgr", "engineering", Some("e-root")),
            employee("e-dev", "engineering", Some("e-mgr")),
        ])),
        config,
        Arc::new(InMemoryAuditSink::default()),
    )
}

fn vacation(start: NaiveDate, end: NaiveDate) -> ApplyRequest {
    ApplyRequest {
        employee_id: EmployeeId::new("e-dev"),
        category: LeaveCategory::Vacation,
        start_date: start,
        end_date: end,
        duration: LeaveDuration::FullDay,
        reason: "planned time off".to_string(),
        is_emergency: false,
        backdated_justification: None,
    }
}

async fn apply_pending(service: &TestService, start: NaiveDate, end: NaiveDate) -> RequestId {
    let outcome = service.apply_on(today(), vacation(start, end)).await.expect("apply");
    assert_eq!(outcome.request.status, RequestStatus::Pending);
    RequestId::new(outcome.request.id)
}

#[tokio::test]
async fn concurrent_approve_and_reject_have_exactly_one_winner() {
    let service = service();
    let request_id = apply_pending(&service, date(2026, 6, 22), date(2026, 6, 24)).await;

    let approver = EmployeeId::new("e-mgr");
    let (approve_result, reject_result) = tokio::join!(
        service.approve_on(today(), &request_id, &approver, None),
        service.reject_on(today(), &request_id, &approver, "coverage gap".to_string()),
    );

    let approve_won = approve_result.is_ok();
    let reject_won = reject_result.is_ok();
    assert_eq!(
        usize::from(approve_won) + usize::from(reject_won),
        1,
        "exactly one concurrent decision may win"
    );

    let loser_error = if approve_won { reject_result.err() } else { approve_result.err() }
        .expect("the losing call carries an error");
    assert!(matches!(loser_error, EngineError::StateConflict { .. }));

    // The ledger matches whichever decision won: deducted on approval,
    // untouched (or compensated) on rejection.
    let balances = service
        .balance_of(&EmployeeId::new("e-dev"), Some(2026))
        .await
        .expect("balances");
    let vacation_row = balances
        .iter()
        .find(|view| view.category == LeaveCategory::Vacation)
        .expect("vacation row");
    let queue = service
        .pending_for_approver(&EmployeeId::new("e-mgr"))
        .await
        .expect("queue");
    assert!(queue.is_empty(), "request left the pending queue");
    if approve_won {
        assert_eq!(vacation_row.used_days, Decimal::from(3));
    } else {
        assert_eq!(vacation_row.used_days, Decimal::ZERO);
    }
}

#[tokio::test]
async fn concurrent_approvals_cannot_double_spend_the_ledger() {
    let mut config = LeavePolicyConfig::default();
    config.default_allocations.insert(LeaveCategory::Vacation, Decimal::from(4));
    let service = service_with_config(config);

    // Two non-overlapping three-day requests against a four-day allocation.
    let first = apply_pending(&service, date(2026, 6, 22), date(2026, 6, 24)).await;
    let second = apply_pending(&service, date(2026, 7, 6), date(2026, 7, 8)).await;

    let approver = EmployeeId::new("e-mgr");
    let (first_result, second_result) = tokio::join!(
        service.approve_on(today(), &first, &approver, None),
        service.approve_on(today(), &second, &approver, None),
    );

    let successes =
        usize::from(first_result.is_ok()) + usize::from(second_result.is_ok());
    assert_eq!(successes, 1, "only one approval fits the allocation");

    let loser = if first_result.is_ok() { second_result } else { first_result };
    assert!(matches!(loser, Err(EngineError::LedgerConflict { .. })));

    let balances = service
        .balance_of(&EmployeeId::new("e-dev"), Some(2026))
        .await
        .expect("balances");
    let vacation_row = balances
        .iter()
        .find(|view| view.category == LeaveCategory::Vacation)
        .expect("vacation row");
    assert_eq!(vacation_row.used_days, Decimal::from(3));
    assert_eq!(vacation_row.available_days, Decimal::from(1));
}

#[tokio::test]
async fn approving_the_second_of_two_overlapping_pending_requests_fails() {
    let service = service();
    // Pending requests never block each other at submission time.
    let first = apply_pending(&service, date(2026, 6, 22), date(2026, 6, 24)).await;
    let second = apply_pending(&service, date(2026, 6, 23), date(2026, 6, 25)).await;

    let approver = EmployeeId::new("e-mgr");
    service
        .approve_on(today(), &first, &approver, None)
        .await
        .expect("first approval lands");

    let error = service
        .approve_on(today(), &second, &approver, None)
        .await
        .expect_err("approval-time overlap re-check must catch the conflict");
    assert!(matches!(error, EngineError::ValidationFailed(_)));
}

#[tokio::test]
async fn overlap_is_checked_end_to_end_against_approved_leave() {
    let service = service();
    let first = apply_pending(&service, date(2026, 6, 16), date(2026, 6, 18)).await;
    service
        .approve_on(today(), &first, &EmployeeId::new("e-mgr"), None)
        .await
        .expect("approve first request");

    let error = service
        .apply_on(today(), vacation(date(2026, 6, 17), date(2026, 6, 19)))
        .await
        .expect_err("overlapping submission is rejected");
    match error {
        EngineError::ValidationFailed(reasons) => {
            let message = reasons
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            assert!(message.contains("2026-06-16"), "conflict names the existing range");
            assert!(message.contains("2026-06-18"));
        }
        other => panic!("expected ValidationFailed, got {other:?}"),
    }

    // Adjacent but non-overlapping range is accepted.
    let outcome = service
        .apply_on(today(), vacation(date(2026, 6, 19), date(2026, 6, 23)))
        .await
        .expect("non-overlapping submission is accepted");
    assert_eq!(outcome.request.status, RequestStatus::Pending);
}

#[tokio::test]
async fn self_approval_is_rejected_regardless_of_hierarchy() {
    let service = service();
    let request_id = apply_pending(&service, date(2026, 6, 22), date(2026, 6, 24)).await;

    let error = service
        .approve_on(today(), &request_id, &EmployeeId::new("e-dev"), None)
        .await
        .expect_err("owner cannot approve their own request");
    assert!(matches!(error, EngineError::Unauthorized(_)));
}

#[tokio::test]
async fn emergency_bypasses_an_exhausted_balance_and_auto_approves() {
    let mut config = LeavePolicyConfig::default();
    config.default_allocations.insert(LeaveCategory::Vacation, Decimal::ZERO);
    let service = service_with_config(config);

    let outcome = service
        .apply_on(
            today(),
            ApplyRequest {
                duration: LeaveDuration::HalfDay,
                is_emergency: true,
                ..vacation(date(2026, 6, 15), date(2026, 6, 17))
            },
        )
        .await
        .expect("emergency request is admitted at zero availability");

    assert_eq!(outcome.request.status, RequestStatus::AutoApproved);
    assert_eq!(outcome.request.total_days, Decimal::new(15, 1));
}

#[tokio::test]
async fn backdated_window_warns_inside_and_rejects_beyond() {
    let service = service();

    // 29 days back from 2026-06-15.
    let accepted = service
        .apply_on(today(), vacation(date(2026, 5, 17), date(2026, 5, 20)))
        .await
        .expect("inside the window");
    assert!(accepted.request.is_backdated);
    assert!(accepted
        .warnings
        .iter()
        .any(|warning| matches!(warning, ValidationWarning::Backdated { days_back: 29 })));

    // 31 days back.
    let error = service
        .apply_on(today(), vacation(date(2026, 5, 15), date(2026, 5, 19)))
        .await
        .expect_err("beyond the window");
    match error {
        EngineError::ValidationFailed(reasons) => {
            let message = reasons
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            assert!(message.contains("backdated window"));
        }
        other => panic!("expected ValidationFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn delegation_escalates_while_the_manager_is_on_leave() {
    let service = service();

    // Put the manager on approved leave covering the decision date.
    let manager_leave = service
        .apply_on(
            today(),
            ApplyRequest {
                employee_id: EmployeeId::new("e-mgr"),
                ..vacation(date(2026, 6, 15), date(2026, 6, 17))
            },
        )
        .await
        .expect("manager applies");
    let manager_request = RequestId::new(manager_leave.request.id);
    service
        .approve_on(today(), &manager_request, &EmployeeId::new("e-root"), None)
        .await
        .expect("root approves the manager's leave");

    let request_id = apply_pending(&service, date(2026, 6, 22), date(2026, 6, 24)).await;

    // The on-leave manager may not decide.
    let error = service
        .approve_on(today(), &request_id, &EmployeeId::new("e-mgr"), None)
        .await
        .expect_err("unavailable manager cannot act");
    assert!(matches!(error, EngineError::Unauthorized(_)));

    // The manager's manager may, with a delegation note attached.
    let decision = service
        .approve_on(today(), &request_id, &EmployeeId::new("e-root"), None)
        .await
        .expect("chain escalation");
    assert!(decision.delegation.is_some());
    assert_eq!(decision.request.approver.as_deref(), Some("e-root"));
}
