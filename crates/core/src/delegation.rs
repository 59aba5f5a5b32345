use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::employee::{Employee, EmployeeId, OrgChart};
use crate::domain::leave_request::{LeaveRequest, RequestId};
use crate::stores::StoreError;

/// Answers "is this employee on approved leave covering the given date".
/// Backed by the request store in production; tests may use
/// [`StaticLeaveCalendar`].
#[async_trait]
pub trait ActiveLeaveCalendar: Send + Sync {
    async fn on_leave(&self, employee_id: &EmployeeId, date: NaiveDate)
        -> Result<bool, StoreError>;
}

/// Fixed absence table for tests and wiring without a request store.
#[derive(Clone, Debug, Default)]
pub struct StaticLeaveCalendar {
    absences: Vec<(EmployeeId, NaiveDate, NaiveDate)>,
}

impl StaticLeaveCalendar {
    pub fn with_absences(absences: Vec<(EmployeeId, NaiveDate, NaiveDate)>) -> Self {
        Self { absences }
    }
}

#[async_trait]
impl ActiveLeaveCalendar for StaticLeaveCalendar {
    async fn on_leave(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
    ) -> Result<bool, StoreError> {
        Ok(self
            .absences
            .iter()
            .any(|(id, start, end)| id == employee_id && *start <= date && date <= *end))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("employee `{0}` not found")]
    EmployeeNotFound(EmployeeId),
    #[error("approver `{0}` not found")]
    ApproverNotFound(EmployeeId),
    #[error("employees cannot act on their own leave (`{0}`)")]
    SelfApproval(EmployeeId),
    #[error("direct manager `{0}` is on leave on the decision date; an alternate must act")]
    ManagerUnavailable(EmployeeId),
    #[error("`{approver}` is not in the approval chain for `{employee}`")]
    NotInApprovalChain { approver: EmployeeId, employee: EmployeeId },
    #[error("`{requester}` does not own request `{request}`")]
    NotOwner { requester: EmployeeId, request: RequestId },
    #[error("no approver could be resolved for `{0}`")]
    NoResolvableApprover(EmployeeId),
}

#[derive(Debug, Error)]
pub enum DelegationError {
    #[error(transparent)]
    Unauthorized(#[from] AuthorizationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How an authorization succeeded when the approver was not the available
/// direct manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DelegationNote {
    AlternateForUnavailableManager { manager: EmployeeId },
    ManagementChainEscalation,
    TopLevelApprover,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizedApprover {
    pub approver: Employee,
    pub note: Option<DelegationNote>,
}

/// Resolves who may act on a request, over a fresh hierarchy snapshot and an
/// active-leave lookup. Built per call; never cached across calls.
pub struct DelegationResolver<'a, C> {
    org: &'a OrgChart,
    leave_calendar: &'a C,
    emergency_auto_approve_ceiling: Decimal,
}

impl<'a, C> DelegationResolver<'a, C>
where
    C: ActiveLeaveCalendar,
{
    pub fn new(
        org: &'a OrgChart,
        leave_calendar: &'a C,
        emergency_auto_approve_ceiling: Decimal,
    ) -> Self {
        Self { org, leave_calendar, emergency_auto_approve_ceiling }
    }

    /// The employee's direct manager, or a top-level fallback when no manager
    /// exists (a dangling manager reference counts as none).
    pub fn resolve_approver(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<&'a Employee, AuthorizationError> {
        let employee = self
            .org
            .get(employee_id)
            .ok_or_else(|| AuthorizationError::EmployeeNotFound(employee_id.clone()))?;

        if let Some(manager) = employee.manager_id.as_ref().and_then(|id| self.org.get(id)) {
            return Ok(manager);
        }

        self.org
            .top_level()
            .into_iter()
            .find(|candidate| candidate.id != *employee_id)
            .ok_or_else(|| AuthorizationError::NoResolvableApprover(employee_id.clone()))
    }

    pub async fn is_manager_available(
        &self,
        manager_id: &EmployeeId,
        on_date: NaiveDate,
    ) -> Result<bool, StoreError> {
        Ok(!self.leave_calendar.on_leave(manager_id, on_date).await?)
    }

    /// Ordered fallback candidates when the direct manager cannot act:
    /// the manager's own manager; else department managers by descending
    /// subordinate count; else the top-level fallback.
    pub fn alternate_approvers(&self, manager_id: &EmployeeId) -> Vec<&'a Employee> {
        let Some(manager) = self.org.get(manager_id) else {
            return self.org.top_level();
        };

        if let Some(above) = manager.manager_id.as_ref().and_then(|id| self.org.get(id)) {
            return vec![above];
        }

        let mut peers: Vec<(&Employee, usize)> = self
            .org
            .department_peers(&manager.department, manager_id)
            .into_iter()
            .map(|peer| (peer, self.org.subordinate_count(&peer.id)))
            .filter(|(_, subordinates)| *subordinates > 0)
            .collect();
        if !peers.is_empty() {
            peers.sort_by(|(left, left_count), (right, right_count)| {
                right_count.cmp(left_count).then_with(|| left.id.cmp(&right.id))
            });
            return peers.into_iter().map(|(peer, _)| peer).collect();
        }

        self.org.top_level()
    }

    /// Validates that `approver_id` may decide `request` on `on_date`.
    /// Self-approval is always forbidden, independent of hierarchy.
    pub async fn authorize(
        &self,
        approver_id: &EmployeeId,
        request: &LeaveRequest,
        on_date: NaiveDate,
    ) -> Result<AuthorizedApprover, DelegationError> {
        let employee = self.org.get(&request.employee_id).ok_or_else(|| {
            AuthorizationError::EmployeeNotFound(request.employee_id.clone())
        })?;
        let approver = self
            .org
            .get(approver_id)
            .ok_or_else(|| AuthorizationError::ApproverNotFound(approver_id.clone()))?;

        if approver.id == employee.id {
            return Err(AuthorizationError::SelfApproval(approver.id.clone()).into());
        }

        let direct_manager = employee.manager_id.as_ref().and_then(|id| self.org.get(id));

        if let Some(manager) = direct_manager {
            if manager.id == approver.id {
                if self.is_manager_available(&manager.id, on_date).await? {
                    return Ok(AuthorizedApprover { approver: approver.clone(), note: None });
                }
                return Err(AuthorizationError::ManagerUnavailable(manager.id.clone()).into());
            }

            // Anywhere above the direct manager in the management chain.
            let chain = self.org.manager_chain(&employee.id);
            if chain.iter().skip(1).any(|id| id == &approver.id) {
                return Ok(AuthorizedApprover {
                    approver: approver.clone(),
                    note: Some(DelegationNote::ManagementChainEscalation),
                });
            }

            if !self.is_manager_available(&manager.id, on_date).await?
                && self
                    .alternate_approvers(&manager.id)
                    .iter()
                    .any(|candidate| candidate.id == approver.id)
            {
                return Ok(AuthorizedApprover {
                    approver: approver.clone(),
                    note: Some(DelegationNote::AlternateForUnavailableManager {
                        manager: manager.id.clone(),
                    }),
                });
            }
        }

        if approver.is_top_level() {
            return Ok(AuthorizedApprover {
                approver: approver.clone(),
                note: Some(DelegationNote::TopLevelApprover),
            });
        }

        Err(AuthorizationError::NotInApprovalChain {
            approver: approver.id.clone(),
            employee: employee.id.clone(),
        }
        .into())
    }

    /// System-granted approval for short emergency requests; independent of
    /// manager availability.
    pub fn can_auto_approve(&self, is_emergency: bool, total_days: Decimal) -> bool {
        is_emergency && total_days <= self.emergency_auto_approve_ceiling
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{
        AuthorizationError, DelegationError, DelegationNote, DelegationResolver,
        StaticLeaveCalendar,
    };
    use crate::domain::employee::{Employee, EmployeeId, OrgChart};
    use crate::domain::leave_request::{
        LeaveCategory, LeaveDuration, LeaveRequest, RequestDraft, RequestStatus,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
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

    // e-root
    //   e-head (engineering), e-mgr-2 (engineering)
    //     e-lead (under e-head)
    //       e-dev
    fn org() -> OrgChart {
        OrgChart::from_employees(vec![
            employee("e-root", "people", None),
            employee("e-head", "engineering", Some("e-root")),
            employee("e-mgr-2", "engineering", Some("e-root")),
            employee("e-lead", "engineering", Some("e-head")),
            employee("e-dev", "engineering", Some("e-lead")),
            employee("e-dev-2", "engineering", Some("e-mgr-2")),
        ])
    }

    fn request_for(owner: &str) -> LeaveRequest {
        let now = Utc.with_ymd_and_hms(2026, 6, 15, 9, 0, 0).unwrap();
        LeaveRequest::admit(
            RequestDraft {
                employee_id: EmployeeId::new(owner),
                category: LeaveCategory::Vacation,
                start_date: date(2026, 6, 22),
                end_date: date(2026, 6, 24),
                duration: LeaveDuration::FullDay,
                reason: "pto".to_string(),
                comments: None,
                is_emergency: false,
            },
            Decimal::from(3),
            RequestStatus::Pending,
            date(2026, 6, 15),
            now,
        )
    }

    fn on_leave(id: &str, start: NaiveDate, end: NaiveDate) -> StaticLeaveCalendar {
        StaticLeaveCalendar::with_absences(vec![(EmployeeId::new(id), start, end)])
    }

    #[tokio::test]
    async fn direct_manager_authorizes_cleanly_when_available() {
        let org = org();
        let calendar = StaticLeaveCalendar::default();
        let resolver = DelegationResolver::new(&org, &calendar, Decimal::from(2));

        let authorized = resolver
            .authorize(&EmployeeId::new("e-lead"), &request_for("e-dev"), date(2026, 6, 15))
            .await
            .expect("direct manager authorizes");
        assert_eq!(authorized.approver.id, EmployeeId::new("e-lead"));
        assert!(authorized.note.is_none());
    }

    #[tokio::test]
    async fn self_approval_is_always_rejected() {
        let org = org();
        let calendar = StaticLeaveCalendar::default();
        let resolver = DelegationResolver::new(&org, &calendar, Decimal::from(2));

        let error = resolver
            .authorize(&EmployeeId::new("e-dev"), &request_for("e-dev"), date(2026, 6, 15))
            .await
            .expect_err("owner must not act on their own request");
        assert!(matches!(
            error,
            DelegationError::Unauthorized(AuthorizationError::SelfApproval(_))
        ));
    }

    #[tokio::test]
    async fn unavailable_manager_cannot_act_themselves() {
        let org = org();
        let calendar = on_leave("e-lead", date(2026, 6, 14), date(2026, 6, 16));
        let resolver = DelegationResolver::new(&org, &calendar, Decimal::from(2));

        let error = resolver
            .authorize(&EmployeeId::new("e-lead"), &request_for("e-dev"), date(2026, 6, 15))
            .await
            .expect_err("manager on leave must not decide");
        assert!(matches!(
            error,
            DelegationError::Unauthorized(AuthorizationError::ManagerUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn chain_above_the_direct_manager_passes_with_note() {
        let org = org();
        let calendar = StaticLeaveCalendar::default();
        let resolver = DelegationResolver::new(&org, &calendar, Decimal::from(2));

        let authorized = resolver
            .authorize(&EmployeeId::new("e-head"), &request_for("e-dev"), date(2026, 6, 15))
            .await
            .expect("manager's manager authorizes");
        assert_eq!(authorized.note, Some(DelegationNote::ManagementChainEscalation));
    }

    #[tokio::test]
    async fn alternate_passes_only_while_manager_is_unavailable() {
        let org = org();
        // e-lead's manager chain alternate is e-head (the manager's manager).
        let available = StaticLeaveCalendar::default();
        let resolver = DelegationResolver::new(&org, &available, Decimal::from(2));
        let error = resolver
            .authorize(&EmployeeId::new("e-mgr-2"), &request_for("e-dev"), date(2026, 6, 15))
            .await
            .expect_err("peer manager is not in the chain while e-lead is available");
        assert!(matches!(
            error,
            DelegationError::Unauthorized(AuthorizationError::NotInApprovalChain { .. })
        ));
    }

    #[tokio::test]
    async fn department_alternate_acts_when_manager_unavailable() {
        // e-dev-2 reports to e-mgr-2, who is top-managed, so alternates for
        // e-mgr-2 are engineering managers by subordinate count.
        let mut employees = vec![
            employee("e-mgr-2", "engineering", None),
            employee("e-mgr-3", "engineering", None),
            employee("e-dev-2", "engineering", Some("e-mgr-2")),
            employee("e-dev-3", "engineering", Some("e-mgr-3")),
            employee("e-dev-4", "engineering", Some("e-mgr-3")),
        ];
        employees.push(employee("e-hr", "people", None));
        let org = OrgChart::from_employees(employees);
        let calendar = on_leave("e-mgr-2", date(2026, 6, 14), date(2026, 6, 16));
        let resolver = DelegationResolver::new(&org, &calendar, Decimal::from(2));

        let alternates: Vec<&str> = resolver
            .alternate_approvers(&EmployeeId::new("e-mgr-2"))
            .iter()
            .map(|candidate| candidate.id.0.as_str())
            .collect();
        assert_eq!(alternates, vec!["e-mgr-3"]);

        let authorized = resolver
            .authorize(&EmployeeId::new("e-mgr-3"), &request_for("e-dev-2"), date(2026, 6, 15))
            .await
            .expect("department alternate authorizes while manager is away");
        assert_eq!(
            authorized.note,
            Some(DelegationNote::AlternateForUnavailableManager {
                manager: EmployeeId::new("e-mgr-2")
            })
        );
    }

    #[tokio::test]
    async fn top_level_employee_always_passes_with_note() {
        let org = org();
        let calendar = StaticLeaveCalendar::default();
        let resolver = DelegationResolver::new(&org, &calendar, Decimal::from(2));

        let authorized = resolver
            .authorize(&EmployeeId::new("e-root"), &request_for("e-dev"), date(2026, 6, 15))
            .await
            .expect("top-level employee authorizes");
        // e-root is in the chain above e-lead, so the chain note wins.
        assert_eq!(authorized.note, Some(DelegationNote::ManagementChainEscalation));
    }

    #[test]
    fn resolve_approver_prefers_the_direct_manager() {
        let org = org();
        let calendar = StaticLeaveCalendar::default();
        let resolver = DelegationResolver::new(&org, &calendar, Decimal::from(2));

        let approver =
            resolver.resolve_approver(&EmployeeId::new("e-dev")).expect("resolved approver");
        assert_eq!(approver.id, EmployeeId::new("e-lead"));
    }

    #[test]
    fn resolve_approver_falls_back_to_top_level() {
        let org = OrgChart::from_employees(vec![
            employee("e-solo", "sales", None),
            employee("e-hr", "people", None),
        ]);
        let calendar = StaticLeaveCalendar::default();
        let resolver = DelegationResolver::new(&org, &calendar, Decimal::from(2));

        let approver =
            resolver.resolve_approver(&EmployeeId::new("e-solo")).expect("fallback approver");
        assert_eq!(approver.id, EmployeeId::new("e-hr"));
    }

    #[test]
    fn resolve_approver_fails_in_a_single_person_org() {
        let org = OrgChart::from_employees(vec![employee("e-solo", "sales", None)]);
        let calendar = StaticLeaveCalendar::default();
        let resolver = DelegationResolver::new(&org, &calendar, Decimal::from(2));

        let error = resolver
            .resolve_approver(&EmployeeId::new("e-solo"))
            .expect_err("nobody left to approve");
        assert_eq!(error, AuthorizationError::NoResolvableApprover(EmployeeId::new("e-solo")));
    }

    #[test]
    fn auto_approval_is_bounded_by_the_ceiling() {
        let org = org();
        let calendar = StaticLeaveCalendar::default();
        let resolver = DelegationResolver::new(&org, &calendar, Decimal::from(2));

        assert!(resolver.can_auto_approve(true, Decimal::new(15, 1)));
        assert!(resolver.can_auto_approve(true, Decimal::from(2)));
        assert!(!resolver.can_auto_approve(true, Decimal::new(25, 1)));
        assert!(!resolver.can_auto_approve(false, Decimal::ONE));
    }
}
