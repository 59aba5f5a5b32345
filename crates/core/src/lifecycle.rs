use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::config::LeavePolicyConfig;
use crate::delegation::{AuthorizationError, DelegationNote, DelegationResolver};
use crate::domain::employee::EmployeeId;
use crate::domain::leave_balance::{BalanceKey, DeductionMode, LeaveBalance};
use crate::domain::leave_request::{
    LeaveCategory, LeaveDuration, LeaveRequest, RequestDraft, RequestId, RequestStatus,
};
use crate::errors::EngineError;
use crate::stores::{
    EmployeeDirectory, LeaveBalanceStore, LeaveRequestStore, StoreBackedCalendar,
};
use crate::validation::{summarize, LeaveValidator, RejectionReason, ValidationInput};
use crate::views::{BalanceView, RequestView};

/// The `apply` operation's input, as a transport shim would hand it over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyRequest {
    pub employee_id: EmployeeId,
    pub category: LeaveCategory,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration: LeaveDuration,
    pub reason: String,
    pub is_emergency: bool,
    pub backdated_justification: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ApplyOutcome {
    pub request: RequestView,
    pub warnings: Vec<crate::validation::ValidationWarning>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecisionOutcome {
    pub request: RequestView,
    pub delegation: Option<DelegationNote>,
}

enum ApprovalKind {
    Approve,
    Regularize,
}

impl ApprovalKind {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Approve => "request.approved",
            Self::Regularize => "request.regularized",
        }
    }
}

/// Orchestrates validation, delegation, state transitions, and the balance
/// ledger. The single component allowed to mutate request status and ledger
/// usage; every operation is one logical transaction, with the ledger write
/// ordered before the guarded transition and compensated if the transition
/// loses a race.
pub struct LeaveService<R, B, D> {
    requests: Arc<R>,
    balances: Arc<B>,
    directory: Arc<D>,
    config: LeavePolicyConfig,
    validator: LeaveValidator,
    audit: Arc<dyn AuditSink>,
}

fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

impl<R, B, D> LeaveService<R, B, D>
where
    R: LeaveRequestStore,
    B: LeaveBalanceStore,
    D: EmployeeDirectory,
{
    pub fn new(
        requests: Arc<R>,
        balances: Arc<B>,
        directory: Arc<D>,
        config: LeavePolicyConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let validator = LeaveValidator::new(&config);
        Self { requests, balances, directory, config, validator, audit }
    }

    pub fn config(&self) -> &LeavePolicyConfig {
        &self.config
    }

    pub async fn apply(&self, input: ApplyRequest) -> Result<ApplyOutcome, EngineError> {
        self.apply_on(today_utc(), input).await
    }

    /// `apply` with an explicit submission date. The date-sensitive rules
    /// (backdating, same-day emergencies) key off `today`.
    pub async fn apply_on(
        &self,
        today: NaiveDate,
        input: ApplyRequest,
    ) -> Result<ApplyOutcome, EngineError> {
        let employee = self
            .directory
            .find_by_id(&input.employee_id)
            .await?
            .ok_or_else(|| EngineError::EmployeeNotFound(input.employee_id.clone()))?;

        let key =
            BalanceKey::new(employee.id.clone(), input.category, input.start_date.year());
        let balance = self.ensure_balance(&key).await?;
        let existing = self
            .requests
            .find_overlapping(&employee.id, input.start_date, input.end_date, None)
            .await?;

        let draft = RequestDraft {
            employee_id: input.employee_id,
            category: input.category,
            start_date: input.start_date,
            end_date: input.end_date,
            duration: input.duration,
            reason: input.reason,
            comments: input.backdated_justification,
            is_emergency: input.is_emergency,
        };

        let outcome = self.validator.validate(&ValidationInput {
            employee: &employee,
            draft: &draft,
            balance: &balance,
            existing: &existing,
            today,
            exclude: None,
        });
        if !outcome.is_valid() {
            self.audit.emit(
                AuditEvent::new(
                    None,
                    Some(employee.id.clone()),
                    "request.validation_failed",
                    AuditCategory::Validation,
                    employee.id.0.clone(),
                    AuditOutcome::Rejected,
                )
                .with_metadata("reasons", summarize(&outcome.reasons)),
            );
            return Err(EngineError::ValidationFailed(outcome.reasons));
        }

        let requested_days = outcome.requested_days;
        let org = self.directory.org_chart().await?;
        let availability = StoreBackedCalendar(Arc::clone(&self.requests));
        let resolver = DelegationResolver::new(
            &org,
            &availability,
            self.config.emergency_auto_approve_ceiling,
        );

        if resolver.can_auto_approve(draft.is_emergency, requested_days) {
            let approver = match resolver.resolve_approver(&employee.id) {
                Ok(approver) => Some(approver.id.clone()),
                Err(error) => {
                    tracing::warn!(
                        employee = %employee.id,
                        %error,
                        "auto-approval proceeding without a resolvable approver"
                    );
                    None
                }
            };

            let mut request = LeaveRequest::admit(
                draft,
                requested_days,
                RequestStatus::AutoApproved,
                today,
                Utc::now(),
            );
            request.approver = approver;

            // Emergency usage is accounted for after the fact, so the
            // deduction runs in overdraft mode; paired with the insert.
            self.balances.deduct(&key, requested_days, DeductionMode::Overdraft).await?;
            if let Err(error) = self.requests.insert(request.clone()).await {
                self.compensate_restore(&key, requested_days, &request.id).await;
                return Err(error.into());
            }

            tracing::info!(
                request = %request.id,
                employee = %request.employee_id,
                days = %requested_days,
                "emergency request auto-approved"
            );
            self.audit.emit(
                AuditEvent::new(
                    Some(request.id.clone()),
                    Some(request.employee_id.clone()),
                    "request.auto_approved",
                    AuditCategory::Transition,
                    request.employee_id.0.clone(),
                    AuditOutcome::Success,
                )
                .with_metadata("total_days", requested_days.to_string()),
            );
            return Ok(ApplyOutcome {
                request: RequestView::from(&request),
                warnings: outcome.warnings,
            });
        }

        // Balance is only consumed on approval, not on submission.
        let request = LeaveRequest::admit(
            draft,
            requested_days,
            RequestStatus::Pending,
            today,
            Utc::now(),
        );
        self.requests.insert(request.clone()).await?;

        tracing::info!(
            request = %request.id,
            employee = %request.employee_id,
            days = %requested_days,
            "leave request submitted"
        );
        self.audit.emit(AuditEvent::new(
            Some(request.id.clone()),
            Some(request.employee_id.clone()),
            "request.applied",
            AuditCategory::Transition,
            request.employee_id.0.clone(),
            AuditOutcome::Success,
        ));
        Ok(ApplyOutcome { request: RequestView::from(&request), warnings: outcome.warnings })
    }

    pub async fn approve(
        &self,
        request_id: &RequestId,
        approver_id: &EmployeeId,
        comments: Option<String>,
    ) -> Result<DecisionOutcome, EngineError> {
        self.approve_on(today_utc(), request_id, approver_id, comments).await
    }

    pub async fn approve_on(
        &self,
        today: NaiveDate,
        request_id: &RequestId,
        approver_id: &EmployeeId,
        comments: Option<String>,
    ) -> Result<DecisionOutcome, EngineError> {
        self.decide_approval(today, request_id, approver_id, comments, ApprovalKind::Approve)
            .await
    }

    /// Approve mechanics for backdated requests flagged during validation.
    pub async fn regularize(
        &self,
        request_id: &RequestId,
        approver_id: &EmployeeId,
        note: String,
    ) -> Result<DecisionOutcome, EngineError> {
        self.regularize_on(today_utc(), request_id, approver_id, note).await
    }

    pub async fn regularize_on(
        &self,
        today: NaiveDate,
        request_id: &RequestId,
        approver_id: &EmployeeId,
        note: String,
    ) -> Result<DecisionOutcome, EngineError> {
        let note = (!note.trim().is_empty()).then_some(note);
        self.decide_approval(today, request_id, approver_id, note, ApprovalKind::Regularize)
            .await
    }

    async fn decide_approval(
        &self,
        today: NaiveDate,
        request_id: &RequestId,
        approver_id: &EmployeeId,
        note: Option<String>,
        kind: ApprovalKind,
    ) -> Result<DecisionOutcome, EngineError> {
        let request = self
            .requests
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| EngineError::RequestNotFound(request_id.clone()))?;
        if request.status != RequestStatus::Pending {
            return Err(EngineError::StateConflict {
                id: request.id.clone(),
                expected: RequestStatus::Pending,
                actual: request.status,
            });
        }

        let org = self.directory.org_chart().await?;
        let availability = StoreBackedCalendar(Arc::clone(&self.requests));
        let resolver = DelegationResolver::new(
            &org,
            &availability,
            self.config.emergency_auto_approve_ceiling,
        );
        let authorized = resolver
            .authorize(approver_id, &request, today)
            .await
            .map_err(EngineError::from)?;

        // Guards against a conflicting request approved between submission
        // and this decision.
        let conflicts = self
            .requests
            .find_overlapping(
                &request.employee_id,
                request.start_date,
                request.end_date,
                Some(&request.id),
            )
            .await?;
        if !conflicts.is_empty() {
            let reasons: Vec<RejectionReason> = conflicts
                .iter()
                .map(|other| RejectionReason::OverlapsExisting {
                    other_id: other.id.clone(),
                    other_start: other.start_date,
                    other_end: other.end_date,
                })
                .collect();
            self.audit.emit(
                AuditEvent::new(
                    Some(request.id.clone()),
                    Some(request.employee_id.clone()),
                    "request.approval_conflict",
                    AuditCategory::Validation,
                    approver_id.0.clone(),
                    AuditOutcome::Rejected,
                )
                .with_metadata("reasons", summarize(&reasons)),
            );
            return Err(EngineError::ValidationFailed(reasons));
        }

        let key = BalanceKey::new(
            request.employee_id.clone(),
            request.category,
            request.start_year(),
        );
        self.ensure_balance(&key).await?;
        self.balances.deduct(&key, request.total_days, DeductionMode::Checked).await?;

        let mut updated = request.clone();
        updated.status = RequestStatus::Approved;
        updated.approver = Some(authorized.approver.id.clone());
        if let Some(note) = note {
            updated.comments = Some(match updated.comments.take() {
                Some(existing) => format!("{existing}\n{note}"),
                None => note,
            });
        }
        updated.updated_at = Utc::now();

        if let Err(error) =
            self.requests.transition(&request.id, RequestStatus::Pending, updated.clone()).await
        {
            self.compensate_restore(&key, request.total_days, &request.id).await;
            return Err(error.into());
        }

        tracing::info!(
            request = %updated.id,
            approver = %authorized.approver.id,
            days = %updated.total_days,
            "leave request approved"
        );
        let mut event = AuditEvent::new(
            Some(updated.id.clone()),
            Some(updated.employee_id.clone()),
            kind.event_type(),
            AuditCategory::Transition,
            approver_id.0.clone(),
            AuditOutcome::Success,
        )
        .with_metadata("total_days", updated.total_days.to_string());
        if let Some(delegation) = &authorized.note {
            event = event.with_metadata("delegation", format!("{delegation:?}"));
        }
        self.audit.emit(event);

        Ok(DecisionOutcome {
            request: RequestView::from(&updated),
            delegation: authorized.note,
        })
    }

    pub async fn reject(
        &self,
        request_id: &RequestId,
        approver_id: &EmployeeId,
        reason: String,
    ) -> Result<DecisionOutcome, EngineError> {
        self.reject_on(today_utc(), request_id, approver_id, reason).await
    }

    pub async fn reject_on(
        &self,
        today: NaiveDate,
        request_id: &RequestId,
        approver_id: &EmployeeId,
        reason: String,
    ) -> Result<DecisionOutcome, EngineError> {
        if reason.trim().is_empty() {
            return Err(EngineError::ValidationFailed(vec![
                RejectionReason::EmptyDecisionReason,
            ]));
        }

        let request = self
            .requests
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| EngineError::RequestNotFound(request_id.clone()))?;
        if request.status != RequestStatus::Pending {
            return Err(EngineError::StateConflict {
                id: request.id.clone(),
                expected: RequestStatus::Pending,
                actual: request.status,
            });
        }

        let org = self.directory.org_chart().await?;
        let availability = StoreBackedCalendar(Arc::clone(&self.requests));
        let resolver = DelegationResolver::new(
            &org,
            &availability,
            self.config.emergency_auto_approve_ceiling,
        );
        let authorized = resolver
            .authorize(approver_id, &request, today)
            .await
            .map_err(EngineError::from)?;

        let mut updated = request.clone();
        updated.status = RequestStatus::Rejected;
        updated.approver = Some(authorized.approver.id.clone());
        updated.rejection_reason = Some(reason);
        updated.updated_at = Utc::now();

        self.requests.transition(&request.id, RequestStatus::Pending, updated.clone()).await?;

        tracing::info!(
            request = %updated.id,
            approver = %authorized.approver.id,
            "leave request rejected"
        );
        self.audit.emit(AuditEvent::new(
            Some(updated.id.clone()),
            Some(updated.employee_id.clone()),
            "request.rejected",
            AuditCategory::Transition,
            approver_id.0.clone(),
            AuditOutcome::Success,
        ));

        Ok(DecisionOutcome {
            request: RequestView::from(&updated),
            delegation: authorized.note,
        })
    }

    /// Owner-initiated withdrawal of a still-pending request.
    pub async fn cancel(
        &self,
        request_id: &RequestId,
        requesting_employee_id: &EmployeeId,
    ) -> Result<RequestView, EngineError> {
        let request = self
            .requests
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| EngineError::RequestNotFound(request_id.clone()))?;
        if request.employee_id != *requesting_employee_id {
            return Err(EngineError::Unauthorized(AuthorizationError::NotOwner {
                requester: requesting_employee_id.clone(),
                request: request.id.clone(),
            }));
        }
        if request.status != RequestStatus::Pending {
            return Err(EngineError::StateConflict {
                id: request.id.clone(),
                expected: RequestStatus::Pending,
                actual: request.status,
            });
        }

        let mut updated = request.clone();
        updated.status = RequestStatus::Cancelled;
        updated.updated_at = Utc::now();

        self.requests.transition(&request.id, RequestStatus::Pending, updated.clone()).await?;

        tracing::info!(request = %updated.id, "leave request cancelled by owner");
        self.audit.emit(AuditEvent::new(
            Some(updated.id.clone()),
            Some(updated.employee_id.clone()),
            "request.cancelled",
            AuditCategory::Transition,
            requesting_employee_id.0.clone(),
            AuditOutcome::Success,
        ));

        Ok(RequestView::from(&updated))
    }

    /// Compensating revocation of already-approved leave: a distinct
    /// operation, not a re-entry into the pending flow. Restores the ledger
    /// and requires a delegation-authorized approver.
    pub async fn revoke_approved(
        &self,
        request_id: &RequestId,
        approver_id: &EmployeeId,
        note: Option<String>,
    ) -> Result<DecisionOutcome, EngineError> {
        self.revoke_approved_on(today_utc(), request_id, approver_id, note).await
    }

    pub async fn revoke_approved_on(
        &self,
        today: NaiveDate,
        request_id: &RequestId,
        approver_id: &EmployeeId,
        note: Option<String>,
    ) -> Result<DecisionOutcome, EngineError> {
        let request = self
            .requests
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| EngineError::RequestNotFound(request_id.clone()))?;
        if !request.status.blocks_overlap() {
            return Err(EngineError::StateConflict {
                id: request.id.clone(),
                expected: RequestStatus::Approved,
                actual: request.status,
            });
        }

        let org = self.directory.org_chart().await?;
        let availability = StoreBackedCalendar(Arc::clone(&self.requests));
        let resolver = DelegationResolver::new(
            &org,
            &availability,
            self.config.emergency_auto_approve_ceiling,
        );
        let authorized = resolver
            .authorize(approver_id, &request, today)
            .await
            .map_err(EngineError::from)?;

        let key = BalanceKey::new(
            request.employee_id.clone(),
            request.category,
            request.start_year(),
        );
        self.balances.restore(&key, request.total_days).await?;

        let mut updated = request.clone();
        updated.status = RequestStatus::Cancelled;
        if let Some(note) = note {
            updated.comments = Some(match updated.comments.take() {
                Some(existing) => format!("{existing}\n{note}"),
                None => note,
            });
        }
        updated.updated_at = Utc::now();

        if let Err(error) =
            self.requests.transition(&request.id, request.status, updated.clone()).await
        {
            // Undo the restoration so the ledger still matches the surviving
            // approved state.
            if let Err(deduct_error) = self
                .balances
                .deduct(&key, request.total_days, DeductionMode::Overdraft)
                .await
            {
                tracing::error!(
                    request = %request.id,
                    %deduct_error,
                    "compensating re-deduction failed after lost revocation race"
                );
            }
            return Err(error.into());
        }

        tracing::info!(
            request = %updated.id,
            approver = %authorized.approver.id,
            days = %updated.total_days,
            "approved leave revoked and ledger restored"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(updated.id.clone()),
                Some(updated.employee_id.clone()),
                "request.revoked",
                AuditCategory::Ledger,
                approver_id.0.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("restored_days", updated.total_days.to_string()),
        );

        Ok(DecisionOutcome {
            request: RequestView::from(&updated),
            delegation: authorized.note,
        })
    }

    /// Every request the employee has ever filed, oldest first.
    pub async fn requests_of(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<RequestView>, EngineError> {
        self.directory
            .find_by_id(employee_id)
            .await?
            .ok_or_else(|| EngineError::EmployeeNotFound(employee_id.clone()))?;
        let requests = self.requests.list_for_employee(employee_id).await?;
        Ok(requests.iter().map(RequestView::from).collect())
    }

    pub async fn balance_of(
        &self,
        employee_id: &EmployeeId,
        year: Option<i32>,
    ) -> Result<Vec<BalanceView>, EngineError> {
        self.directory
            .find_by_id(employee_id)
            .await?
            .ok_or_else(|| EngineError::EmployeeNotFound(employee_id.clone()))?;
        let balances = self.balances.list_for_employee(employee_id, year).await?;
        Ok(balances.iter().map(BalanceView::from).collect())
    }

    /// Creates any missing per-category rows for the year from the configured
    /// default allocations.
    pub async fn initialize_year(
        &self,
        employee_id: &EmployeeId,
        year: i32,
    ) -> Result<Vec<BalanceView>, EngineError> {
        self.directory
            .find_by_id(employee_id)
            .await?
            .ok_or_else(|| EngineError::EmployeeNotFound(employee_id.clone()))?;

        let mut views = Vec::new();
        for (category, allocation) in &self.config.default_allocations {
            let row = self
                .balances
                .initialize_if_absent(LeaveBalance::new(
                    employee_id.clone(),
                    *category,
                    year,
                    *allocation,
                    Utc::now(),
                ))
                .await?;
            views.push(BalanceView::from(&row));
        }
        Ok(views)
    }

    /// Year-end renewal: copies each category's allocation forward into the
    /// next year with zero usage. Falls back to the configured defaults when
    /// the source year has no rows.
    pub async fn renew_year(
        &self,
        employee_id: &EmployeeId,
        from_year: i32,
    ) -> Result<Vec<BalanceView>, EngineError> {
        self.directory
            .find_by_id(employee_id)
            .await?
            .ok_or_else(|| EngineError::EmployeeNotFound(employee_id.clone()))?;

        let current = self.balances.list_for_employee(employee_id, Some(from_year)).await?;
        if current.is_empty() {
            return self.initialize_year(employee_id, from_year + 1).await;
        }

        let mut views = Vec::new();
        for row in current {
            let renewed = self
                .balances
                .initialize_if_absent(LeaveBalance::new(
                    employee_id.clone(),
                    row.category,
                    from_year + 1,
                    row.total_days,
                    Utc::now(),
                ))
                .await?;
            views.push(BalanceView::from(&renewed));
        }
        Ok(views)
    }

    /// The approval queue: pending requests of the approver's direct reports,
    /// plus unmanaged employees when the approver is the top-level fallback.
    pub async fn pending_for_approver(
        &self,
        approver_id: &EmployeeId,
    ) -> Result<Vec<RequestView>, EngineError> {
        let org = self.directory.org_chart().await?;
        let approver = org
            .get(approver_id)
            .ok_or_else(|| EngineError::EmployeeNotFound(approver_id.clone()))?;

        let mut owners: Vec<EmployeeId> =
            org.direct_reports(approver_id).iter().map(|report| report.id.clone()).collect();
        if approver.is_top_level() {
            for employee in org.iter() {
                let unmanaged = match &employee.manager_id {
                    None => true,
                    Some(manager_id) => !org.contains(manager_id),
                };
                if unmanaged && employee.id != *approver_id && !owners.contains(&employee.id) {
                    owners.push(employee.id.clone());
                }
            }
        }

        let pending = self.requests.list_pending_owned_by(&owners).await?;
        Ok(pending.iter().map(RequestView::from).collect())
    }

    async fn ensure_balance(&self, key: &BalanceKey) -> Result<LeaveBalance, EngineError> {
        if let Some(balance) = self.balances.find(key).await? {
            return Ok(balance);
        }
        let allocation = self.config.allocation_for(key.category);
        let row = self
            .balances
            .initialize_if_absent(LeaveBalance::new(
                key.employee_id.clone(),
                key.category,
                key.year,
                allocation,
                Utc::now(),
            ))
            .await?;
        Ok(row)
    }

    async fn compensate_restore(&self, key: &BalanceKey, days: Decimal, request: &RequestId) {
        if let Err(restore_error) = self.balances.restore(key, days).await {
            tracing::error!(
                request = %request,
                %restore_error,
                "compensating restore failed after lost transition"
            );
        }
    }
}
