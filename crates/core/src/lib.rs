pub mod audit;
pub mod calendar;
pub mod config;
pub mod delegation;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod stores;
pub mod validation;
pub mod views;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use calendar::{classify, DayClass, WorkCalendar};
pub use config::{ConfigError, ConfigOverrides, LeavePolicyConfig, LoadOptions};
pub use delegation::{
    ActiveLeaveCalendar, AuthorizationError, AuthorizedApprover, DelegationNote,
    DelegationResolver, StaticLeaveCalendar,
};
pub use domain::employee::{Employee, EmployeeId, HierarchyError, OrgChart};
pub use domain::leave_balance::{BalanceKey, DeductionMode, LeaveBalance};
pub use domain::leave_request::{
    LeaveCategory, LeaveDuration, LeaveRequest, RequestDraft, RequestId, RequestStatus,
};
pub use errors::EngineError;
pub use lifecycle::{ApplyOutcome, ApplyRequest, DecisionOutcome, LeaveService};
pub use stores::{
    EmployeeDirectory, InMemoryEmployeeDirectory, InMemoryLeaveBalanceStore,
    InMemoryLeaveRequestStore, LeaveBalanceStore, LeaveRequestStore, StoreBackedCalendar,
    StoreError,
};
pub use validation::{
    LeaveValidator, RejectionReason, ValidationInput, ValidationOutcome, ValidationWarning,
};
pub use views::{BalanceView, RequestView};
