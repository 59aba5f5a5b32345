use leaveflow_core::StoreError;

pub mod employee;
pub mod leave_balance;
pub mod leave_request;

pub use employee::SqlEmployeeDirectory;
pub use leave_balance::SqlLeaveBalanceRepository;
pub use leave_request::SqlLeaveRequestRepository;

pub(crate) fn backend_error(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

pub(crate) fn decode_error(message: impl Into<String>) -> StoreError {
    StoreError::Backend(message.into())
}
