use std::time::Duration;
use tablelock::error::{Error, TableLockError};

#[test]
fn test_timeout_error_classification() {
    let err = TableLockError::timed_out(Duration::from_secs(5));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_cancelled_error_classification() {
    assert_eq!(TableLockError::Cancelled.exit_code(), 3);
}

#[test]
fn test_general_error_classification() {
    assert_eq!(TableLockError::Disposed.exit_code(), 1);
    assert_eq!(TableLockError::ActionFailed("x".to_string()).exit_code(), 1);
    assert_eq!(
        TableLockError::InvariantViolated("overlap".to_string()).exit_code(),
        1
    );
}

#[test]
fn test_lock_failures_are_distinguished() {
    assert!(TableLockError::Cancelled.is_lock_failure());
    assert!(Error::Disposed.is_lock_failure());
    assert!(!TableLockError::ActionFailed("conflict".to_string()).is_lock_failure());
}
