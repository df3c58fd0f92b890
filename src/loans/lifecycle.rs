//! Loan lifecycle state machine
//!
//! ```text
//! pending ──► approved ──► disbursed ──► active ──► paid
//!    │                                      └──────► defaulted
//!    └──────► rejected
//! ```
//!
//! This crate only drives `pending -> approved` and `pending -> rejected`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::LoanError;
use crate::loans::models::{Loan, LoanStatus};

/// Outcome of checking whether a loan can be decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCheck {
    pub processable: bool,
    pub message: &'static str,
}

impl StatusCheck {
    fn processable(message: &'static str) -> Self {
        Self {
            processable: true,
            message,
        }
    }

    fn settled(message: &'static str) -> Self {
        Self {
            processable: false,
            message,
        }
    }
}

/// Check whether `loan` may be approved or rejected
///
/// Statuses past the approval step that this engine has no rule for
/// (`active`, `disbursed`) are reported as a data integrity problem rather
/// than a business refusal.
pub fn can_process(loan: &Loan) -> Result<StatusCheck, LoanError> {
    match loan.status {
        LoanStatus::Pending => Ok(StatusCheck::processable(
            "Loan is pending and can be processed.",
        )),
        LoanStatus::Approved => Ok(StatusCheck::settled("Loan is already approved.")),
        LoanStatus::Rejected => Ok(StatusCheck::settled("Loan is already rejected.")),
        LoanStatus::Paid => Ok(StatusCheck::settled("Loan has already been paid.")),
        LoanStatus::Defaulted => Ok(StatusCheck::settled("Loan is defaulted.")),
        other => Err(LoanError::UnprocessableStatus(other.to_string())),
    }
}

fn ensure_pending(loan: &Loan, to: LoanStatus) -> Result<(), LoanError> {
    if loan.is_pending() {
        Ok(())
    } else {
        Err(LoanError::InvalidTransition {
            from: loan.status.to_string(),
            to: to.to_string(),
        })
    }
}

/// Move a pending loan to `approved`
pub fn approve(loan: &mut Loan, admin_id: Uuid, now: DateTime<Utc>) -> Result<(), LoanError> {
    ensure_pending(loan, LoanStatus::Approved)?;

    loan.status = LoanStatus::Approved;
    loan.approved_by = Some(admin_id);
    loan.approved_at = Some(now);
    loan.reviewed_at = Some(now);
    loan.rejection_reason = None;
    loan.is_active = true;
    loan.updated_at = now;
    Ok(())
}

/// Move a pending loan to `rejected` with the given reason
pub fn reject(loan: &mut Loan, reason: String, now: DateTime<Utc>) -> Result<(), LoanError> {
    ensure_pending(loan, LoanStatus::Rejected)?;

    loan.status = LoanStatus::Rejected;
    loan.rejected_at = Some(now);
    loan.reviewed_at = Some(now);
    loan.rejection_reason = Some(reason);
    loan.is_active = false;
    loan.updated_at = now;
    Ok(())
}
