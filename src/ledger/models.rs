use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::loans::models::LoanStatus;

pub const REMARK_SUBMITTED: &str = "Loan application submitted";
pub const REMARK_APPROVED: &str = "Loan approved by admin.";
pub const REMARK_REJECTED_PREFIX: &str = "Loan rejected: ";

/// One immutable audit row per loan status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanHistory {
    pub id: Uuid,
    pub loan_id: Uuid,
    /// Status the loan moved to
    pub status: LoanStatus,
    /// Member or admin responsible for the change
    pub changed_by: Uuid,
    pub remarks: String,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLoanHistory {
    pub loan_id: Uuid,
    pub status: LoanStatus,
    pub changed_by: Uuid,
    pub remarks: String,
}

impl NewLoanHistory {
    pub fn submitted(loan_id: Uuid, member_id: Uuid) -> Self {
        Self {
            loan_id,
            status: LoanStatus::Pending,
            changed_by: member_id,
            remarks: REMARK_SUBMITTED.to_string(),
        }
    }

    pub fn approved(loan_id: Uuid, admin_id: Uuid) -> Self {
        Self {
            loan_id,
            status: LoanStatus::Approved,
            changed_by: admin_id,
            remarks: REMARK_APPROVED.to_string(),
        }
    }

    pub fn rejected(loan_id: Uuid, admin_id: Uuid, reasons: &str) -> Self {
        Self {
            loan_id,
            status: LoanStatus::Rejected,
            changed_by: admin_id,
            remarks: format!("{}{}", REMARK_REJECTED_PREFIX, reasons),
        }
    }
}
