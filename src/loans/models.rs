use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::error::LoanError;
use crate::ledger::models::LoanHistory;

/// Loan lifecycle status
///
/// Persisted as lowercase text. Rows carrying anything else fail to load
/// with `LoanError::UnprocessableStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Active,
    Rejected,
    Disbursed,
    Paid,
    Defaulted,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Active => "active",
            LoanStatus::Rejected => "rejected",
            LoanStatus::Disbursed => "disbursed",
            LoanStatus::Paid => "paid",
            LoanStatus::Defaulted => "defaulted",
        }
    }

    /// Statuses counted against the per-member active loan cap
    pub fn counts_as_active(&self) -> bool {
        matches!(
            self,
            LoanStatus::Approved | LoanStatus::Active | LoanStatus::Disbursed
        )
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = LoanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LoanStatus::Pending),
            "approved" => Ok(LoanStatus::Approved),
            "active" => Ok(LoanStatus::Active),
            "rejected" => Ok(LoanStatus::Rejected),
            "disbursed" => Ok(LoanStatus::Disbursed),
            "paid" => Ok(LoanStatus::Paid),
            "defaulted" => Ok(LoanStatus::Defaulted),
            other => Err(LoanError::UnprocessableStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanType {
    Personal,
    Business,
    Education,
}

impl LoanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanType::Personal => "personal",
            LoanType::Business => "business",
            LoanType::Education => "education",
        }
    }
}

impl fmt::Display for LoanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LoanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(LoanType::Personal),
            "business" => Ok(LoanType::Business),
            "education" => Ok(LoanType::Education),
            other => Err(format!("invalid loan type: {}", other)),
        }
    }
}

/// Loan entity - one credit request from a member
///
/// INVARIANT: amount, interest_rate and loan_term_months never change once the
/// loan has left `pending`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: Uuid,
    pub member_id: Uuid,
    pub description: String,
    pub loan_type: LoanType,

    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub interest_rate: Decimal,
    pub loan_term_months: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_repayable_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub installment_amount: Decimal,

    pub status: LoanStatus,
    pub is_active: bool,
    pub approved_by: Option<Uuid>,
    pub rejection_reason: Option<String>,

    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    pub fn is_pending(&self) -> bool {
        self.status == LoanStatus::Pending
    }
}

/// A loan about to be inserted; ids and timestamps are assigned by the store
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub member_id: Uuid,
    pub description: String,
    pub loan_type: LoanType,
    pub amount: Decimal,
    pub interest_rate: Decimal,
    pub loan_term_months: i32,
    pub total_repayable_amount: Decimal,
    pub installment_amount: Decimal,
}

/// Member entity (owned by the membership service, read-only here)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub contact_info: String,
    pub created_at: DateTime<Utc>,
}

/// Savings entity (owned by the savings service, read-only here)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Savings {
    pub id: Uuid,
    pub member_id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Role of the authenticated caller, as asserted by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// The user on whose behalf a request runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    /// User id; members are resolved from it via the membership store
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// What the admin's approve call resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

/// Result of one approval request
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalOutcome {
    pub decision: Decision,
    pub message: String,
    pub loan: Loan,
    pub history: LoanHistory,
}

/// Loan together with its audit trail
#[derive(Debug, Clone, Serialize)]
pub struct LoanTracking {
    pub loan: Loan,
    pub history: Vec<LoanHistory>,
}

/// Newly submitted loan together with its initial history entry
#[derive(Debug, Clone, Serialize)]
pub struct LoanSubmission {
    pub loan: Loan,
    pub initial_history: LoanHistory,
}

// ========== REQUEST MODELS ==========

/// Loan application submitted by a member
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoanApplication {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,

    #[serde(default)]
    #[validate(length(max = 500, message = "description must be at most 500 characters"))]
    pub description: String,

    #[serde(rename = "type")]
    pub loan_type: String,

    #[validate(range(min = 1, max = 600, message = "loan term must be greater than zero months"))]
    pub loan_term_months: i32,
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub decision: Decision,
    pub loan: Loan,
    pub history: LoanHistory,
}

impl From<ApprovalOutcome> for ApiResponse<ApprovalResponse> {
    fn from(outcome: ApprovalOutcome) -> Self {
        ApiResponse::new(
            outcome.message,
            ApprovalResponse {
                decision: outcome.decision,
                loan: outcome.loan,
                history: outcome.history,
            },
        )
    }
}
