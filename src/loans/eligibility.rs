//! Loan pricing and eligibility rules
//!
//! Everything in here is a pure function of its inputs.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;

use crate::error::{AppResult, LoanError};
use crate::loans::models::{Loan, LoanStatus, LoanType, Member, Savings};

/// Maximum loan amount as a multiple of the member's savings balance
pub const MAX_LOAN_TO_SAVINGS_RATIO: Decimal = dec!(2.0);

/// Maximum number of approved/active/disbursed loans a member may hold
pub const MAX_ACTIVE_LOANS: usize = 1;

/// Largest principal the `NUMERIC(20, 2)` amount column can hold
pub const MAX_LOAN_AMOUNT: Decimal = dec!(999999999999999999.99);

/// Why a loan request failed eligibility, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IneligibilityReason {
    SavingsNotFound,
    ExceedsSavingsRatio,
    MaxActiveLoansReached,
    HasDefaultedLoan,
    NonPositiveAmount,
}

impl IneligibilityReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IneligibilityReason::SavingsNotFound => "savings record not found",
            IneligibilityReason::ExceedsSavingsRatio => {
                "requested loan exceeds twice the savings balance"
            }
            IneligibilityReason::MaxActiveLoansReached => {
                "member has reached the maximum number of active loans"
            }
            IneligibilityReason::HasDefaultedLoan => "member has a defaulted loan",
            IneligibilityReason::NonPositiveAmount => {
                "requested loan amount must be greater than zero"
            }
        }
    }
}

impl fmt::Display for IneligibilityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Eligibility verdict; eligible iff no reasons were collected
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Eligibility {
    pub reasons: Vec<IneligibilityReason>,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        self.reasons.is_empty()
    }

    /// Reasons joined the way they are persisted as the rejection reason
    pub fn joined_reasons(&self) -> String {
        self.reasons
            .iter()
            .map(IneligibilityReason::as_str)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Evaluate whether `loan` may be approved for `member`
///
/// All rules run; nothing short-circuits. `existing_loans` may contain the loan
/// under review, which is skipped by id. Loans belonging to anyone other than
/// `member` never count against them.
pub fn evaluate(
    loan: &Loan,
    member: &Member,
    savings: Option<&Savings>,
    existing_loans: &[Loan],
) -> Eligibility {
    let mut reasons = Vec::new();

    match savings {
        None => reasons.push(IneligibilityReason::SavingsNotFound),
        Some(savings) => {
            let ceiling = savings.balance.checked_mul(MAX_LOAN_TO_SAVINGS_RATIO);
            if ceiling.map_or(false, |ceiling| loan.amount > ceiling) {
                reasons.push(IneligibilityReason::ExceedsSavingsRatio);
            }
        }
    }

    let others = existing_loans
        .iter()
        .filter(|other| other.id != loan.id && other.member_id == member.id);

    let mut active_count = 0;
    let mut has_defaulted = false;
    for other in others {
        if other.status.counts_as_active() {
            active_count += 1;
        }
        if other.status == LoanStatus::Defaulted {
            has_defaulted = true;
        }
    }

    if active_count >= MAX_ACTIVE_LOANS {
        reasons.push(IneligibilityReason::MaxActiveLoansReached);
    }
    if has_defaulted {
        reasons.push(IneligibilityReason::HasDefaultedLoan);
    }
    if loan.amount <= Decimal::ZERO {
        reasons.push(IneligibilityReason::NonPositiveAmount);
    }

    Eligibility { reasons }
}

/// Annual interest rate for a loan type and term
pub fn interest_rate(loan_type: LoanType, loan_term_months: u32) -> Decimal {
    match loan_type {
        LoanType::Business if loan_term_months > 12 => dec!(0.07),
        LoanType::Business => dec!(0.05),
        LoanType::Personal if loan_term_months > 24 => dec!(0.055),
        LoanType::Personal if loan_term_months > 12 => dec!(0.045),
        LoanType::Personal => dec!(0.035),
        _ => dec!(0.05),
    }
}

/// Simple-interest total: `principal * (1 + (annual_rate / 12) * term)`
///
/// Evaluated as `annual_rate * term / 12`, which is the same value in exact
/// arithmetic but keeps whole-year terms free of the rounding a repeating
/// `annual_rate / 12` would introduce. Fails with `AmountOutOfRange` instead of
/// overflowing.
pub fn total_repayable(
    principal: Decimal,
    annual_rate: Decimal,
    loan_term_months: u32,
) -> AppResult<Decimal> {
    if loan_term_months == 0 {
        return Err(LoanError::InvalidTerm.into());
    }

    let accrued = annual_rate
        .checked_mul(Decimal::from(loan_term_months))
        .and_then(|v| v.checked_div(dec!(12)))
        .ok_or(LoanError::AmountOutOfRange)?;

    Decimal::ONE
        .checked_add(accrued)
        .and_then(|factor| principal.checked_mul(factor))
        .ok_or_else(|| LoanError::AmountOutOfRange.into())
}

pub fn installment(total_repayable: Decimal, loan_term_months: u32) -> AppResult<Decimal> {
    if loan_term_months == 0 {
        return Err(LoanError::InvalidTerm.into());
    }

    Ok(total_repayable / Decimal::from(loan_term_months))
}
