use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult, LoanError};
use crate::ledger::{AuditLedger, NewLoanHistory};
use crate::loans::eligibility;
use crate::loans::lifecycle;
use crate::loans::models::{
    Actor, ApprovalOutcome, Decision, LoanApplication, LoanSubmission, LoanTracking, LoanType,
    NewLoan,
};
use crate::store::{
    HistoryStore, LoanStore, MemberStore, SavingsStore, TransactionProvider, TxScope,
};

pub const APPROVED_MESSAGE: &str = "loan approved successfully";

/// Loan operations exposed to the HTTP layer
#[async_trait]
pub trait LoanOperations: Send + Sync {
    /// Decide a pending loan: approve it if the member is eligible, reject it otherwise
    async fn approve(&self, loan_id: Uuid, admin_id: Uuid) -> AppResult<ApprovalOutcome>;

    /// Submit a new loan application for the member behind `user_id`
    async fn apply(&self, user_id: Uuid, application: LoanApplication)
        -> AppResult<LoanSubmission>;

    /// Loan with its audit trail; members may only see their own loans
    async fn track(&self, actor: Actor, loan_id: Uuid) -> AppResult<LoanTracking>;
}

type TxOf<P> = <P as TransactionProvider>::Tx;

/// Orchestrates loan decisions over the injected stores
///
/// Every public operation is one transaction: it either commits all of its
/// writes or none of them.
pub struct LoanService<P: TransactionProvider> {
    provider: Arc<P>,
    loans: Arc<dyn LoanStore<TxOf<P>>>,
    members: Arc<dyn MemberStore<TxOf<P>>>,
    savings: Arc<dyn SavingsStore<TxOf<P>>>,
    ledger: AuditLedger<TxOf<P>>,
}

impl<P> LoanService<P>
where
    P: TransactionProvider
        + LoanStore<TxOf<P>>
        + MemberStore<TxOf<P>>
        + SavingsStore<TxOf<P>>
        + HistoryStore<TxOf<P>>,
{
    /// Service backed by a single store implementing every capability
    pub fn new(store: Arc<P>) -> Self {
        Self::with_stores(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store,
        )
    }
}

impl<P: TransactionProvider> LoanService<P> {
    pub fn with_stores(
        provider: Arc<P>,
        loans: Arc<dyn LoanStore<TxOf<P>>>,
        members: Arc<dyn MemberStore<TxOf<P>>>,
        savings: Arc<dyn SavingsStore<TxOf<P>>>,
        history: Arc<dyn HistoryStore<TxOf<P>>>,
    ) -> Self {
        Self {
            provider,
            loans,
            members,
            savings,
            ledger: AuditLedger::new(history),
        }
    }

    async fn begin(&self, label: &'static str) -> AppResult<TxScope<TxOf<P>>> {
        Ok(TxScope::new(self.provider.begin().await?, label))
    }

    /// Commit on success, roll back on failure, and hand back the work's result
    async fn finish<T>(scope: TxScope<TxOf<P>>, result: AppResult<T>) -> AppResult<T> {
        match result {
            Ok(value) => {
                scope.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = scope.rollback().await {
                    warn!(
                        "Rollback failed after error '{}': {}",
                        e, rollback_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn decide(
        &self,
        tx: &mut TxOf<P>,
        loan_id: Uuid,
        admin_id: Uuid,
    ) -> AppResult<ApprovalOutcome> {
        // blocks while another transaction holds this loan
        let mut loan = self
            .loans
            .lock_loan_for_update(tx, loan_id)
            .await?
            .ok_or(LoanError::NotFound(loan_id))?;

        let check = lifecycle::can_process(&loan)?;
        if !check.processable {
            warn!("Loan {} cannot be processed: {}", loan_id, check.message);
            return Err(LoanError::AlreadyProcessed(check.message.to_string()).into());
        }

        let member = self
            .members
            .fetch_member_by_id(tx, loan.member_id)
            .await?
            .ok_or(LoanError::MemberNotFound(loan.member_id))?;
        let savings = self.savings.fetch_savings_by_member_id(tx, member.id).await?;
        let existing = self.loans.list_loans_by_member_id(tx, member.id).await?;

        let verdict = eligibility::evaluate(&loan, &member, savings.as_ref(), &existing);
        let now = Utc::now();

        let (decision, message, entry) = if verdict.is_eligible() {
            lifecycle::approve(&mut loan, admin_id, now)?;
            (
                Decision::Approved,
                APPROVED_MESSAGE.to_string(),
                NewLoanHistory::approved(loan.id, admin_id),
            )
        } else {
            let reasons = verdict.joined_reasons();
            lifecycle::reject(&mut loan, reasons.clone(), now)?;
            (
                Decision::Rejected,
                format!("loan rejected: {}", reasons),
                NewLoanHistory::rejected(loan.id, admin_id, &reasons),
            )
        };

        let loan = self.loans.save_loan(tx, &loan).await?;
        let history = self.ledger.append(tx, entry).await?;

        Ok(ApprovalOutcome {
            decision,
            message,
            loan,
            history,
        })
    }

    async fn submit(
        &self,
        tx: &mut TxOf<P>,
        user_id: Uuid,
        new_loan: NewLoan,
    ) -> AppResult<LoanSubmission> {
        let member = self
            .members
            .fetch_member_by_user_id(tx, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("member not found".to_string()))?;

        let loan = self
            .loans
            .insert_loan(
                tx,
                NewLoan {
                    member_id: member.id,
                    ..new_loan
                },
            )
            .await?;
        let initial_history = self
            .ledger
            .append(tx, NewLoanHistory::submitted(loan.id, member.id))
            .await?;

        Ok(LoanSubmission {
            loan,
            initial_history,
        })
    }

    async fn load_tracking(
        &self,
        tx: &mut TxOf<P>,
        actor: Actor,
        loan_id: Uuid,
    ) -> AppResult<LoanTracking> {
        let loan = self
            .loans
            .find_loan(tx, loan_id)
            .await?
            .ok_or(LoanError::NotFound(loan_id))?;

        if !actor.is_admin() {
            let owner = self.members.fetch_member_by_user_id(tx, actor.id).await?;
            if owner.map(|m| m.id) != Some(loan.member_id) {
                return Err(AppError::Forbidden(
                    "you are not authorized to view this loan".to_string(),
                ));
            }
        }

        let history = self.ledger.list_by_loan(tx, loan_id).await?;
        Ok(LoanTracking { loan, history })
    }
}

/// Check an application and price it; nothing here touches storage
fn prepare_application(application: &LoanApplication) -> AppResult<NewLoan> {
    if application.amount <= Decimal::ZERO {
        return Err(AppError::InvalidInput(
            "loan amount must be greater than zero".to_string(),
        ));
    }
    if application.amount > eligibility::MAX_LOAN_AMOUNT {
        return Err(LoanError::AmountOutOfRange.into());
    }
    if application.loan_term_months <= 0 {
        return Err(AppError::InvalidInput(
            "loan term must be greater than zero months".to_string(),
        ));
    }
    let loan_type: LoanType = application
        .loan_type
        .parse()
        .map_err(|_| AppError::InvalidInput("invalid loan type".to_string()))?;

    application.validate().map_err(|e| {
        let errors = e
            .field_errors()
            .into_iter()
            .map(|(field, errors)| {
                let messages: Vec<String> = errors
                    .iter()
                    .map(|e| e.message.as_ref().map(|s| s.to_string()).unwrap_or_default())
                    .collect();
                format!("{}: {}", field, messages.join(", "))
            })
            .collect::<Vec<String>>()
            .join("; ");
        AppError::InvalidInput(format!("Validation failed: {}", errors))
    })?;

    let term = application.loan_term_months as u32;
    let interest_rate = eligibility::interest_rate(loan_type, term);
    let total_repayable_amount =
        eligibility::total_repayable(application.amount, interest_rate, term)?;
    let installment_amount = eligibility::installment(total_repayable_amount, term)?;
    if installment_amount <= Decimal::ZERO {
        return Err(AppError::InvalidInput(
            "installment amount must be greater than zero".to_string(),
        ));
    }

    Ok(NewLoan {
        // resolved from the caller inside the transaction
        member_id: Uuid::nil(),
        description: application.description.clone(),
        loan_type,
        amount: application.amount,
        interest_rate,
        loan_term_months: application.loan_term_months,
        total_repayable_amount,
        installment_amount,
    })
}

#[async_trait]
impl<P: TransactionProvider> LoanOperations for LoanService<P> {
    #[instrument(skip(self))]
    async fn approve(&self, loan_id: Uuid, admin_id: Uuid) -> AppResult<ApprovalOutcome> {
        info!("Processing approval for loan {}", loan_id);

        let mut scope = self.begin("approve_loan").await?;
        let result = {
            let tx = scope.tx()?;
            self.decide(tx, loan_id, admin_id).await
        };
        let outcome = Self::finish(scope, result).await?;

        info!(
            "Loan {} {:?} by {}: {}",
            loan_id, outcome.decision, admin_id, outcome.message
        );
        Ok(outcome)
    }

    #[instrument(skip(self, application), fields(loan_type = %application.loan_type))]
    async fn apply(
        &self,
        user_id: Uuid,
        application: LoanApplication,
    ) -> AppResult<LoanSubmission> {
        let new_loan = prepare_application(&application)?;

        let mut scope = self.begin("apply_loan").await?;
        let result = {
            let tx = scope.tx()?;
            self.submit(tx, user_id, new_loan).await
        };
        let submission = Self::finish(scope, result).await?;

        info!(
            "Loan {} submitted by member {}",
            submission.loan.id, submission.loan.member_id
        );
        Ok(submission)
    }

    #[instrument(skip(self))]
    async fn track(&self, actor: Actor, loan_id: Uuid) -> AppResult<LoanTracking> {
        let mut scope = self.begin("track_loan").await?;
        let result = {
            let tx = scope.tx()?;
            self.load_tracking(tx, actor, loan_id).await
        };
        Self::finish(scope, result).await
    }
}
