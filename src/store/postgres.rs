use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgRow, FromRow, PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{HistoryStore, LoanStore, MemberStore, SavingsStore, TransactionProvider, Transactional};
use crate::error::{AppError, AppResult};
use crate::ledger::models::{LoanHistory, NewLoanHistory};
use crate::loans::models::{Loan, LoanStatus, LoanType, Member, NewLoan, Savings};

const LOAN_COLUMNS: &str = r#"
    id, member_id, description, loan_type, amount, interest_rate, loan_term_months,
    total_repayable_amount, installment_amount, status, is_active, approved_by,
    rejection_reason, submitted_at, reviewed_at, approved_at, rejected_at,
    disbursed_at, created_at, updated_at
"#;

const HISTORY_COLUMNS: &str = "id, loan_id, status, changed_by, remarks, changed_at";

/// Postgres-backed store - the source of truth for loans and their history
pub struct PgStore {
    pub pool: PgPool,
    lock_timeout_ms: u64,
}

/// A Postgres transaction with `lock_timeout` applied
pub struct PgTx {
    inner: Transaction<'static, Postgres>,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_timeout_ms: u64) -> Self {
        Self {
            pool,
            lock_timeout_ms,
        }
    }
}

#[derive(FromRow)]
struct LoanRow {
    id: Uuid,
    member_id: Uuid,
    description: String,
    loan_type: String,
    amount: Decimal,
    interest_rate: Decimal,
    loan_term_months: i32,
    total_repayable_amount: Decimal,
    installment_amount: Decimal,
    status: String,
    is_active: bool,
    approved_by: Option<Uuid>,
    rejection_reason: Option<String>,
    submitted_at: DateTime<Utc>,
    reviewed_at: Option<DateTime<Utc>>,
    approved_at: Option<DateTime<Utc>>,
    rejected_at: Option<DateTime<Utc>>,
    disbursed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LoanRow> for Loan {
    type Error = AppError;

    fn try_from(row: LoanRow) -> AppResult<Self> {
        let status: LoanStatus = row.status.parse()?;
        let loan_type: LoanType = row.loan_type.parse().map_err(AppError::Internal)?;

        Ok(Loan {
            id: row.id,
            member_id: row.member_id,
            description: row.description,
            loan_type,
            amount: row.amount,
            interest_rate: row.interest_rate,
            loan_term_months: row.loan_term_months,
            total_repayable_amount: row.total_repayable_amount,
            installment_amount: row.installment_amount,
            status,
            is_active: row.is_active,
            approved_by: row.approved_by,
            rejection_reason: row.rejection_reason,
            submitted_at: row.submitted_at,
            reviewed_at: row.reviewed_at,
            approved_at: row.approved_at,
            rejected_at: row.rejected_at,
            disbursed_at: row.disbursed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct HistoryRow {
    id: Uuid,
    loan_id: Uuid,
    status: String,
    changed_by: Uuid,
    remarks: String,
    changed_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for LoanHistory {
    type Error = AppError;

    fn try_from(row: HistoryRow) -> AppResult<Self> {
        Ok(LoanHistory {
            id: row.id,
            loan_id: row.loan_id,
            status: row.status.parse()?,
            changed_by: row.changed_by,
            remarks: row.remarks,
            changed_at: row.changed_at,
        })
    }
}

fn loan_from_row(row: &PgRow) -> AppResult<Loan> {
    Loan::try_from(LoanRow::from_row(row)?)
}

#[async_trait]
impl Transactional for PgTx {
    async fn commit(self) -> AppResult<()> {
        self.inner.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> AppResult<()> {
        self.inner.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionProvider for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> AppResult<PgTx> {
        let mut inner = self.pool.begin().await?;

        // bound every row-lock wait in this transaction
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout_ms))
            .execute(&mut *inner)
            .await?;

        Ok(PgTx { inner })
    }
}

#[async_trait]
impl LoanStore<PgTx> for PgStore {
    async fn lock_loan_for_update(&self, tx: &mut PgTx, loan_id: Uuid) -> AppResult<Option<Loan>> {
        debug!("Locking loan {} for update", loan_id);

        let row = sqlx::query(&format!(
            "SELECT {} FROM loans WHERE id = $1 FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(loan_id)
        .fetch_optional(&mut *tx.inner)
        .await?;

        row.as_ref().map(loan_from_row).transpose()
    }

    async fn find_loan(&self, tx: &mut PgTx, loan_id: Uuid) -> AppResult<Option<Loan>> {
        let row = sqlx::query(&format!("SELECT {} FROM loans WHERE id = $1", LOAN_COLUMNS))
            .bind(loan_id)
            .fetch_optional(&mut *tx.inner)
            .await?;

        row.as_ref().map(loan_from_row).transpose()
    }

    async fn list_loans_by_member_id(&self, tx: &mut PgTx, member_id: Uuid) -> AppResult<Vec<Loan>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM loans WHERE member_id = $1 ORDER BY submitted_at",
            LOAN_COLUMNS
        ))
        .bind(member_id)
        .fetch_all(&mut *tx.inner)
        .await?;

        rows.iter().map(loan_from_row).collect()
    }

    async fn insert_loan(&self, tx: &mut PgTx, loan: NewLoan) -> AppResult<Loan> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO loans (
                member_id, description, loan_type, amount, interest_rate, loan_term_months,
                total_repayable_amount, installment_amount, status, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, false)
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(loan.member_id)
        .bind(loan.description)
        .bind(loan.loan_type.as_str())
        .bind(loan.amount)
        .bind(loan.interest_rate)
        .bind(loan.loan_term_months)
        .bind(loan.total_repayable_amount)
        .bind(loan.installment_amount)
        .bind(LoanStatus::Pending.as_str())
        .fetch_one(&mut *tx.inner)
        .await?;

        loan_from_row(&row)
    }

    async fn save_loan(&self, tx: &mut PgTx, loan: &Loan) -> AppResult<Loan> {
        // amount, rate and term are deliberately absent: they are frozen after submission
        let row = sqlx::query(&format!(
            r#"
            UPDATE loans
            SET status = $2, is_active = $3, approved_by = $4, rejection_reason = $5,
                reviewed_at = $6, approved_at = $7, rejected_at = $8, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(loan.id)
        .bind(loan.status.as_str())
        .bind(loan.is_active)
        .bind(loan.approved_by)
        .bind(loan.rejection_reason.as_deref())
        .bind(loan.reviewed_at)
        .bind(loan.approved_at)
        .bind(loan.rejected_at)
        .fetch_optional(&mut *tx.inner)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Loan {} not found", loan.id)))?;

        loan_from_row(&row)
    }
}

#[async_trait]
impl MemberStore<PgTx> for PgStore {
    async fn fetch_member_by_id(&self, tx: &mut PgTx, member_id: Uuid) -> AppResult<Option<Member>> {
        let member = sqlx::query_as::<_, Member>(
            r#"
            SELECT id, user_id, name, contact_info, created_at
            FROM members
            WHERE id = $1
            "#,
        )
        .bind(member_id)
        .fetch_optional(&mut *tx.inner)
        .await?;

        Ok(member)
    }

    async fn fetch_member_by_user_id(&self, tx: &mut PgTx, user_id: Uuid) -> AppResult<Option<Member>> {
        let member = sqlx::query_as::<_, Member>(
            r#"
            SELECT id, user_id, name, contact_info, created_at
            FROM members
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx.inner)
        .await?;

        Ok(member)
    }
}

#[async_trait]
impl SavingsStore<PgTx> for PgStore {
    async fn fetch_savings_by_member_id(
        &self,
        tx: &mut PgTx,
        member_id: Uuid,
    ) -> AppResult<Option<Savings>> {
        let savings = sqlx::query_as::<_, Savings>(
            r#"
            SELECT id, member_id, balance, updated_at
            FROM savings
            WHERE member_id = $1
            "#,
        )
        .bind(member_id)
        .fetch_optional(&mut *tx.inner)
        .await?;

        Ok(savings)
    }
}

#[async_trait]
impl HistoryStore<PgTx> for PgStore {
    async fn append_history(&self, tx: &mut PgTx, entry: NewLoanHistory) -> AppResult<LoanHistory> {
        let row = sqlx::query_as::<_, HistoryRow>(&format!(
            r#"
            INSERT INTO loan_histories (loan_id, status, changed_by, remarks)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            HISTORY_COLUMNS
        ))
        .bind(entry.loan_id)
        .bind(entry.status.as_str())
        .bind(entry.changed_by)
        .bind(entry.remarks)
        .fetch_one(&mut *tx.inner)
        .await?;

        LoanHistory::try_from(row)
    }

    async fn list_history_by_loan(&self, tx: &mut PgTx, loan_id: Uuid) -> AppResult<Vec<LoanHistory>> {
        let rows = sqlx::query_as::<_, HistoryRow>(&format!(
            r#"
            SELECT {}
            FROM loan_histories
            WHERE loan_id = $1
            ORDER BY changed_at ASC, seq ASC
            "#,
            HISTORY_COLUMNS
        ))
        .bind(loan_id)
        .fetch_all(&mut *tx.inner)
        .await?;

        rows.into_iter().map(LoanHistory::try_from).collect()
    }
}
