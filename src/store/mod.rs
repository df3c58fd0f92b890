//! Storage capabilities consumed by the loan service
//!
//! Every operation runs inside a transaction handle `Tx` obtained from a
//! [`TransactionProvider`]. Dropping a `Tx` without committing must roll it back.

#[cfg(test)]
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::ledger::models::{LoanHistory, NewLoanHistory};
use crate::loans::models::{Loan, Member, NewLoan, Savings};

#[cfg(test)]
pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Transactional: Send + Sized + 'static {
    async fn commit(self) -> AppResult<()>;

    async fn rollback(self) -> AppResult<()>;
}

#[async_trait]
pub trait TransactionProvider: Send + Sync + 'static {
    type Tx: Transactional;

    async fn begin(&self) -> AppResult<Self::Tx>;
}

#[async_trait]
pub trait LoanStore<Tx: Send>: Send + Sync {
    /// Read the loan and hold an exclusive lock on it until `tx` ends
    async fn lock_loan_for_update(&self, tx: &mut Tx, loan_id: Uuid) -> AppResult<Option<Loan>>;

    async fn find_loan(&self, tx: &mut Tx, loan_id: Uuid) -> AppResult<Option<Loan>>;

    async fn list_loans_by_member_id(&self, tx: &mut Tx, member_id: Uuid) -> AppResult<Vec<Loan>>;

    async fn insert_loan(&self, tx: &mut Tx, loan: NewLoan) -> AppResult<Loan>;

    /// Persist the status and review fields of `loan`
    async fn save_loan(&self, tx: &mut Tx, loan: &Loan) -> AppResult<Loan>;
}

#[async_trait]
pub trait MemberStore<Tx: Send>: Send + Sync {
    async fn fetch_member_by_id(&self, tx: &mut Tx, member_id: Uuid) -> AppResult<Option<Member>>;

    async fn fetch_member_by_user_id(&self, tx: &mut Tx, user_id: Uuid)
        -> AppResult<Option<Member>>;
}

#[async_trait]
pub trait SavingsStore<Tx: Send>: Send + Sync {
    async fn fetch_savings_by_member_id(
        &self,
        tx: &mut Tx,
        member_id: Uuid,
    ) -> AppResult<Option<Savings>>;
}

#[async_trait]
pub trait HistoryStore<Tx: Send>: Send + Sync {
    async fn append_history(&self, tx: &mut Tx, entry: NewLoanHistory) -> AppResult<LoanHistory>;

    /// Entries for `loan_id`, oldest first
    async fn list_history_by_loan(&self, tx: &mut Tx, loan_id: Uuid) -> AppResult<Vec<LoanHistory>>;
}

/// Owns a transaction for the length of one unit of work
///
/// `commit` and `rollback` consume the scope, so each runs at most once. A scope
/// dropped while still holding its transaction (early return, panic, cancelled
/// request future) drops the handle, which rolls it back.
pub struct TxScope<T: Transactional> {
    tx: Option<T>,
    label: &'static str,
}

impl<T: Transactional> TxScope<T> {
    pub fn new(tx: T, label: &'static str) -> Self {
        Self { tx: Some(tx), label }
    }

    pub fn tx(&mut self) -> AppResult<&mut T> {
        let label = self.label;
        self.tx
            .as_mut()
            .ok_or_else(|| AppError::Internal(format!("transaction '{}' already finished", label)))
    }

    pub async fn commit(mut self) -> AppResult<()> {
        match self.tx.take() {
            Some(tx) => tx.commit().await,
            None => Ok(()),
        }
    }

    pub async fn rollback(mut self) -> AppResult<()> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await,
            None => Ok(()),
        }
    }
}

impl<T: Transactional> Drop for TxScope<T> {
    fn drop(&mut self) {
        if self.tx.take().is_some() {
            warn!(
                "Transaction '{}' abandoned before commit, rolling back",
                self.label
            );
        }
    }
}
