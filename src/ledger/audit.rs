use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppResult, LoanError};
use crate::ledger::models::{LoanHistory, NewLoanHistory};
use crate::store::HistoryStore;

/// Append-only audit trail of loan status changes
///
/// Entries are written in the caller's transaction so they commit or roll back
/// together with the status change they describe. There is no update or delete.
pub struct AuditLedger<Tx: Send> {
    store: Arc<dyn HistoryStore<Tx>>,
}

impl<Tx: Send> Clone for AuditLedger<Tx> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<Tx: Send> AuditLedger<Tx> {
    pub fn new(store: Arc<dyn HistoryStore<Tx>>) -> Self {
        Self { store }
    }

    pub async fn append(&self, tx: &mut Tx, entry: NewLoanHistory) -> AppResult<LoanHistory> {
        debug!(
            "Recording history for loan {}: {} by {}",
            entry.loan_id, entry.status, entry.changed_by
        );
        self.store.append_history(tx, entry).await
    }

    /// Full trail for a loan, oldest first
    pub async fn list_by_loan(&self, tx: &mut Tx, loan_id: Uuid) -> AppResult<Vec<LoanHistory>> {
        let entries = self.store.list_history_by_loan(tx, loan_id).await?;
        if entries.is_empty() {
            return Err(LoanError::NoHistory(loan_id).into());
        }
        Ok(entries)
    }
}
