//! In-process store used by the service and HTTP tests
//!
//! Row locks are per-loan async mutexes held by the transaction. Writes are
//! staged on the transaction and only become visible on commit; dropping the
//! transaction discards them and releases its locks.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use super::{HistoryStore, LoanStore, MemberStore, SavingsStore, TransactionProvider, Transactional};
use crate::error::{AppError, AppResult};
use crate::ledger::models::{LoanHistory, NewLoanHistory};
use crate::loans::models::{Loan, LoanStatus, Member, NewLoan, Savings};

#[derive(Default)]
struct Tables {
    loans: HashMap<Uuid, Loan>,
    members: HashMap<Uuid, Member>,
    /// keyed by member id
    savings: HashMap<Uuid, Savings>,
    history: Vec<LoanHistory>,
}

pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    row_locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
    lock_timeout: Duration,
}

pub struct MemoryTx {
    tables: Arc<RwLock<Tables>>,
    held: HashSet<Uuid>,
    guards: Vec<OwnedMutexGuard<()>>,
    staged_loans: HashMap<Uuid, Loan>,
    staged_history: Vec<LoanHistory>,
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            row_locks: Mutex::new(HashMap::new()),
            lock_timeout,
        }
    }

    pub fn insert_member(&self, member: Member) {
        self.tables.write().members.insert(member.id, member);
    }

    pub fn insert_savings(&self, savings: Savings) {
        self.tables.write().savings.insert(savings.member_id, savings);
    }

    /// Insert a committed loan row directly, bypassing transactions
    pub fn insert_loan_row(&self, loan: Loan) {
        self.tables.write().loans.insert(loan.id, loan);
    }

    pub fn insert_history_row(&self, entry: LoanHistory) {
        self.tables.write().history.push(entry);
    }

    pub fn committed_loan(&self, loan_id: Uuid) -> Option<Loan> {
        self.tables.read().loans.get(&loan_id).cloned()
    }

    pub fn committed_loans_for_member(&self, member_id: Uuid) -> Vec<Loan> {
        self.tables
            .read()
            .loans
            .values()
            .filter(|l| l.member_id == member_id)
            .cloned()
            .collect()
    }

    pub fn committed_history(&self, loan_id: Uuid) -> Vec<LoanHistory> {
        self.tables
            .read()
            .history
            .iter()
            .filter(|h| h.loan_id == loan_id)
            .cloned()
            .collect()
    }

    fn row_lock(&self, loan_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.row_locks
            .lock()
            .entry(loan_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

impl MemoryTx {
    fn loan(&self, loan_id: Uuid) -> Option<Loan> {
        self.staged_loans
            .get(&loan_id)
            .cloned()
            .or_else(|| self.tables.read().loans.get(&loan_id).cloned())
    }
}

#[async_trait]
impl Transactional for MemoryTx {
    async fn commit(mut self) -> AppResult<()> {
        {
            let mut tables = self.tables.write();
            for (id, loan) in self.staged_loans.drain() {
                tables.loans.insert(id, loan);
            }
            tables.history.append(&mut self.staged_history);
        }
        // guards drop here, after the writes are visible
        Ok(())
    }

    async fn rollback(self) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl TransactionProvider for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> AppResult<MemoryTx> {
        Ok(MemoryTx {
            tables: self.tables.clone(),
            held: HashSet::new(),
            guards: Vec::new(),
            staged_loans: HashMap::new(),
            staged_history: Vec::new(),
        })
    }
}

#[async_trait]
impl LoanStore<MemoryTx> for MemoryStore {
    async fn lock_loan_for_update(&self, tx: &mut MemoryTx, loan_id: Uuid) -> AppResult<Option<Loan>> {
        if tx.held.insert(loan_id) {
            let lock = self.row_lock(loan_id);
            let guard = tokio::time::timeout(self.lock_timeout, lock.lock_owned())
                .await
                .map_err(|_| {
                    tx.held.remove(&loan_id);
                    AppError::Transient("lock wait timed out".to_string())
                })?;
            tx.guards.push(guard);
        }

        Ok(tx.loan(loan_id))
    }

    async fn find_loan(&self, tx: &mut MemoryTx, loan_id: Uuid) -> AppResult<Option<Loan>> {
        Ok(tx.loan(loan_id))
    }

    async fn list_loans_by_member_id(&self, tx: &mut MemoryTx, member_id: Uuid) -> AppResult<Vec<Loan>> {
        let mut loans: HashMap<Uuid, Loan> = self
            .tables
            .read()
            .loans
            .values()
            .filter(|l| l.member_id == member_id)
            .map(|l| (l.id, l.clone()))
            .collect();

        for (id, loan) in tx.staged_loans.iter() {
            if loan.member_id == member_id {
                loans.insert(*id, loan.clone());
            }
        }

        let mut loans: Vec<Loan> = loans.into_values().collect();
        loans.sort_by_key(|l| l.submitted_at);
        Ok(loans)
    }

    async fn insert_loan(&self, tx: &mut MemoryTx, loan: NewLoan) -> AppResult<Loan> {
        let now = Utc::now();
        let loan = Loan {
            id: Uuid::new_v4(),
            member_id: loan.member_id,
            description: loan.description,
            loan_type: loan.loan_type,
            amount: loan.amount,
            interest_rate: loan.interest_rate,
            loan_term_months: loan.loan_term_months,
            total_repayable_amount: loan.total_repayable_amount,
            installment_amount: loan.installment_amount,
            status: LoanStatus::Pending,
            is_active: false,
            approved_by: None,
            rejection_reason: None,
            submitted_at: now,
            reviewed_at: None,
            approved_at: None,
            rejected_at: None,
            disbursed_at: None,
            created_at: now,
            updated_at: now,
        };

        tx.staged_loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    async fn save_loan(&self, tx: &mut MemoryTx, loan: &Loan) -> AppResult<Loan> {
        let mut stored = tx
            .loan(loan.id)
            .ok_or_else(|| AppError::NotFound(format!("Loan {} not found", loan.id)))?;

        stored.status = loan.status;
        stored.is_active = loan.is_active;
        stored.approved_by = loan.approved_by;
        stored.rejection_reason = loan.rejection_reason.clone();
        stored.reviewed_at = loan.reviewed_at;
        stored.approved_at = loan.approved_at;
        stored.rejected_at = loan.rejected_at;
        stored.updated_at = Utc::now();

        tx.staged_loans.insert(stored.id, stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl MemberStore<MemoryTx> for MemoryStore {
    async fn fetch_member_by_id(&self, _tx: &mut MemoryTx, member_id: Uuid) -> AppResult<Option<Member>> {
        Ok(self.tables.read().members.get(&member_id).cloned())
    }

    async fn fetch_member_by_user_id(&self, _tx: &mut MemoryTx, user_id: Uuid) -> AppResult<Option<Member>> {
        Ok(self
            .tables
            .read()
            .members
            .values()
            .find(|m| m.user_id == user_id)
            .cloned())
    }
}

#[async_trait]
impl SavingsStore<MemoryTx> for MemoryStore {
    async fn fetch_savings_by_member_id(
        &self,
        _tx: &mut MemoryTx,
        member_id: Uuid,
    ) -> AppResult<Option<Savings>> {
        Ok(self.tables.read().savings.get(&member_id).cloned())
    }
}

#[async_trait]
impl HistoryStore<MemoryTx> for MemoryStore {
    async fn append_history(&self, tx: &mut MemoryTx, entry: NewLoanHistory) -> AppResult<LoanHistory> {
        let entry = LoanHistory {
            id: Uuid::new_v4(),
            loan_id: entry.loan_id,
            status: entry.status,
            changed_by: entry.changed_by,
            remarks: entry.remarks,
            changed_at: Utc::now(),
        };

        tx.staged_history.push(entry.clone());
        Ok(entry)
    }

    async fn list_history_by_loan(&self, tx: &mut MemoryTx, loan_id: Uuid) -> AppResult<Vec<LoanHistory>> {
        let mut entries: Vec<LoanHistory> = self
            .tables
            .read()
            .history
            .iter()
            .chain(tx.staged_history.iter())
            .filter(|h| h.loan_id == loan_id)
            .cloned()
            .collect();

        // stable: equal timestamps keep insertion order
        entries.sort_by_key(|h| h.changed_at);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loans::models::LoanType;
    use rust_decimal_macros::dec;

    fn new_loan(member_id: Uuid) -> NewLoan {
        NewLoan {
            member_id,
            description: String::new(),
            loan_type: LoanType::Personal,
            amount: dec!(100),
            interest_rate: dec!(0.035),
            loan_term_months: 12,
            total_repayable_amount: dec!(103.5),
            installment_amount: dec!(8.625),
        }
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let store = MemoryStore::new(Duration::from_millis(100));
        let member_id = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        let loan = store.insert_loan(&mut tx, new_loan(member_id)).await.unwrap();
        drop(tx);

        assert!(store.committed_loan(loan.id).is_none());
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new(Duration::from_millis(100));
        let member_id = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        let loan = store.insert_loan(&mut tx, new_loan(member_id)).await.unwrap();
        store
            .append_history(&mut tx, NewLoanHistory::submitted(loan.id, member_id))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(store.committed_loan(loan.id).is_some());
        assert_eq!(store.committed_history(loan.id).len(), 1);
    }

    #[tokio::test]
    async fn test_lock_wait_times_out() {
        let store = MemoryStore::new(Duration::from_millis(50));
        let loan_id = Uuid::new_v4();

        let mut first = store.begin().await.unwrap();
        store.lock_loan_for_update(&mut first, loan_id).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let err = store
            .lock_loan_for_update(&mut second, loan_id)
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        // relocking inside the holder does not deadlock
        store.lock_loan_for_update(&mut first, loan_id).await.unwrap();
    }
}
