//! In-memory storage implementation for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::traits::*;
use crate::types::*;

/// In-memory statement store and expense ledger for testing and development
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    statements: Arc<RwLock<HashMap<String, BankStatement>>>,
    transactions: Arc<RwLock<HashMap<String, BankTransaction>>>,
    expenses: Arc<RwLock<HashMap<String, CompanyExpense>>>,
}

fn read<T>(lock: &RwLock<T>) -> ReconResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| ReconError::Storage("memory storage lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> ReconResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| ReconError::Storage("memory storage lock poisoned".to_string()))
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an expense to the ledger side, as the external expense module would
    pub fn add_expense(&self, expense: CompanyExpense) -> ReconResult<()> {
        write(&self.expenses)?.insert(expense.id.clone(), expense);
        Ok(())
    }
}

#[async_trait]
impl StatementStore for MemoryStorage {
    async fn save_statement(&self, statement: &BankStatement) -> ReconResult<()> {
        let mut statements = write(&self.statements)?;
        if statements.contains_key(&statement.id) {
            return Err(ReconError::Validation(format!(
                "Statement with ID '{}' already exists",
                statement.id
            )));
        }
        statements.insert(statement.id.clone(), statement.clone());
        Ok(())
    }

    async fn get_statement(&self, statement_id: &str) -> ReconResult<Option<BankStatement>> {
        Ok(read(&self.statements)?.get(statement_id).cloned())
    }

    async fn update_statement_status(
        &self,
        statement_id: &str,
        status: StatementStatus,
        error_message: Option<String>,
    ) -> ReconResult<()> {
        let mut statements = write(&self.statements)?;
        let statement = statements
            .get_mut(statement_id)
            .ok_or_else(|| ReconError::StatementNotFound(statement_id.to_string()))?;
        statement.status = status;
        statement.error_message = error_message;
        statement.updated_at = chrono::Utc::now().naive_utc();
        Ok(())
    }

    async fn insert_transactions(&self, transactions: &[BankTransaction]) -> ReconResult<()> {
        let statements = read(&self.statements)?;
        let mut stored = write(&self.transactions)?;

        for transaction in transactions {
            if !statements.contains_key(&transaction.statement_id) {
                return Err(ReconError::StatementNotFound(
                    transaction.statement_id.clone(),
                ));
            }
            if stored.contains_key(&transaction.id) {
                return Err(ReconError::Validation(format!(
                    "Transaction with ID '{}' already exists",
                    transaction.id
                )));
            }
        }

        for transaction in transactions {
            stored.insert(transaction.id.clone(), transaction.clone());
        }
        Ok(())
    }

    async fn list_transactions(&self, statement_id: &str) -> ReconResult<Vec<BankTransaction>> {
        let mut transactions: Vec<BankTransaction> = read(&self.transactions)?
            .values()
            .filter(|txn| txn.statement_id == statement_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| {
            a.transaction_date
                .cmp(&b.transaction_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(transactions)
    }

    async fn get_transaction(&self, transaction_id: &str) -> ReconResult<Option<BankTransaction>> {
        Ok(read(&self.transactions)?.get(transaction_id).cloned())
    }

    async fn update_transaction(&self, transaction: &BankTransaction) -> ReconResult<()> {
        let mut transactions = write(&self.transactions)?;
        match transactions.get_mut(&transaction.id) {
            Some(existing) => {
                existing.match_status = transaction.match_status;
                existing.match_notes = transaction.match_notes.clone();
                existing.matched_expense_id = transaction.matched_expense_id.clone();
                existing.manually_confirmed = transaction.manually_confirmed;
                Ok(())
            }
            None => Err(ReconError::TransactionNotFound(transaction.id.clone())),
        }
    }

    async fn apply_match_updates(
        &self,
        statement_id: &str,
        updates: &[MatchUpdate],
    ) -> ReconResult<()> {
        let mut transactions = write(&self.transactions)?;

        // Check the whole batch before touching anything
        for update in updates {
            match transactions.get(&update.transaction_id) {
                Some(txn) if txn.statement_id == statement_id => {}
                Some(_) => {
                    return Err(ReconError::Validation(format!(
                        "Transaction '{}' does not belong to statement '{}'",
                        update.transaction_id, statement_id
                    )))
                }
                None => {
                    return Err(ReconError::TransactionNotFound(
                        update.transaction_id.clone(),
                    ))
                }
            }
        }

        for update in updates {
            if let Some(txn) = transactions.get_mut(&update.transaction_id) {
                txn.match_status = update.match_status;
                txn.match_notes = update.match_notes.clone();
                txn.matched_expense_id = update.matched_expense_id.clone();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ExpenseLedger for MemoryStorage {
    async fn list_unlinked_expenses(&self, company_id: &str) -> ReconResult<Vec<CompanyExpense>> {
        let mut expenses: Vec<CompanyExpense> = read(&self.expenses)?
            .values()
            .filter(|expense| expense.company_id == company_id && !expense.is_linked())
            .cloned()
            .collect();
        expenses.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(expenses)
    }

    async fn get_expense(&self, expense_id: &str) -> ReconResult<Option<CompanyExpense>> {
        Ok(read(&self.expenses)?.get(expense_id).cloned())
    }

    async fn link_expense(&self, expense_id: &str, transaction_id: &str) -> ReconResult<()> {
        let mut expenses = write(&self.expenses)?;
        let expense = expenses
            .get_mut(expense_id)
            .ok_or_else(|| ReconError::ExpenseNotFound(expense_id.to_string()))?;

        match &expense.bank_transaction_id {
            Some(linked) if linked != transaction_id => Err(ReconError::LinkConflict {
                expense_id: expense_id.to_string(),
                linked_to: linked.clone(),
            }),
            _ => {
                expense.bank_transaction_id = Some(transaction_id.to_string());
                Ok(())
            }
        }
    }

    async fn unlink_expense(&self, expense_id: &str) -> ReconResult<()> {
        let mut expenses = write(&self.expenses)?;
        let expense = expenses
            .get_mut(expense_id)
            .ok_or_else(|| ReconError::ExpenseNotFound(expense_id.to_string()))?;
        expense.bank_transaction_id = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    fn expense(id: &str) -> CompanyExpense {
        CompanyExpense::new(
            id.to_string(),
            "acme".to_string(),
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            BigDecimal::from(250),
            "Office chairs".to_string(),
            "equipment".to_string(),
        )
    }

    #[tokio::test]
    async fn test_link_conflict_is_rejected() {
        let storage = MemoryStorage::new();
        storage.add_expense(expense("exp-1")).unwrap();

        storage.link_expense("exp-1", "txn-a").await.unwrap();
        // Relinking to the same transaction is a no-op
        storage.link_expense("exp-1", "txn-a").await.unwrap();

        let err = storage.link_expense("exp-1", "txn-b").await.unwrap_err();
        assert!(matches!(
            err,
            ReconError::LinkConflict { ref linked_to, .. } if linked_to == "txn-a"
        ));

        assert!(storage.list_unlinked_expenses("acme").await.unwrap().is_empty());
        storage.unlink_expense("exp-1").await.unwrap();
        assert_eq!(storage.list_unlinked_expenses("acme").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_match_updates_are_all_or_nothing() {
        let storage = MemoryStorage::new();
        let statement = BankStatement::new(
            "stmt-1".to_string(),
            "acme".to_string(),
            "Operating".to_string(),
            "****1234".to_string(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            BigDecimal::from(0),
            BigDecimal::from(0),
        );
        storage.save_statement(&statement).await.unwrap();

        let txn = BankTransaction::new(
            "txn-1".to_string(),
            "stmt-1".to_string(),
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            "Chairs".to_string(),
            BigDecimal::from(-250),
            TransactionType::Withdrawal,
        );
        storage.insert_transactions(&[txn]).await.unwrap();

        let updates = vec![
            MatchUpdate {
                transaction_id: "txn-1".to_string(),
                match_status: MatchStatus::Matched,
                match_notes: None,
                matched_expense_id: Some("exp-1".to_string()),
            },
            MatchUpdate {
                transaction_id: "missing".to_string(),
                match_status: MatchStatus::Matched,
                match_notes: None,
                matched_expense_id: None,
            },
        ];

        assert!(storage.apply_match_updates("stmt-1", &updates).await.is_err());
        let stored = storage.get_transaction("txn-1").await.unwrap().unwrap();
        assert_eq!(stored.match_status, MatchStatus::Unmatched);
        assert_eq!(stored.matched_expense_id, None);
    }
}
