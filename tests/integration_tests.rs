//! Integration tests for reconciliation-core

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use reconciliation_core::{
    utils::MemoryStorage, BankStatement, CompanyExpense, ExpenseLedger, MatchStatus,
    RawTransactionRow, ReconConfig, ReconError, ReconciliationEngine, StatementStatus,
    StatementStore, TransactionClassifier, TransactionType,
};
use std::collections::HashSet;
use std::str::FromStr;

fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn expense(id: &str, d: u32, amount: &str) -> CompanyExpense {
    CompanyExpense::new(
        id.to_string(),
        "acme".to_string(),
        day(d),
        dec(amount),
        format!("Expense {}", id),
        "operations".to_string(),
    )
}

async fn engine_with_statement(
    beginning: &str,
    ending: &str,
) -> (MemoryStorage, ReconciliationEngine<MemoryStorage, MemoryStorage>) {
    let storage = MemoryStorage::new();
    let engine = ReconciliationEngine::new(storage.clone(), storage.clone());
    engine
        .create_statement(BankStatement::new(
            "stmt-jan".to_string(),
            "acme".to_string(),
            "Operating Account".to_string(),
            "****4821".to_string(),
            day(1),
            day(31),
            dec(beginning),
            dec(ending),
        ))
        .await
        .unwrap();
    (storage, engine)
}

async fn transaction_id_by_description(storage: &MemoryStorage, description: &str) -> String {
    storage
        .list_transactions("stmt-jan")
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.description == description)
        .unwrap()
        .id
}

#[tokio::test]
async fn test_complete_reconciliation_workflow() {
    let (storage, engine) = engine_with_statement("1000.00", "1195.00").await;

    storage.add_expense(expense("exp-rent", 10, "250.00")).unwrap();
    storage.add_expense(expense("exp-parts", 15, "100.00")).unwrap();
    storage.add_expense(expense("exp-lunch", 28, "12.00")).unwrap();

    let rows = vec![
        RawTransactionRow::new("2024-01-05", "Client payment ACME-0042", "500.00"),
        RawTransactionRow::new("2024-01-11", "Office rent January", "-250.00"),
        RawTransactionRow::new("2024-01-15", "Parts supplier", "-105.00"),
        RawTransactionRow::new("01/20/2024", "Card purchase", "($42.17)"),
        RawTransactionRow::new("garbage", "Unreadable row", "-1.00"),
        RawTransactionRow::new("2024-01-31", "MONTHLY SERVICE FEE", "97.17").with_type("deposit"),
    ];

    let ingestion = engine.ingest("stmt-jan", &rows).await.unwrap();
    assert_eq!(ingestion.accepted_count, 5);
    assert_eq!(ingestion.rejected_count, 1);
    assert_eq!(ingestion.statement_status, StatementStatus::Processed);

    let result = engine.reconcile("stmt-jan").await.unwrap();
    assert_eq!(result.matched_count, 1);
    assert_eq!(result.discrepancy_count, 1);
    assert_eq!(result.unmatched_count, 3);
    assert_eq!(result.deposits_total, dec("597.17"));
    assert_eq!(result.withdrawals_total, dec("397.17"));

    let rent = storage
        .get_transaction(&transaction_id_by_description(&storage, "Office rent January").await)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rent.match_status, MatchStatus::Matched);
    assert_eq!(rent.matched_expense_id.as_deref(), Some("exp-rent"));

    let parts = storage
        .get_transaction(&transaction_id_by_description(&storage, "Parts supplier").await)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(parts.match_status, MatchStatus::Discrepancy);
    assert_eq!(parts.matched_expense_id.as_deref(), Some("exp-parts"));
    assert!(parts.match_notes.unwrap().contains("$5.00"));

    let report = engine.get_report("stmt-jan").await.unwrap();
    assert_eq!(report.calculated_ending_balance, dec("1200.00"));
    assert_eq!(report.variance, dec("-5.00"));
    assert!(!report.balanced);

    let grouped = engine.get_statement_report("stmt-jan").await.unwrap();
    assert_eq!(grouped.matched.len(), 1);
    assert_eq!(grouped.discrepancies.len(), 1);
    assert_eq!(grouped.unmatched.len(), 3);
}

#[tokio::test]
async fn test_exact_match_scenario() {
    let (storage, engine) = engine_with_statement("0", "-250").await;
    storage.add_expense(expense("exp-1", 10, "-250.00")).unwrap();

    engine
        .ingest("stmt-jan", &[RawTransactionRow::new("2024-01-11", "Vendor", "-250.00")])
        .await
        .unwrap();
    engine.reconcile("stmt-jan").await.unwrap();

    let txn = &storage.list_transactions("stmt-jan").await.unwrap()[0];
    assert_eq!(txn.match_status, MatchStatus::Matched);
    assert_eq!(txn.matched_expense_id.as_deref(), Some("exp-1"));

    let linked = storage.get_expense("exp-1").await.unwrap().unwrap();
    assert_eq!(linked.bank_transaction_id.as_deref(), Some(txn.id.as_str()));
}

#[tokio::test]
async fn test_unmatched_scenario() {
    let (storage, engine) = engine_with_statement("0", "-42.17").await;
    storage.add_expense(expense("exp-far", 25, "42.17")).unwrap();

    engine
        .ingest("stmt-jan", &[RawTransactionRow::new("2024-01-10", "Card purchase", "-42.17")])
        .await
        .unwrap();
    let result = engine.reconcile("stmt-jan").await.unwrap();
    assert_eq!(result.unmatched_count, 1);

    let txn = &storage.list_transactions("stmt-jan").await.unwrap()[0];
    assert_eq!(txn.match_status, MatchStatus::Unmatched);
    assert_eq!(txn.matched_expense_id, None);
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let (storage, engine) = engine_with_statement("0", "0").await;
    for (id, d, amount) in [
        ("e1", 3, "80.00"),
        ("e2", 3, "80.00"),
        ("e3", 9, "19.99"),
        ("e4", 14, "300.00"),
        ("e5", 22, "64.10"),
    ] {
        storage.add_expense(expense(id, d, amount)).unwrap();
    }

    let rows = vec![
        RawTransactionRow::new("2024-01-04", "A", "-80.00"),
        RawTransactionRow::new("2024-01-05", "B", "-80.00"),
        RawTransactionRow::new("2024-01-09", "C", "-21.00"),
        RawTransactionRow::new("2024-01-14", "D", "-310.00"),
        RawTransactionRow::new("2024-01-30", "E", "-64.10"),
        RawTransactionRow::new("2024-01-30", "F", "900.00"),
    ];
    engine.ingest("stmt-jan", &rows).await.unwrap();

    let first = engine.reconcile("stmt-jan").await.unwrap();
    let snapshot = storage.list_transactions("stmt-jan").await.unwrap();

    let second = engine.reconcile("stmt-jan").await.unwrap();
    let again = storage.list_transactions("stmt-jan").await.unwrap();

    assert_eq!(snapshot, again);
    assert_eq!(first.matched_count, second.matched_count);
    assert_eq!(first.discrepancy_count, second.discrepancy_count);
    assert_eq!(first.unmatched_count, second.unmatched_count);
}

#[tokio::test]
async fn test_no_expense_is_linked_twice() {
    let (storage, engine) = engine_with_statement("0", "0").await;
    storage.add_expense(expense("e1", 10, "50.00")).unwrap();
    storage.add_expense(expense("e2", 11, "52.00")).unwrap();

    let rows: Vec<RawTransactionRow> = (10..=13)
        .map(|d| RawTransactionRow::new(&format!("2024-01-{}", d), &format!("Row {}", d), "-50.00"))
        .collect();
    engine.ingest("stmt-jan", &rows).await.unwrap();
    engine.reconcile("stmt-jan").await.unwrap();

    let transactions = storage.list_transactions("stmt-jan").await.unwrap();
    let linked: Vec<&str> = transactions
        .iter()
        .filter_map(|t| t.matched_expense_id.as_deref())
        .collect();
    let unique: HashSet<&str> = linked.iter().copied().collect();
    assert_eq!(linked.len(), unique.len());

    for txn in &transactions {
        if txn.matched_expense_id.is_some() {
            assert!(txn.match_status.allows_link());
        }
    }
}

#[tokio::test]
async fn test_override_survives_reconciliation() {
    let (storage, engine) = engine_with_statement("0", "0").await;
    engine
        .ingest(
            "stmt-jan",
            &[
                RawTransactionRow::new("2024-01-10", "Cash withdrawal", "-60.00"),
                RawTransactionRow::new("2024-01-12", "Owner draw", "-400.00"),
            ],
        )
        .await
        .unwrap();

    let cash = transaction_id_by_description(&storage, "Cash withdrawal").await;
    let draw = transaction_id_by_description(&storage, "Owner draw").await;

    engine
        .set_match_status(&cash, MatchStatus::Matched, Some("petty cash".to_string()))
        .await
        .unwrap();
    engine
        .set_match_status(&draw, MatchStatus::Ignored, None)
        .await
        .unwrap();

    // Expenses that would otherwise pair with both rows
    storage.add_expense(expense("e-cash", 10, "75.00")).unwrap();
    storage.add_expense(expense("e-draw", 12, "400.00")).unwrap();

    let result = engine.reconcile("stmt-jan").await.unwrap();
    assert_eq!(result.evaluated_count, 0);
    assert_eq!(result.skipped_count, 2);

    let cash_txn = storage.get_transaction(&cash).await.unwrap().unwrap();
    assert_eq!(cash_txn.match_status, MatchStatus::Matched);
    assert_eq!(cash_txn.match_notes.as_deref(), Some("petty cash"));
    let draw_txn = storage.get_transaction(&draw).await.unwrap().unwrap();
    assert_eq!(draw_txn.match_status, MatchStatus::Ignored);
    assert_eq!(storage.list_unlinked_expenses("acme").await.unwrap().len(), 2);

    // Clearing the confirmation lets the next pass classify it again
    engine.clear_confirmation(&cash).await.unwrap();
    engine
        .set_match_status_with(&cash, MatchStatus::Unmatched, None, false)
        .await
        .unwrap();
    engine.reconcile("stmt-jan").await.unwrap();
    let cash_txn = storage.get_transaction(&cash).await.unwrap().unwrap();
    assert_eq!(cash_txn.match_status, MatchStatus::Discrepancy);
    assert_eq!(cash_txn.matched_expense_id.as_deref(), Some("e-cash"));
}

#[tokio::test]
async fn test_released_expense_returns_to_pool() {
    let (storage, engine) = engine_with_statement("0", "0").await;
    storage.add_expense(expense("e1", 10, "30.00")).unwrap();
    engine
        .ingest(
            "stmt-jan",
            &[
                RawTransactionRow::new("2024-01-10", "First", "-30.00"),
                RawTransactionRow::new("2024-01-11", "Second", "-30.00"),
            ],
        )
        .await
        .unwrap();

    engine.reconcile("stmt-jan").await.unwrap();
    let first = transaction_id_by_description(&storage, "First").await;
    let second = transaction_id_by_description(&storage, "Second").await;
    assert_eq!(
        storage.get_transaction(&second).await.unwrap().unwrap().match_status,
        MatchStatus::Unmatched
    );

    engine
        .set_match_status(&first, MatchStatus::Ignored, Some("duplicate charge".to_string()))
        .await
        .unwrap();
    assert!(storage.get_expense("e1").await.unwrap().unwrap().bank_transaction_id.is_none());

    engine.reconcile("stmt-jan").await.unwrap();
    let second_txn = storage.get_transaction(&second).await.unwrap().unwrap();
    assert_eq!(second_txn.match_status, MatchStatus::Matched);
    assert_eq!(second_txn.matched_expense_id.as_deref(), Some("e1"));
}

#[tokio::test]
async fn test_discrepancy_is_reevaluated_when_exact_expense_appears() {
    let (storage, engine) = engine_with_statement("0", "0").await;
    storage.add_expense(expense("e-estimate", 10, "100.00")).unwrap();
    engine
        .ingest("stmt-jan", &[RawTransactionRow::new("2024-01-10", "Supplier", "-105.00")])
        .await
        .unwrap();

    engine.reconcile("stmt-jan").await.unwrap();
    let id = transaction_id_by_description(&storage, "Supplier").await;
    assert_eq!(
        storage.get_transaction(&id).await.unwrap().unwrap().match_status,
        MatchStatus::Discrepancy
    );

    storage.add_expense(expense("e-final", 11, "105.00")).unwrap();
    engine.reconcile("stmt-jan").await.unwrap();

    let txn = storage.get_transaction(&id).await.unwrap().unwrap();
    assert_eq!(txn.match_status, MatchStatus::Matched);
    assert_eq!(txn.matched_expense_id.as_deref(), Some("e-final"));
    let estimate = storage.get_expense("e-estimate").await.unwrap().unwrap();
    assert!(estimate.bank_transaction_id.is_none());
}

#[tokio::test]
async fn test_other_companies_expenses_are_not_candidates() {
    let (storage, engine) = engine_with_statement("0", "0").await;
    let mut foreign = expense("e-foreign", 10, "70.00");
    foreign.company_id = "globex".to_string();
    storage.add_expense(foreign).unwrap();

    engine
        .ingest("stmt-jan", &[RawTransactionRow::new("2024-01-10", "Taxi", "-70.00")])
        .await
        .unwrap();
    let result = engine.reconcile("stmt-jan").await.unwrap();
    assert_eq!(result.unmatched_count, 1);
}

#[tokio::test]
async fn test_concurrent_passes_on_different_statements() {
    let (storage, engine) = engine_with_statement("0", "0").await;
    engine
        .create_statement(BankStatement::new(
            "stmt-savings".to_string(),
            "acme".to_string(),
            "Savings".to_string(),
            "****9910".to_string(),
            day(1),
            day(31),
            dec("0"),
            dec("0"),
        ))
        .await
        .unwrap();
    storage.add_expense(expense("e1", 10, "20.00")).unwrap();
    storage.add_expense(expense("e2", 20, "35.00")).unwrap();

    engine
        .ingest("stmt-jan", &[RawTransactionRow::new("2024-01-10", "Books", "-20.00")])
        .await
        .unwrap();
    engine
        .ingest("stmt-savings", &[RawTransactionRow::new("2024-01-20", "Fees", "-35.00")])
        .await
        .unwrap();

    let (a, b) = tokio::join!(engine.reconcile("stmt-jan"), engine.reconcile("stmt-savings"));
    assert_eq!(a.unwrap().matched_count, 1);
    assert_eq!(b.unwrap().matched_count, 1);
}

#[tokio::test]
async fn test_lock_contention_is_reported() {
    let (_, engine) = engine_with_statement("0", "0").await;
    let lease = engine.leases().try_acquire("stmt-jan").unwrap();

    let err = engine.reconcile("stmt-jan").await.unwrap_err();
    assert!(matches!(err, ReconError::LockContention(ref id) if id == "stmt-jan"));
    drop(lease);

    assert!(engine.reconcile("stmt-jan").await.is_ok());
}

#[tokio::test]
async fn test_missing_statement() {
    let storage = MemoryStorage::new();
    let engine = ReconciliationEngine::new(storage.clone(), storage);
    assert!(matches!(
        engine.reconcile("nope").await,
        Err(ReconError::StatementNotFound(_))
    ));
    assert!(matches!(
        engine.get_report("nope").await,
        Err(ReconError::StatementNotFound(_))
    ));
}

#[tokio::test]
async fn test_custom_window_configuration() {
    let storage = MemoryStorage::new();
    let config = ReconConfig {
        date_window_days: 7,
        ..ReconConfig::default()
    };
    let engine = ReconciliationEngine::with_config(storage.clone(), storage.clone(), config);
    engine
        .create_statement(BankStatement::new(
            "stmt-jan".to_string(),
            "acme".to_string(),
            "Operating".to_string(),
            "****4821".to_string(),
            day(1),
            day(31),
            dec("0"),
            dec("0"),
        ))
        .await
        .unwrap();
    storage.add_expense(expense("e1", 3, "15.00")).unwrap();
    engine
        .ingest("stmt-jan", &[RawTransactionRow::new("2024-01-09", "Late posting", "-15.00")])
        .await
        .unwrap();

    let result = engine.reconcile("stmt-jan").await.unwrap();
    assert_eq!(result.matched_count, 1);
}

struct EverythingIsAFee;

impl TransactionClassifier for EverythingIsAFee {
    fn classify(
        &self,
        _description: &str,
        _amount: &BigDecimal,
        _raw_type: Option<&str>,
    ) -> (TransactionType, Option<String>) {
        (TransactionType::Fee, None)
    }
}

#[tokio::test]
async fn test_custom_classifier() {
    let storage = MemoryStorage::new();
    let engine = ReconciliationEngine::with_classifier(
        storage.clone(),
        storage.clone(),
        ReconConfig::default(),
        Box::new(EverythingIsAFee),
    );
    engine
        .create_statement(BankStatement::new(
            "stmt-jan".to_string(),
            "acme".to_string(),
            "Operating".to_string(),
            "****4821".to_string(),
            day(1),
            day(31),
            dec("0"),
            dec("0"),
        ))
        .await
        .unwrap();
    engine
        .ingest("stmt-jan", &[RawTransactionRow::new("2024-01-09", "Client payment", "500")])
        .await
        .unwrap();

    let txn = &engine.list_transactions("stmt-jan").await.unwrap()[0];
    assert_eq!(txn.transaction_type, TransactionType::Fee);
}

#[tokio::test]
async fn test_serialized_statuses_are_snake_case() {
    let (storage, engine) = engine_with_statement("0", "0").await;
    engine
        .ingest("stmt-jan", &[RawTransactionRow::new("2024-01-09", "CHECK 2231", "-45.00")])
        .await
        .unwrap();

    let txn = &storage.list_transactions("stmt-jan").await.unwrap()[0];
    let json = serde_json::to_value(txn).unwrap();
    assert_eq!(json["match_status"], "unmatched");
    assert_eq!(json["transaction_type"], "check");
    assert_eq!(json["check_number"], "2231");
    assert_eq!(json["manually_confirmed"], false);
}
