//! Statement reconciliation example

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use reconciliation_core::utils::MemoryStorage;
use reconciliation_core::{
    BankStatement, CompanyExpense, MatchStatus, RawTransactionRow, ReconConfig,
    ReconciliationEngine,
};
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("🏦 Reconciliation Core - Statement Reconciliation Example\n");

    let config = ReconConfig::from_env()?;
    let storage = MemoryStorage::new();
    let engine = ReconciliationEngine::with_config(storage.clone(), storage.clone(), config);

    // 1. Register the uploaded statement
    let statement = engine
        .create_statement(BankStatement::new(
            "stmt-2024-01".to_string(),
            "acme".to_string(),
            "Operating Account".to_string(),
            "****4821".to_string(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            BigDecimal::from(1000),
            BigDecimal::from(1195),
        ))
        .await?;
    println!("  ✓ Statement {} ({})", statement.id, statement.account_name);

    // 2. Expenses already booked in the ledger
    let booked = [
        ("exp-rent", 10, "250.00", "Office rent", "rent"),
        ("exp-parts", 15, "100.00", "Replacement parts", "maintenance"),
        ("exp-lunch", 28, "12.00", "Team lunch", "meals"),
    ];
    for (id, day, amount, description, category) in booked {
        storage.add_expense(CompanyExpense::new(
            id.to_string(),
            "acme".to_string(),
            NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            BigDecimal::from_str(amount)?,
            description.to_string(),
            category.to_string(),
        ))?;
    }
    println!("  ✓ Booked {} ledger expenses\n", booked.len());

    // 3. Ingest the parsed statement rows
    let rows = vec![
        RawTransactionRow::new("2024-01-05", "Client payment ACME-0042", "500.00"),
        RawTransactionRow::new("2024-01-11", "Office rent January", "-250.00"),
        RawTransactionRow::new("2024-01-15", "Parts supplier", "-105.00"),
        RawTransactionRow::new("01/20/2024", "Card purchase", "($42.17)"),
        RawTransactionRow::new("Jan 22", "Unreadable row", "-1.00"),
        RawTransactionRow::new("2024-01-31", "Interest", "97.17").with_type("deposit"),
    ];
    let ingestion = engine.ingest(&statement.id, &rows).await?;
    println!(
        "📥 Ingested {} rows, rejected {}",
        ingestion.accepted_count, ingestion.rejected_count
    );
    for error in &ingestion.errors {
        println!("  ✗ {}", error);
    }
    println!();

    // 4. Reconcile against the ledger
    let result = engine.reconcile(&statement.id).await?;
    println!("🔗 Reconciliation pass");
    println!("  Matched:       {}", result.matched_count);
    println!("  Discrepancies: {}", result.discrepancy_count);
    println!("  Unmatched:     {}", result.unmatched_count);
    println!();

    // 5. Review the grouped report
    let report = engine.get_statement_report(&statement.id).await?;
    for txn in report
        .matched
        .iter()
        .chain(&report.discrepancies)
        .chain(&report.unmatched)
    {
        println!(
            "  {} {:<28} {:>10} {:<12} {}",
            txn.transaction_date,
            txn.description,
            txn.amount.to_string(),
            txn.match_status.as_str(),
            txn.match_notes.as_deref().unwrap_or("")
        );
    }
    println!();

    // 6. A reviewer dismisses the interest row
    if let Some(interest) = report.unmatched.iter().find(|t| t.description == "Interest") {
        engine
            .set_match_status(
                &interest.id,
                MatchStatus::Ignored,
                Some("bank interest, no expense".to_string()),
            )
            .await?;
        println!("  ✓ Ignored {}", interest.description);
    }

    // 7. Balance check
    let variance = engine.get_report(&statement.id).await?;
    println!("\n📊 Variance Report");
    println!("  Beginning balance:  {}", variance.beginning_balance);
    println!("  Deposits:          +{}", variance.deposits_total);
    println!("  Withdrawals:       -{}", variance.withdrawals_total);
    println!("  Calculated ending:  {}", variance.calculated_ending_balance);
    println!("  Declared ending:    {}", variance.ending_balance);
    println!("  Variance:           {}", variance.variance);
    if variance.balanced {
        println!("  ✅ Statement balances");
    } else {
        println!("  ⚠️  Statement does not balance");
    }

    Ok(())
}
