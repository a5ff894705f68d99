//! Doctor service - ledger consistency checks
//!
//! Read-only, over one consistent snapshot of wallets and entries, so it
//! can run while movements are in flight. Each check reports `pass`,
//! `warning` or `error` with the offending rows as details.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{Money, Transaction, Wallet};
use crate::ports::WalletStore;

/// Doctor service for ledger health checks
pub struct DoctorService {
    store: Arc<dyn WalletStore>,
}

impl DoctorService {
    pub fn new(store: Arc<dyn WalletStore>) -> Self {
        Self { store }
    }

    /// Run all checks
    pub fn run_checks(&self) -> Result<DoctorResult> {
        let snapshot = self.store.ledger_snapshot()?;
        let wallets = snapshot.wallets;
        let entries = snapshot.transactions;

        let by_id: HashMap<Uuid, &Wallet> = wallets.iter().map(|w| (w.id, w)).collect();
        let mut per_wallet: HashMap<Uuid, Vec<&Transaction>> = HashMap::new();
        for entry in &entries {
            per_wallet.entry(entry.wallet_id).or_default().push(entry);
        }
        for list in per_wallet.values_mut() {
            list.sort_by_key(|t| t.sequence);
        }

        let mut checks = BTreeMap::new();
        checks.insert(
            "balance_matches_ledger".to_string(),
            check_balances(&wallets, &per_wallet),
        );
        checks.insert("ledger_arithmetic".to_string(), check_arithmetic(&entries));
        checks.insert(
            "sequence_continuity".to_string(),
            check_sequences(&wallets, &per_wallet),
        );
        checks.insert(
            "non_negative_balances".to_string(),
            check_non_negative(&wallets, &entries),
        );
        checks.insert("orphaned_entries".to_string(), check_orphans(&entries, &by_id));

        let passed = checks.values().filter(|c| c.status == "pass").count() as i64;
        let warnings = checks.values().filter(|c| c.status == "warning").count() as i64;
        let errors = checks.values().filter(|c| c.status == "error").count() as i64;

        Ok(DoctorResult {
            checks,
            summary: DoctorSummary {
                passed,
                warnings,
                errors,
            },
        })
    }
}

fn check_balances(wallets: &[Wallet], per_wallet: &HashMap<Uuid, Vec<&Transaction>>) -> CheckResult {
    let details: Vec<serde_json::Value> = wallets
        .iter()
        .filter_map(|w| {
            let ledger = per_wallet
                .get(&w.id)
                .and_then(|list| list.last())
                .map(|t| t.balance_after)
                .unwrap_or(Money::ZERO);
            (ledger != w.balance).then(|| {
                json!({
                    "wallet_id": w.id.to_string(),
                    "balance": w.balance.to_string(),
                    "ledger_balance": ledger.to_string(),
                })
            })
        })
        .collect();

    CheckResult::from_details(
        details,
        "error",
        format!("All {} wallet balance(s) match their ledger", wallets.len()),
        |n| format!("{} wallet(s) disagree with their ledger", n),
    )
}

fn check_arithmetic(entries: &[Transaction]) -> CheckResult {
    let details: Vec<serde_json::Value> = entries
        .iter()
        .filter(|t| !t.is_consistent())
        .map(|t| {
            json!({
                "transaction_id": t.id.to_string(),
                "kind": t.kind.as_str(),
                "amount": t.amount.to_string(),
                "balance_before": t.balance_before.to_string(),
                "balance_after": t.balance_after.to_string(),
            })
        })
        .collect();

    CheckResult::from_details(
        details,
        "error",
        "Every ledger entry balances".to_string(),
        |n| format!("{} ledger entr(ies) do not add up", n),
    )
}

fn check_sequences(wallets: &[Wallet], per_wallet: &HashMap<Uuid, Vec<&Transaction>>) -> CheckResult {
    let details: Vec<serde_json::Value> = wallets
        .iter()
        .filter_map(|w| {
            let sequences: Vec<u64> = per_wallet
                .get(&w.id)
                .map(|list| list.iter().map(|t| t.sequence).collect())
                .unwrap_or_default();
            let contiguous = sequences.len() as u64 == w.version
                && sequences.iter().zip(1u64..).all(|(s, expected)| *s == expected);
            (!contiguous).then(|| {
                json!({
                    "wallet_id": w.id.to_string(),
                    "version": w.version,
                    "entries": sequences.len(),
                })
            })
        })
        .collect();

    CheckResult::from_details(
        details,
        "error",
        "Ledger sequences are gap-free".to_string(),
        |n| format!("{} wallet(s) have gaps or extra entries in their sequence", n),
    )
}

fn check_non_negative(wallets: &[Wallet], entries: &[Transaction]) -> CheckResult {
    let mut details: Vec<serde_json::Value> = wallets
        .iter()
        .filter(|w| w.balance.is_negative())
        .map(|w| json!({"wallet_id": w.id.to_string(), "balance": w.balance.to_string()}))
        .collect();
    details.extend(
        entries
            .iter()
            .filter(|t| t.balance_before.is_negative() || t.balance_after.is_negative())
            .map(|t| {
                json!({
                    "transaction_id": t.id.to_string(),
                    "balance_after": t.balance_after.to_string(),
                })
            }),
    );

    CheckResult::from_details(
        details,
        "error",
        "No negative balances".to_string(),
        |n| format!("{} negative balance(s) found", n),
    )
}

fn check_orphans(entries: &[Transaction], wallets: &HashMap<Uuid, &Wallet>) -> CheckResult {
    let details: Vec<serde_json::Value> = entries
        .iter()
        .filter(|t| !wallets.contains_key(&t.wallet_id))
        .map(|t| {
            json!({
                "transaction_id": t.id.to_string(),
                "wallet_id": t.wallet_id.to_string(),
            })
        })
        .collect();

    CheckResult::from_details(
        details,
        "warning",
        "No orphaned ledger entries found".to_string(),
        |n| format!("{} entr(ies) reference missing wallets", n),
    )
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: BTreeMap<String, CheckResult>,
    pub summary: DoctorSummary,
}

impl DoctorResult {
    pub fn is_healthy(&self) -> bool {
        self.summary.errors == 0
    }
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    fn from_details(
        details: Vec<serde_json::Value>,
        failure: &str,
        ok_message: String,
        failed_message: impl FnOnce(usize) -> String,
    ) -> Self {
        if details.is_empty() {
            Self {
                status: "pass".to_string(),
                message: ok_message,
                details: None,
            }
        } else {
            Self {
                status: failure.to_string(),
                message: failed_message(details.len()),
                details: Some(details),
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub passed: i64,
    pub warnings: i64,
    pub errors: i64,
}
