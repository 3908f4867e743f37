use anyhow::Context;
use chrono::Local;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const RECEIPTS_DIR: &str = "receipts";
const PLACEHOLDER: &str = "N/A";

/// Immutable snapshot of one successful charge. Built once per payment,
/// never mutated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub txn_id: String,
    pub date: String,
    pub payer_name: String,
    pub course: String,
    pub amount: i64,
    pub total_fee: i64,
    pub paid_amount: i64,
    pub balance: i64,
}

impl Invoice {
    /// Payer name and course come from the persisted record; absent values
    /// fall back to a placeholder rather than failing the charge.
    pub fn build(
        payer_name: Option<&str>,
        course: Option<&str>,
        amount: i64,
        total_fee: i64,
        paid_amount: i64,
    ) -> Invoice {
        Invoice {
            txn_id: format!("TXN-{}", Uuid::new_v4()),
            date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            payer_name: non_empty_or(payer_name, PLACEHOLDER),
            course: non_empty_or(course, PLACEHOLDER),
            amount,
            total_fee,
            paid_amount,
            balance: total_fee - paid_amount,
        }
    }
}

fn non_empty_or(value: Option<&str>, fallback: &str) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.to_string(),
        _ => fallback.to_string(),
    }
}

/// Human-readable receipt body. Same inputs render the same document apart
/// from the generated txn id and timestamp carried by the invoice itself.
pub fn render_receipt(invoice: &Invoice) -> String {
    let body = format!(
        "==============================================\n\
         COLLEGE ADMISSION FEE RECEIPT\n\
         ==============================================\n\
         Transaction ID : {}\n\
         Date           : {}\n\
         Payer          : {}\n\
         Course         : {}\n\
         ----------------------------------------------\n\
         Amount Paid    : Rs. {}\n\
         Total Fee      : Rs. {}\n\
         Paid To Date   : Rs. {}\n\
         Balance Due    : Rs. {}\n\
         ==============================================\n",
        invoice.txn_id,
        invoice.date,
        invoice.payer_name,
        invoice.course,
        invoice.amount,
        invoice.total_fee,
        invoice.paid_amount,
        invoice.balance,
    );
    let digest = Sha256::digest(body.as_bytes());
    format!("{}integrity: sha256:{:x}\n", body, digest)
}

/// Writes the rendered receipt under `<workspace>/receipts/`, named by
/// transaction id.
pub fn write_receipt(workspace: &Path, invoice: &Invoice) -> anyhow::Result<PathBuf> {
    let dir = workspace.join(RECEIPTS_DIR);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create directory {}", dir.to_string_lossy()))?;
    let out_path = dir.join(format!("{}.txt", invoice.txn_id));
    std::fs::write(&out_path, render_receipt(invoice))
        .with_context(|| format!("failed to write receipt {}", out_path.to_string_lossy()))?;
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_payer_details_fall_back_to_placeholder() {
        let inv = Invoice::build(None, Some("  "), 500, 1_000, 500);
        assert_eq!(inv.payer_name, "N/A");
        assert_eq!(inv.course, "N/A");
        assert_eq!(inv.balance, 500);
    }

    #[test]
    fn receipt_carries_all_four_monetary_figures() {
        let inv = Invoice::build(Some("Asha Rao"), Some("B.Tech CSE"), 50_000, 60_000, 50_000);
        let text = render_receipt(&inv);
        assert!(text.contains(&inv.txn_id));
        assert!(text.contains("Amount Paid    : Rs. 50000"));
        assert!(text.contains("Total Fee      : Rs. 60000"));
        assert!(text.contains("Paid To Date   : Rs. 50000"));
        assert!(text.contains("Balance Due    : Rs. 10000"));
        assert!(text.contains("integrity: sha256:"));
    }

    #[test]
    fn fresh_txn_ids_per_invoice() {
        let a = Invoice::build(Some("A"), Some("C"), 1, 1, 1);
        let b = Invoice::build(Some("A"), Some("C"), 1, 1, 1);
        assert_ne!(a.txn_id, b.txn_id);
    }

    #[test]
    fn write_receipt_creates_the_artifact() {
        let ws = std::env::temp_dir().join(format!(
            "admit-receipt-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&ws).expect("create temp dir");

        let inv = Invoice::build(Some("Asha"), Some("B.Sc"), 1, 1, 1);
        let path = write_receipt(&ws, &inv).expect("write receipt");
        assert!(path.is_file());
        let text = std::fs::read_to_string(&path).expect("read receipt");
        assert!(text.contains(&inv.txn_id));
        let _ = std::fs::remove_dir_all(ws);
    }
}
