use std::collections::HashMap;
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::ledger::FeeLedger;
use crate::wizard::WizardState;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// One payment-page session: a fresh ledger plus the display fields read
/// from the applicant record when the page was opened.
pub struct PaymentSession {
    pub ledger: FeeLedger,
    pub payer_name: Option<String>,
    pub course: Option<String>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Transient wizard sessions, keyed by applicant id.
    pub wizards: HashMap<String, WizardState>,
    /// Transient payment sessions, keyed by applicant id.
    pub payments: HashMap<String, PaymentSession>,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            workspace: None,
            db: None,
            wizards: HashMap::new(),
            payments: HashMap::new(),
        }
    }
}
