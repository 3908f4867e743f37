pub mod bundle;
pub mod core;
pub mod payment;
pub mod record;
pub mod wizard;

use crate::db;
use crate::ipc::types::Request;

/// Applicant partition key; callers that omit it get the original
/// single-record-per-deployment behavior.
pub fn applicant_id(req: &Request) -> String {
    req.params
        .get("applicantId")
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(db::DEFAULT_APPLICANT_ID)
        .to_string()
}
