use crate::db;
use crate::invoice::{self, Invoice};
use crate::ipc::error::{err, no_workspace, ok};
use crate::ipc::handlers::applicant_id;
use crate::ipc::types::{AppState, PaymentSession, Request};
use crate::ledger::{
    FeeLedger, InstallmentMode, LedgerError, PayError, MAX_INSTALLMENT_LIMIT, REDIRECT_GRACE_MS,
    TOTAL_FEE,
};
use serde_json::json;

fn record_str(
    record: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Option<String> {
    record
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn session_view(s: &PaymentSession) -> serde_json::Value {
    json!({
        "totalFee": s.ledger.total_fee,
        "paidAmount": s.ledger.paid_amount,
        "balance": s.ledger.total_fee - s.ledger.paid_amount,
        "maxInstallmentLimit": s.ledger.max_installment_limit,
        "mode": s.ledger.mode.as_str(),
        "settled": s.ledger.is_settled(),
        "payerName": s.payer_name,
        "course": s.course,
    })
}

/// Opens a fresh payment session. Display fields come from the persisted
/// record, read best-effort the same way the wizard loads it.
fn handle_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let applicant = applicant_id(req);
    let total_fee = req
        .params
        .get("totalFee")
        .and_then(|v| v.as_i64())
        .unwrap_or(TOTAL_FEE);
    let max_installment = req
        .params
        .get("maxInstallmentLimit")
        .and_then(|v| v.as_i64())
        .unwrap_or(MAX_INSTALLMENT_LIMIT);
    if total_fee <= 0 || max_installment <= 0 {
        return err(
            &req.id,
            "bad_params",
            "totalFee and maxInstallmentLimit must be positive",
            None,
        );
    }

    let record = match state.db.as_ref() {
        Some(conn) => db::record_get(conn, &applicant)
            .map(|(record, _)| record)
            .unwrap_or_default(),
        None => Default::default(),
    };
    let payer_name = match (record_str(&record, "first_name"), record_str(&record, "last_name")) {
        (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
        (Some(first), None) => Some(first),
        (None, Some(last)) => Some(last),
        (None, None) => None,
    };
    let course = record_str(&record, "course");

    let session = PaymentSession {
        ledger: FeeLedger::new(total_fee, max_installment),
        payer_name,
        course,
    };
    let view = session_view(&session);
    state.payments.insert(applicant, session);
    ok(&req.id, view)
}

fn handle_select_mode(state: &mut AppState, req: &Request) -> serde_json::Value {
    let applicant = applicant_id(req);
    let mode_name = match req.params.get("mode").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing mode", None),
    };
    let Some(mode) = InstallmentMode::parse(&mode_name) else {
        return err(
            &req.id,
            "bad_params",
            "mode must be one of: full, part",
            Some(json!({ "mode": mode_name })),
        );
    };
    let Some(session) = state.payments.get_mut(&applicant) else {
        return err(&req.id, "no_session", "open the payment page first", None);
    };
    session.ledger.select_mode(mode);
    ok(&req.id, json!({ "mode": mode.as_str(), "nextCharge": session.ledger.next_charge() }))
}

/// One "pay" action: bounded charge, ledger update, receipt artifact. The
/// settling charge carries the one-shot redirect delay.
fn handle_pay(state: &mut AppState, req: &Request) -> serde_json::Value {
    let applicant = applicant_id(req);
    let Some(workspace) = state.workspace.clone() else {
        return no_workspace(&req.id);
    };
    let Some(session) = state.payments.get_mut(&applicant) else {
        return err(&req.id, "no_session", "open the payment page first", None);
    };

    let outcome = match session.ledger.pay() {
        Ok(v) => v,
        Err(PayError::AlreadySettled) => {
            return err(
                &req.id,
                "already_settled",
                "the fee is already settled in full",
                None,
            )
        }
        Err(PayError::Ledger(e @ LedgerError::Overpayment { .. })) => {
            return err(&req.id, "overpayment", e.message(), None)
        }
    };

    let inv = Invoice::build(
        session.payer_name.as_deref(),
        session.course.as_deref(),
        outcome.charge,
        session.ledger.total_fee,
        outcome.paid_amount,
    );
    let receipt_path = match invoice::write_receipt(&workspace, &inv) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "receipt_write_failed", format!("{e:#}"), None),
    };

    let mut result = json!({
        "invoice": inv,
        "receiptPath": receipt_path.to_string_lossy(),
        "paidAmount": outcome.paid_amount,
        "balance": outcome.balance,
        "settled": outcome.settled,
    });
    if outcome.redirect_scheduled {
        result["redirectAfterMs"] = json!(REDIRECT_GRACE_MS);
    }
    ok(&req.id, result)
}

fn handle_state(state: &mut AppState, req: &Request) -> serde_json::Value {
    let applicant = applicant_id(req);
    let Some(session) = state.payments.get(&applicant) else {
        return err(&req.id, "no_session", "open the payment page first", None);
    };
    ok(&req.id, session_view(session))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "payment.open" => Some(handle_open(state, req)),
        "payment.selectMode" => Some(handle_select_mode(state, req)),
        "payment.pay" => Some(handle_pay(state, req)),
        "payment.state" => Some(handle_state(state, req)),
        _ => None,
    }
}
