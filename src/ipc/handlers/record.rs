use crate::db::{self, SaveError};
use crate::ipc::error::{err, no_workspace, ok};
use crate::ipc::handlers::applicant_id;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// Read side of the merge-on-save contract. Loads are best-effort: a missing
/// workspace or row degrades to an empty record so a fresh applicant is
/// never blocked.
fn handle_record_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let applicant = applicant_id(req);
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "record": {}, "version": 0 }));
    };

    match db::record_get(conn, &applicant) {
        Ok((record, version)) => ok(&req.id, json!({ "record": record, "version": version })),
        Err(_) => ok(&req.id, json!({ "record": {}, "version": 0 })),
    }
}

fn handle_record_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let applicant = applicant_id(req);

    let fields = match req.params.get("fields").and_then(|v| v.as_object()) {
        Some(v) => v.clone(),
        None => return err(&req.id, "bad_params", "missing fields object", None),
    };
    let expected_version = req.params.get("expectedVersion").and_then(|v| v.as_i64());

    match db::record_save(conn, &applicant, &fields, expected_version) {
        Ok((merged, version)) => ok(
            &req.id,
            json!({
                "success": true,
                "message": "application saved",
                "merged": merged,
                "version": version
            }),
        ),
        Err(SaveError::VersionConflict { expected, actual }) => err(
            &req.id,
            "version_conflict",
            "record was modified by another session",
            Some(json!({ "expectedVersion": expected, "actualVersion": actual })),
        ),
        Err(SaveError::Db(e)) => err(&req.id, "persistence_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "record.get" => Some(handle_record_get(state, req)),
        "record.save" => Some(handle_record_save(state, req)),
        _ => None,
    }
}
