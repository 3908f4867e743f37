use crate::bundle;
use crate::db;
use crate::ipc::error::{err, no_workspace, ok};
use crate::ipc::handlers::applicant_id;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn required_path(req: &Request, key: &str) -> Result<PathBuf, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn handle_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let applicant = applicant_id(req);
    let out_path = match required_path(req, "outPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(workspace) = state.workspace.clone() else {
        return no_workspace(&req.id);
    };
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    let (record, _) = match db::record_get(conn, &applicant) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    match bundle::export_application_bundle(&workspace, &applicant, &record, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "bundleFormat": summary.bundle_format,
                "receiptCount": summary.receipt_count,
                "outPath": out_path.to_string_lossy(),
            }),
        ),
        Err(e) => err(&req.id, "bundle_export_failed", format!("{e:#}"), None),
    }
}

fn handle_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let applicant = applicant_id(req);
    let in_path = match required_path(req, "inPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(workspace) = state.workspace.clone() else {
        return no_workspace(&req.id);
    };
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    let imported = match bundle::import_application_bundle(&in_path, &workspace) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bundle_import_failed", format!("{e:#}"), None),
    };

    match db::record_save(conn, &applicant, &imported.record, None) {
        Ok((_, version)) => ok(
            &req.id,
            json!({
                "bundleFormatDetected": imported.bundle_format_detected,
                "version": version,
            }),
        ),
        Err(db::SaveError::VersionConflict { .. }) => err(
            &req.id,
            "version_conflict",
            "record was modified during import",
            None,
        ),
        Err(db::SaveError::Db(e)) => err(&req.id, "persistence_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "application.exportBundle" => Some(handle_export(state, req)),
        "application.importBundle" => Some(handle_import(state, req)),
        _ => None,
    }
}
