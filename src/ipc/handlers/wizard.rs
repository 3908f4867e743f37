use crate::db;
use crate::ipc::error::{err, no_workspace, ok};
use crate::ipc::handlers::applicant_id;
use crate::ipc::types::{AppState, Request};
use crate::schema::{self, Stage};
use crate::wizard::{Advance, Gate, WizardError, WizardState};
use serde_json::json;

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, serde_json::Value> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| json!({ "code": "bad_params", "message": format!("missing {}", key) }))
}

fn param_err(id: &str, e: serde_json::Value) -> serde_json::Value {
    let code = e.get("code").and_then(|v| v.as_str()).unwrap_or("bad_params");
    let message = e.get("message").and_then(|v| v.as_str()).unwrap_or("bad params");
    err(id, code, message, None)
}

fn wizard_err(id: &str, e: WizardError) -> serde_json::Value {
    match e {
        WizardError::UnknownField(field) => err(
            id,
            "bad_params",
            format!("unknown field: {}", field),
            None,
        ),
        WizardError::InvalidFileType { field, media_type } => err(
            id,
            "invalid_file_type",
            "only PDF uploads are accepted",
            Some(json!({ "field": field, "mediaType": media_type })),
        ),
        WizardError::NotSaved => err(
            id,
            "not_saved",
            "save your changes before continuing",
            None,
        ),
        WizardError::ValidationFailed {
            missing,
            field_errors,
        } => err(
            id,
            "validation_failed",
            format!("missing required entries: {}", missing.join(", ")),
            Some(json!({ "missing": missing, "fieldErrors": field_errors })),
        ),
        WizardError::AlreadyCompleted => err(
            id,
            "already_completed",
            "the application form is complete; proceed to payment",
            None,
        ),
        WizardError::ForwardSelect { requested, current } => err(
            id,
            "bad_params",
            format!(
                "cannot jump forward to {} from {}",
                requested.as_str(),
                current.as_str()
            ),
            None,
        ),
    }
}

fn wizard_view(w: &WizardState) -> serde_json::Value {
    let files: serde_json::Map<String, serde_json::Value> = w
        .uploaded_files
        .iter()
        .map(|(k, f)| {
            (
                k.clone(),
                json!({ "fileName": f.file_name, "mediaType": f.media_type }),
            )
        })
        .collect();
    json!({
        "currentStage": w.current_stage.as_str(),
        "saved": w.gate == Gate::Saved,
        "completed": w.completed,
        "fields": w.fields,
        "uploadedFiles": files,
        "fieldErrors": w.field_errors,
        "recordVersion": w.record_version,
    })
}

fn stage_descriptors() -> serde_json::Value {
    let stages: Vec<serde_json::Value> = schema::STAGE_SEQUENCE
        .iter()
        .map(|s| {
            json!({
                "stage": s.as_str(),
                "fields": schema::required_fields(*s),
                "documents": schema::required_documents(*s),
            })
        })
        .collect();
    json!(stages)
}

fn session<'a>(
    state: &'a mut AppState,
    req: &Request,
    applicant: &str,
) -> Result<&'a mut WizardState, serde_json::Value> {
    match state.wizards.get_mut(applicant) {
        Some(w) => Ok(w),
        None => Err(err(&req.id, "no_session", "open the wizard first", None)),
    }
}

/// Mount: hydrate from the store (best-effort, never an error) and hand the
/// UI its stage descriptors alongside the current state.
fn handle_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let applicant = applicant_id(req);
    let (record, version) = match state.db.as_ref() {
        Some(conn) => db::record_get(conn, &applicant).unwrap_or_default(),
        None => Default::default(),
    };
    let wizard = WizardState::hydrate(&record, version);
    let mut view = wizard_view(&wizard);
    view["stages"] = stage_descriptors();
    state.wizards.insert(applicant, wizard);
    ok(&req.id, view)
}

fn handle_change_field(state: &mut AppState, req: &Request) -> serde_json::Value {
    let applicant = applicant_id(req);
    let field = match get_required_str(&req.params, "field") {
        Ok(v) => v,
        Err(e) => return param_err(&req.id, e),
    };
    let value = match get_required_str(&req.params, "value") {
        Ok(v) => v,
        Err(e) => return param_err(&req.id, e),
    };
    let wizard = match session(state, req, &applicant) {
        Ok(w) => w,
        Err(resp) => return resp,
    };
    match wizard.change_field(&field, &value) {
        Ok(()) => ok(&req.id, json!({ "saved": false })),
        Err(e) => wizard_err(&req.id, e),
    }
}

fn handle_set_file(state: &mut AppState, req: &Request) -> serde_json::Value {
    let applicant = applicant_id(req);
    let field = match get_required_str(&req.params, "field") {
        Ok(v) => v,
        Err(e) => return param_err(&req.id, e),
    };
    let file_name = match get_required_str(&req.params, "fileName") {
        Ok(v) => v,
        Err(e) => return param_err(&req.id, e),
    };
    let media_type = match get_required_str(&req.params, "mediaType") {
        Ok(v) => v,
        Err(e) => return param_err(&req.id, e),
    };
    let wizard = match session(state, req, &applicant) {
        Ok(w) => w,
        Err(resp) => return resp,
    };
    match wizard.set_file(&field, &file_name, &media_type) {
        Ok(()) => ok(&req.id, json!({ "saved": false, "field": field })),
        Err(e) => wizard_err(&req.id, e),
    }
}

/// Serializes the entire form (all stages) and persists it through the
/// merge contract; the merged echo-back becomes the authoritative state.
fn handle_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let applicant = applicant_id(req);
    let (payload, expected_version) = match state.wizards.get(&applicant) {
        Some(w) => (w.save_payload(), w.record_version),
        None => return err(&req.id, "no_session", "open the wizard first", None),
    };
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };

    match db::record_save(conn, &applicant, &payload, Some(expected_version)) {
        Ok((merged, version)) => {
            if let Some(wizard) = state.wizards.get_mut(&applicant) {
                wizard.apply_saved(&merged, version);
            }
            ok(
                &req.id,
                json!({
                    "saved": true,
                    "record": merged,
                    "version": version
                }),
            )
        }
        Err(db::SaveError::VersionConflict { expected, actual }) => err(
            &req.id,
            "version_conflict",
            "record was modified by another session; reload before saving",
            Some(json!({ "expectedVersion": expected, "actualVersion": actual })),
        ),
        Err(db::SaveError::Db(e)) => err(&req.id, "persistence_failed", e.to_string(), None),
    }
}

fn handle_next(state: &mut AppState, req: &Request) -> serde_json::Value {
    let applicant = applicant_id(req);
    let wizard = match session(state, req, &applicant) {
        Ok(w) => w,
        Err(resp) => return resp,
    };
    match wizard.advance() {
        Ok(Advance::Stage(stage)) => ok(
            &req.id,
            json!({ "currentStage": stage.as_str(), "proceedToPayment": false }),
        ),
        Ok(Advance::ProceedToPayment) => ok(
            &req.id,
            json!({ "currentStage": Stage::Documents.as_str(), "proceedToPayment": true }),
        ),
        Err(e) => wizard_err(&req.id, e),
    }
}

fn handle_select_stage(state: &mut AppState, req: &Request) -> serde_json::Value {
    let applicant = applicant_id(req);
    let stage_name = match get_required_str(&req.params, "stage") {
        Ok(v) => v,
        Err(e) => return param_err(&req.id, e),
    };
    let Some(stage) = Stage::parse(&stage_name) else {
        return err(
            &req.id,
            "bad_params",
            format!("unknown stage: {}", stage_name),
            None,
        );
    };
    let wizard = match session(state, req, &applicant) {
        Ok(w) => w,
        Err(resp) => return resp,
    };
    match wizard.select_stage(stage) {
        Ok(()) => ok(&req.id, json!({ "currentStage": stage.as_str() })),
        Err(e) => wizard_err(&req.id, e),
    }
}

fn handle_state(state: &mut AppState, req: &Request) -> serde_json::Value {
    let applicant = applicant_id(req);
    let wizard = match session(state, req, &applicant) {
        Ok(w) => w,
        Err(resp) => return resp,
    };
    ok(&req.id, wizard_view(wizard))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "wizard.open" => Some(handle_open(state, req)),
        "wizard.changeField" => Some(handle_change_field(state, req)),
        "wizard.setFile" => Some(handle_set_file(state, req)),
        "wizard.save" => Some(handle_save(state, req)),
        "wizard.next" => Some(handle_next(state, req)),
        "wizard.selectStage" => Some(handle_select_stage(state, req)),
        "wizard.state" => Some(handle_state(state, req)),
        _ => None,
    }
}
