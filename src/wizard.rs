use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::schema::{self, Stage};

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Save gate for the current stage. Any field edit drops the state back to
/// `Editing`; only an acknowledged persist moves it to `Saved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Editing,
    Saved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub file_name: String,
    pub media_type: String,
}

/// Transient per-applicant wizard session. Nothing here outlives the daemon;
/// durable state is whatever `save` pushed into the record store.
#[derive(Debug, Clone)]
pub struct WizardState {
    pub current_stage: Stage,
    pub gate: Gate,
    pub completed: bool,
    pub fields: BTreeMap<String, String>,
    pub uploaded_files: BTreeMap<String, FileRef>,
    pub field_errors: BTreeMap<String, String>,
    /// Record version observed at hydration or last save; passed back on the
    /// next save so concurrent writers are detected instead of clobbered.
    pub record_version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Stage(Stage),
    ProceedToPayment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardError {
    UnknownField(String),
    InvalidFileType {
        field: String,
        media_type: String,
    },
    NotSaved,
    ValidationFailed {
        missing: Vec<String>,
        field_errors: BTreeMap<String, String>,
    },
    AlreadyCompleted,
    ForwardSelect {
        requested: Stage,
        current: Stage,
    },
}

impl Default for WizardState {
    fn default() -> Self {
        Self::new()
    }
}

impl WizardState {
    pub fn new() -> Self {
        WizardState {
            current_stage: Stage::Personal,
            gate: Gate::Editing,
            completed: false,
            fields: BTreeMap::new(),
            uploaded_files: BTreeMap::new(),
            field_errors: BTreeMap::new(),
            record_version: 0,
        }
    }

    /// Hydrates from a stored record. A non-empty record marks the wizard
    /// saved, since the data originated from the server.
    pub fn hydrate(record: &Map<String, Value>, version: i64) -> Self {
        let mut state = WizardState::new();
        state.record_version = version;
        if record.is_empty() {
            return state;
        }
        state.absorb_record(record);
        state.gate = Gate::Saved;
        state
    }

    fn absorb_record(&mut self, record: &Map<String, Value>) {
        self.fields.clear();
        self.uploaded_files.clear();
        for key in schema::known_field_keys() {
            if let Some(v) = record.get(key).and_then(|v| v.as_str()) {
                if !v.is_empty() {
                    self.fields.insert(key.to_string(), v.to_string());
                }
            }
        }
        for doc in schema::DOCUMENT_FIELDS {
            let record_key = schema::document_record_key(doc.key);
            if let Some(name) = record.get(&record_key).and_then(|v| v.as_str()) {
                if !name.is_empty() {
                    self.uploaded_files.insert(
                        doc.key.to_string(),
                        FileRef {
                            file_name: name.to_string(),
                            media_type: PDF_MEDIA_TYPE.to_string(),
                        },
                    );
                }
            }
        }
    }

    /// Writes a field, invalidating the save gate and clearing any stale
    /// error on that field.
    pub fn change_field(&mut self, field: &str, value: &str) -> Result<(), WizardError> {
        if !schema::is_known_field(field) {
            return Err(WizardError::UnknownField(field.to_string()));
        }
        if value.is_empty() {
            self.fields.remove(field);
        } else {
            self.fields.insert(field.to_string(), value.to_string());
        }
        self.gate = Gate::Editing;
        self.field_errors.remove(field);
        Ok(())
    }

    /// Stages an uploaded document reference. Anything that does not declare
    /// itself as a PDF is rejected with no state mutation at all.
    pub fn set_file(
        &mut self,
        field: &str,
        file_name: &str,
        media_type: &str,
    ) -> Result<(), WizardError> {
        if !schema::DOCUMENT_FIELDS.iter().any(|d| d.key == field) {
            return Err(WizardError::UnknownField(field.to_string()));
        }
        if media_type != PDF_MEDIA_TYPE {
            return Err(WizardError::InvalidFileType {
                field: field.to_string(),
                media_type: media_type.to_string(),
            });
        }
        self.uploaded_files.insert(
            field.to_string(),
            FileRef {
                file_name: file_name.to_string(),
                media_type: media_type.to_string(),
            },
        );
        self.gate = Gate::Editing;
        self.field_errors.remove(field);
        Ok(())
    }

    /// Full form payload for a save: every known field (current value or
    /// empty) plus staged document references.
    pub fn save_payload(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for key in schema::known_field_keys() {
            let value = self.fields.get(key).cloned().unwrap_or_default();
            out.insert(key.to_string(), json!(value));
        }
        for (key, file) in &self.uploaded_files {
            out.insert(schema::document_record_key(key), json!(file.file_name));
        }
        out
    }

    /// Accepts the server's merged echo-back as the new authoritative state.
    pub fn apply_saved(&mut self, merged: &Map<String, Value>, version: i64) {
        self.absorb_record(merged);
        self.record_version = version;
        self.gate = Gate::Saved;
    }

    /// Attempts the stage transition. Order matters: an unsaved stage is
    /// refused before any validation is attempted.
    pub fn advance(&mut self) -> Result<Advance, WizardError> {
        if self.completed {
            return Err(WizardError::AlreadyCompleted);
        }
        if self.gate != Gate::Saved {
            return Err(WizardError::NotSaved);
        }

        let mut missing: Vec<String> = Vec::new();
        let mut errors: BTreeMap<String, String> = BTreeMap::new();
        for def in schema::required_fields(self.current_stage) {
            let present = self
                .fields
                .get(def.key)
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false);
            if !present {
                missing.push(def.key.to_string());
                errors.insert(def.key.to_string(), schema::REQUIRED_MESSAGE.to_string());
            }
        }
        for def in schema::required_documents(self.current_stage) {
            if !self.uploaded_files.contains_key(def.key) {
                missing.push(def.key.to_string());
                errors.insert(def.key.to_string(), schema::upload_prompt(def.label));
            }
        }

        if !missing.is_empty() {
            self.field_errors = errors.clone();
            return Err(WizardError::ValidationFailed {
                missing,
                field_errors: errors,
            });
        }

        self.field_errors.clear();
        match self.current_stage.next() {
            Some(next) => {
                self.current_stage = next;
                Ok(Advance::Stage(next))
            }
            None => {
                self.completed = true;
                Ok(Advance::ProceedToPayment)
            }
        }
    }

    /// Re-enters an earlier (or the current) stage. The save gate is left as
    /// is: revisiting already-passed data does not forget that it was saved.
    pub fn select_stage(&mut self, stage: Stage) -> Result<(), WizardError> {
        if stage > self.current_stage {
            return Err(WizardError::ForwardSelect {
                requested: stage,
                current: self.current_stage,
            });
        }
        self.current_stage = stage;
        self.completed = false;
        Ok(())
    }
}
