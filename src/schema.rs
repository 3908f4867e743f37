use serde::Serialize;

/// One step of the admission wizard, in fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Personal,
    Academic,
    Counseling,
    Address,
    Documents,
}

pub const STAGE_SEQUENCE: [Stage; 5] = [
    Stage::Personal,
    Stage::Academic,
    Stage::Counseling,
    Stage::Address,
    Stage::Documents,
];

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Personal => "personal",
            Stage::Academic => "academic",
            Stage::Counseling => "counseling",
            Stage::Address => "address",
            Stage::Documents => "documents",
        }
    }

    pub fn parse(s: &str) -> Option<Stage> {
        match s.to_ascii_lowercase().as_str() {
            "personal" => Some(Stage::Personal),
            "academic" => Some(Stage::Academic),
            "counseling" => Some(Stage::Counseling),
            "address" => Some(Stage::Address),
            "documents" => Some(Stage::Documents),
            _ => None,
        }
    }

    /// Next stage in the fixed sequence; `None` from the terminal stage.
    pub fn next(self) -> Option<Stage> {
        let idx = STAGE_SEQUENCE.iter().position(|s| *s == self)?;
        STAGE_SEQUENCE.get(idx + 1).copied()
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub key: &'static str,
    pub label: &'static str,
}

const fn field(key: &'static str, label: &'static str) -> FieldDef {
    FieldDef { key, label }
}

pub const PERSONAL_FIELDS: &[FieldDef] = &[
    field("first_name", "First Name"),
    field("last_name", "Last Name"),
    field("email", "Email"),
    field("phone", "Phone Number"),
    field("date_of_birth", "Date of Birth"),
    field("gender", "Gender"),
];

pub const ACADEMIC_FIELDS: &[FieldDef] = &[
    field("last_qualification", "Last Qualification"),
    field("board", "Board / University"),
    field("passing_year", "Year of Passing"),
    field("percentage", "Percentage / CGPA"),
];

pub const COUNSELING_FIELDS: &[FieldDef] = &[
    field("entrance_rank", "Entrance Rank"),
    field("admission_category", "Admission Category"),
    field("course", "Preferred Course"),
];

pub const ADDRESS_FIELDS: &[FieldDef] = &[
    field("address_line", "Address"),
    field("city", "City"),
    field("state", "State"),
    field("pincode", "PIN Code"),
];

/// Documents stage: validated against uploaded file references, not field
/// values. Keys double as record keys (prefixed) once saved.
pub const DOCUMENT_FIELDS: &[FieldDef] = &[
    field("tenth_marksheet", "10th Marksheet"),
    field("twelfth_marksheet", "12th Marksheet"),
    field("id_proof", "ID Proof"),
    field("transfer_certificate", "Transfer Certificate"),
];

pub const REQUIRED_MESSAGE: &str = "This field is required";

/// Record key under which an uploaded document reference is persisted.
pub fn document_record_key(doc_key: &str) -> String {
    format!("doc_{}", doc_key)
}

pub fn upload_prompt(label: &str) -> String {
    format!("Please upload {} (PDF)", label)
}

/// Required value-bearing fields for a stage. Empty for Documents, which is
/// gated on uploads instead.
pub fn required_fields(stage: Stage) -> &'static [FieldDef] {
    match stage {
        Stage::Personal => PERSONAL_FIELDS,
        Stage::Academic => ACADEMIC_FIELDS,
        Stage::Counseling => COUNSELING_FIELDS,
        Stage::Address => ADDRESS_FIELDS,
        Stage::Documents => &[],
    }
}

pub fn required_documents(stage: Stage) -> &'static [FieldDef] {
    match stage {
        Stage::Documents => DOCUMENT_FIELDS,
        _ => &[],
    }
}

/// Every known form field key, in stage order. `save` always serializes this
/// full set so the stored record converges on a fixed schema.
pub fn known_field_keys() -> Vec<&'static str> {
    PERSONAL_FIELDS
        .iter()
        .chain(ACADEMIC_FIELDS)
        .chain(COUNSELING_FIELDS)
        .chain(ADDRESS_FIELDS)
        .map(|f| f.key)
        .collect()
}

pub fn is_known_field(key: &str) -> bool {
    known_field_keys().contains(&key)
}
