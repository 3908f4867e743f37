use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::invoice::RECEIPTS_DIR;

const MANIFEST_ENTRY: &str = "manifest.json";
const RECORD_ENTRY: &str = "application/record.json";
pub const BUNDLE_FORMAT_V1: &str = "admit-application-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub receipt_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub record: serde_json::Map<String, serde_json::Value>,
}

/// Exports one applicant's full application: manifest, record snapshot, and
/// every receipt artifact in the workspace.
pub fn export_application_bundle(
    workspace_path: &Path,
    applicant_id: &str,
    record: &serde_json::Map<String, serde_json::Value>,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let record_text = serde_json::to_string_pretty(&serde_json::Value::Object(record.clone()))
        .context("failed to serialize record")?;
    let record_digest = format!("{:x}", Sha256::digest(record_text.as_bytes()));

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "applicantId": applicant_id,
        "recordSha256": record_digest,
        "exportedAt": exported_at,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(RECORD_ENTRY, opts)
        .context("failed to start record entry")?;
    zip.write_all(record_text.as_bytes())
        .context("failed to write record entry")?;

    let mut receipt_count = 0;
    let receipts_dir = workspace_path.join(RECEIPTS_DIR);
    if receipts_dir.is_dir() {
        let mut names: Vec<String> = Vec::new();
        for ent in std::fs::read_dir(&receipts_dir).context("failed to list receipts")? {
            let ent = ent?;
            let p = ent.path();
            if !p.is_file() {
                continue;
            }
            if let Some(name) = p.file_name().and_then(|s| s.to_str()) {
                names.push(name.to_string());
            }
        }
        // Deterministic bundle layout regardless of directory order.
        names.sort();
        for name in names {
            let src = receipts_dir.join(&name);
            zip.start_file(format!("{}/{}", RECEIPTS_DIR, name), opts)
                .with_context(|| format!("failed to start receipt entry {}", name))?;
            let mut f = File::open(&src)
                .with_context(|| format!("failed to open receipt {}", src.to_string_lossy()))?;
            std::io::copy(&mut f, &mut zip)
                .with_context(|| format!("failed to write receipt entry {}", name))?;
            receipt_count += 1;
        }
    }

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        receipt_count,
    })
}

/// Reads an exported bundle back, verifying format and record integrity,
/// restoring receipt artifacts, and returning the record snapshot for the
/// caller to merge into the store.
pub fn import_application_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let mut record_text = String::new();
    archive
        .by_name(RECORD_ENTRY)
        .context("bundle missing application/record.json")?
        .read_to_string(&mut record_text)
        .context("failed to read record entry")?;
    if let Some(expected) = manifest.get("recordSha256").and_then(|v| v.as_str()) {
        let actual = format!("{:x}", Sha256::digest(record_text.as_bytes()));
        if actual != expected {
            return Err(anyhow!("record checksum mismatch in bundle"));
        }
    }
    let record: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&record_text).context("record entry is invalid JSON")?;

    let receipts_dir = workspace_path.join(RECEIPTS_DIR);
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).context("failed to read bundle entry")?;
        let name = entry.name().to_string();
        let Some(file_name) = name.strip_prefix(&format!("{}/", RECEIPTS_DIR)) else {
            continue;
        };
        // Receipt entries are flat files named by txn id; refuse anything
        // that tries to escape the receipts directory.
        if file_name.is_empty() || file_name.contains('/') || file_name.contains("..") {
            continue;
        }
        std::fs::create_dir_all(&receipts_dir).context("failed to create receipts directory")?;
        let dst = receipts_dir.join(file_name);
        let mut out = File::create(&dst)
            .with_context(|| format!("failed to create receipt {}", dst.to_string_lossy()))?;
        std::io::copy(&mut entry, &mut out)
            .with_context(|| format!("failed to extract receipt {}", file_name))?;
    }

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
        record,
    })
}
