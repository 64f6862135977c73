use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::db;

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/escola.sqlite3";
const DOCUMENTS_PREFIX: &str = "documents/";
pub const BUNDLE_FORMAT: &str = "escola-backup-v1";

#[derive(Debug, Clone)]
pub struct BackupSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub document_count: usize,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Zip the workspace database and every generated document artifact into a
/// backup bundle. The manifest carries a SHA-256 per entry so a restore can
/// verify the bundle before touching the live workspace.
pub fn create_backup(workspace_path: &Path, out_path: &Path) -> anyhow::Result<BackupSummary> {
    let db_path = workspace_path.join(db::DB_FILE);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }

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

    // (entry name, bytes) pairs hashed for the manifest before writing.
    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("failed to read database {}", db_path.to_string_lossy()))?;
    entries.push((DB_ENTRY.to_string(), db_bytes));

    let mut document_count = 0usize;
    let documents_dir = workspace_path.join("documents");
    if documents_dir.is_dir() {
        let mut names: Vec<_> = std::fs::read_dir(&documents_dir)
            .with_context(|| {
                format!(
                    "failed to list documents directory {}",
                    documents_dir.to_string_lossy()
                )
            })?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        for name in names {
            let path = documents_dir.join(&name);
            let bytes = std::fs::read(&path)
                .with_context(|| format!("failed to read artifact {}", path.to_string_lossy()))?;
            entries.push((format!("{}{}", DOCUMENTS_PREFIX, name), bytes));
            document_count += 1;
        }
    }

    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let files: Vec<serde_json::Value> = entries
        .iter()
        .map(|(name, bytes)| {
            json!({
                "path": name,
                "bytes": bytes.len(),
                "sha256": sha256_hex(bytes),
            })
        })
        .collect();
    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "createdAt": created_at,
        "files": files,
    });

    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    let entry_count = entries.len() + 1;
    for (name, bytes) in entries {
        zip.start_file(&name, opts)
            .with_context(|| format!("failed to start entry {}", name))?;
        zip.write_all(&bytes)
            .with_context(|| format!("failed to write entry {}", name))?;
    }

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(BackupSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        entry_count,
        document_count,
    })
}
