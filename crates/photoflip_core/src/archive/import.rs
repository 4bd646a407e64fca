//! Reading archives back into a record store.

use super::{IndexRecord, Progress};
use crate::constants::ARCHIVE_INDEX_NAME;
use crate::content::ContentStore;
use crate::db::RecordStore;
use crate::error::AppError;
use crate::models::item::{ContentKey, Fingerprint, Item, OwnerId};
use std::collections::{BTreeSet, HashSet};
use std::io::{Cursor, Read};

/// Outcome of one archive import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped_duplicates: usize,
    pub missing_blobs: usize,
    /// Entries whose blob or row write failed.
    pub failed: usize,
    /// Non-empty folder labels carried by the imported items.
    pub folders: BTreeSet<String>,
}

/// Decoded container: the index records plus every file entry.
struct ArchiveContents {
    records: Vec<IndexRecord>,
    files: Vec<(String, Vec<u8>)>,
}

impl ArchiveContents {
    /// Find the image for `record`, by exact path first and then by file-name suffix.
    fn blob_for(&self, record: &IndexRecord) -> Option<&[u8]> {
        let file_name = record.filename.rsplit('/').next().unwrap_or_default();
        if file_name.is_empty() {
            return None;
        }
        let suffix = format!("/{}", file_name);
        self.files
            .iter()
            .find(|(path, _)| path == file_name)
            .or_else(|| self.files.iter().find(|(path, _)| path.ends_with(&suffix)))
            .map(|(_, bytes)| bytes.as_slice())
    }
}

fn is_index_entry(path: &str) -> bool {
    path == ARCHIVE_INDEX_NAME || path.ends_with(&format!("/{}", ARCHIVE_INDEX_NAME))
}

fn read_archive(bytes: &[u8]) -> Result<ArchiveContents, AppError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AppError::Validation(format!("Invalid archive: {e}")))?;

    let mut index: Option<(String, Vec<u8>)> = None;
    let mut files = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| AppError::Validation(format!("Archive read error: {e}")))?;
        if file.is_dir() {
            continue;
        }
        // Entries that would escape the archive root are ignored.
        let name = match file.enclosed_name() {
            Some(path) => path.to_string_lossy().replace('\\', "/"),
            None => continue,
        };

        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| AppError::Validation(format!("Failed to read '{name}': {e}")))?;

        if is_index_entry(&name) {
            // The shallowest index wins when an archive nests several.
            let shallower = index
                .as_ref()
                .is_none_or(|(current, _)| name.len() < current.len());
            if shallower {
                index = Some((name, buf));
            }
        } else {
            files.push((name, buf));
        }
    }

    let Some((index_path, index_bytes)) = index else {
        return Err(AppError::NotFound(format!(
            "archive index '{}'",
            ARCHIVE_INDEX_NAME
        )));
    };
    let records: Vec<IndexRecord> = serde_json::from_slice(&index_bytes)
        .map_err(|e| AppError::Validation(format!("Malformed index '{index_path}': {e}")))?;
    Ok(ArchiveContents { records, files })
}

/// Import an archive for `owner`.
///
/// Entries whose fingerprint matches one of `existing` are skipped, as are
/// entries whose image is missing from the container. Every surviving entry
/// gets a fresh id and content key and is written blob first, then row.
/// `progress` is called after each index record.
///
/// # Errors
/// Fails only for container-level problems: an unreadable archive, a missing
/// or malformed index. Per-entry failures are logged and counted.
pub async fn import_archive<F>(
    bytes: Vec<u8>,
    owner: &OwnerId,
    content: &ContentStore,
    records: &dyn RecordStore,
    existing: &HashSet<Fingerprint>,
    mut progress: F,
) -> Result<ImportReport, AppError>
where
    F: FnMut(Progress) + Send,
{
    let contents = tokio::task::spawn_blocking(move || read_archive(&bytes)).await??;
    let total = contents.records.len();
    let mut report = ImportReport::default();

    for (index, record) in contents.records.iter().enumerate() {
        import_record(&contents, record, owner, content, records, existing, &mut report).await;
        progress(Progress::new(index + 1, total));
    }

    tracing::info!(
        owner = %owner,
        imported = report.imported,
        skipped_duplicates = report.skipped_duplicates,
        missing_blobs = report.missing_blobs,
        failed = report.failed,
        "gallery archive imported"
    );
    Ok(report)
}

async fn import_record(
    contents: &ArchiveContents,
    record: &IndexRecord,
    owner: &OwnerId,
    content: &ContentStore,
    records: &dyn RecordStore,
    existing: &HashSet<Fingerprint>,
    report: &mut ImportReport,
) {
    if existing.contains(&record.fingerprint()) {
        report.skipped_duplicates += 1;
        return;
    }
    let Some(blob) = contents.blob_for(record) else {
        tracing::warn!(filename = %record.filename, "archive entry has no image, skipping");
        report.missing_blobs += 1;
        return;
    };

    let key = ContentKey::generate(owner, record.display_name());
    if let Err(err) = content.put(&key, blob.to_vec()).await {
        tracing::warn!(filename = %record.filename, error = %err, "failed to store imported image");
        report.failed += 1;
        return;
    }

    let mut item = Item::new(
        owner.clone(),
        key,
        record.display_name().to_string(),
        record.folder.clone(),
    );
    item.notes = record.notes.clone();
    item.flipped = record.flipped;
    if let Err(err) = records.upsert(owner, &item).await {
        // The blob stays behind as an orphan.
        tracing::warn!(
            item_id = %item.id,
            key = %item.content_ref,
            error = %err,
            "failed to write imported item"
        );
        report.failed += 1;
        return;
    }

    if !item.folder.is_empty() {
        report.folders.insert(item.folder);
    }
    report.imported += 1;
}
