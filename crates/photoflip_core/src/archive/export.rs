//! Building archives from a set of items.

use super::{sanitize_segment, viewer, IndexRecord};
use crate::constants::{ARCHIVE_INDEX_NAME, ARCHIVE_PHOTOS_DIR, ARCHIVE_VIEWER_NAME};
use crate::content::ContentStore;
use crate::error::AppError;
use crate::models::item::Item;
use std::collections::BTreeSet;
use std::io::{Cursor, Write};

/// An image and its index record, ready to be written.
pub(crate) struct ArchiveEntry {
    pub(crate) path: String,
    pub(crate) record: IndexRecord,
    pub(crate) bytes: Vec<u8>,
}

fn entry_path(item: &Item) -> String {
    let file_name = item.content_ref.file_name();
    if item.is_unfiled() {
        format!("{}/{}", ARCHIVE_PHOTOS_DIR, file_name)
    } else {
        format!(
            "{}/{}/{}",
            ARCHIVE_PHOTOS_DIR,
            sanitize_segment(&item.folder),
            file_name
        )
    }
}

/// Serialize `items` (or only the selected ones) into a ZIP archive.
///
/// An empty or absent selection exports every item. Items whose blob cannot
/// be read are skipped and logged.
///
/// # Returns
/// The archive bytes.
///
/// # Errors
/// Returns an error when the container cannot be written.
pub async fn export_archive(
    items: &[Item],
    content: &ContentStore,
    selection: Option<&BTreeSet<String>>,
) -> Result<Vec<u8>, AppError> {
    let selection = selection.filter(|ids| !ids.is_empty());
    let mut entries = Vec::new();

    for item in items {
        if selection.is_some_and(|ids| !ids.contains(&item.id)) {
            continue;
        }
        let bytes = match content.get(&item.content_ref).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(
                    item_id = %item.id,
                    key = %item.content_ref,
                    error = %err,
                    "skipping item without a readable blob"
                );
                continue;
            }
        };
        entries.push(ArchiveEntry {
            path: entry_path(item),
            record: IndexRecord {
                notes: item.notes.clone(),
                folder: item.folder.clone(),
                flipped: item.flipped,
                filename: item.content_ref.file_name().to_string(),
                name: item.name.clone(),
            },
            bytes,
        });
    }

    let exported = entries.len();
    let archive = tokio::task::spawn_blocking(move || write_archive(&entries)).await??;
    tracing::info!(exported, size = archive.len(), "gallery archive exported");
    Ok(archive)
}

fn write_archive(entries: &[ArchiveEntry]) -> Result<Vec<u8>, AppError> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let stored =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let deflated = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let index: Vec<&IndexRecord> = entries.iter().map(|entry| &entry.record).collect();
    writer.start_file(ARCHIVE_INDEX_NAME, deflated)?;
    writer.write_all(&serde_json::to_vec_pretty(&index)?)?;

    writer.start_file(ARCHIVE_VIEWER_NAME, deflated)?;
    writer.write_all(viewer::render(entries).as_bytes())?;

    // Images are already compressed; storing them avoids wasted work.
    for entry in entries {
        writer.start_file(entry.path.as_str(), stored)?;
        writer.write_all(&entry.bytes)?;
    }

    Ok(writer.finish()?.into_inner())
}
