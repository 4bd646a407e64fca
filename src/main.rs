//! Command-line front end for a local PhotoFlip gallery.

use anyhow::Context;
use clap::{Parser, Subcommand};
use photoflip::gallery::{projection::FolderFilter, UploadFile};
use photoflip::models::folder::validate_folder_name;
use photoflip::models::item::{Item, OwnerId};
use photoflip::{
    constants::{MAIN_GALLERY_TARGET_ID, TRASH_TARGET_ID},
    drag::DragAction,
    Config, Database, Gallery, GalleryEvent,
};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "photoflip", about = "PhotoFlip local gallery", version)]
struct Cli {
    /// Gallery owner (can also be set via PHOTOFLIP_OWNER env var)
    #[arg(short, long, global = true, env = "PHOTOFLIP_OWNER", default_value = "local")]
    owner: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload image files
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Folder to file the uploads under
        #[arg(short, long)]
        folder: Option<String>,
    },
    /// List the visible photos
    List {
        #[arg(short, long)]
        folder: Option<String>,
        /// Case-insensitive notes search across all folders
        #[arg(short, long)]
        search: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Replace a photo's notes
    Notes { id: String, text: String },
    /// Flip a photo card
    Flip { id: String },
    /// Drop a photo on a folder, `main` or `trash`
    Drop {
        id: String,
        target: String,
        /// Extra photos selected before the drag
        #[arg(long, num_args = 1..)]
        select: Vec<String>,
    },
    /// Manage folders
    Folder {
        #[command(subcommand)]
        action: FolderAction,
    },
    /// Write a zip archive of the gallery
    Export {
        out: PathBuf,
        /// Limit the archive to these photos
        #[arg(long, num_args = 1..)]
        select: Vec<String>,
    },
    /// Import a previously exported archive
    Import { input: PathBuf },
}

#[derive(Subcommand)]
enum FolderAction {
    Create { name: String },
    Delete { name: String },
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "photoflip=info,photoflip_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let output = run(cli, Config::from_env()).await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}

/// Open the gallery, apply one command, wait for background writes and close.
async fn run(cli: Cli, config: Config) -> anyhow::Result<String> {
    let owner = OwnerId::new(cli.owner)?;
    let database = Database::open(&config)
        .await
        .context("failed to open gallery storage")?;
    let (gallery, mut events) = Gallery::from_database(&database, &config);
    gallery.set_owner(Some(owner)).await?;

    let result = execute(&gallery, cli.command).await;

    gallery.flush_notes();
    gallery.settle().await;
    let failures = drain_failures(&mut events);
    gallery.close().await;
    database.close().await;

    let output = result?;
    if failures.is_empty() {
        Ok(output)
    } else {
        anyhow::bail!("{}", failures.join("; "))
    }
}

/// Background write failures reported while the command ran.
fn drain_failures(events: &mut UnboundedReceiver<GalleryEvent>) -> Vec<String> {
    let mut failures = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            GalleryEvent::SyncFailed { op, message } => {
                failures.push(format!("{} failed: {}", op, message));
            }
            GalleryEvent::Status(message) => tracing::info!("{}", message),
            _ => {}
        }
    }
    failures
}

async fn execute(gallery: &Gallery, command: Commands) -> anyhow::Result<String> {
    match command {
        Commands::Upload { files, folder } => {
            if let Some(folder) = folder.filter(|name| !name.trim().is_empty()) {
                let folder = ensure_folder(gallery, &folder)?;
                gallery.set_active_folder(FolderFilter::Named(folder));
            }
            let mut batch = Vec::with_capacity(files.len());
            for path in files {
                let bytes = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                batch.push(UploadFile { name, bytes });
            }
            let before = gallery.items().len();
            let progress = gallery
                .upload(batch, |progress| {
                    tracing::debug!(
                        completed = progress.completed,
                        total = progress.total,
                        "upload progress"
                    );
                })
                .await?;
            Ok(format!(
                "Uploaded {} of {} files",
                gallery.items().len().saturating_sub(before),
                progress.total
            ))
        }
        Commands::List {
            folder,
            search,
            json,
        } => {
            if let Some(folder) = folder {
                gallery.set_active_folder(FolderFilter::from_target(&folder));
            }
            if let Some(search) = search {
                gallery.set_search(search);
            }
            let items = gallery.visible_items();
            if json {
                return Ok(serde_json::to_string_pretty(&items)?);
            }
            Ok(format_items(&items))
        }
        Commands::Notes { id, text } => {
            gallery.update_notes(&id, text)?;
            Ok(format!("Saved notes for {}", id))
        }
        Commands::Flip { id } => {
            let flipped = gallery.toggle_flip(&id)?;
            Ok(format!(
                "{} is now {}",
                id,
                if flipped { "flipped" } else { "face up" }
            ))
        }
        Commands::Drop { id, target, select } => {
            let selection: BTreeSet<&String> = select.iter().chain(std::iter::once(&id)).collect();
            for selected in selection {
                gallery.toggle_select(selected);
            }
            let gesture = gallery
                .begin_drag(&id)
                .with_context(|| format!("{} cannot be dragged", id))?;
            let over = match target.as_str() {
                "trash" => TRASH_TARGET_ID,
                "main" => MAIN_GALLERY_TARGET_ID,
                name => name,
            };
            Ok(match gallery.end_drag(&gesture, Some(over)) {
                DragAction::Move { ids, folder } if folder.is_empty() => {
                    format!("Moved {} photos to the main gallery", ids.len())
                }
                DragAction::Move { ids, folder } => {
                    format!("Moved {} photos to {}", ids.len(), folder)
                }
                DragAction::Delete { ids } => format!("Deleted {} photos", ids.len()),
                DragAction::NoOp => "Nothing to do".to_string(),
            })
        }
        Commands::Folder { action } => match action {
            FolderAction::Create { name } => {
                let folder = gallery.create_folder(&name)?;
                Ok(format!("Created folder {}", folder.name))
            }
            FolderAction::Delete { name } => {
                let moved = gallery.delete_folder(&name)?;
                Ok(format!(
                    "Deleted folder {} ({} photos returned to the main gallery)",
                    name,
                    moved.len()
                ))
            }
            FolderAction::List => Ok(gallery
                .folders()
                .into_iter()
                .map(|folder| folder.name)
                .collect::<Vec<_>>()
                .join("\n")),
        },
        Commands::Export { out, select } => {
            let selection: BTreeSet<&String> = select.iter().collect();
            for id in selection {
                gallery.toggle_select(id);
            }
            let bytes = gallery.export_archive(!select.is_empty()).await?;
            tokio::fs::write(&out, &bytes)
                .await
                .with_context(|| format!("failed to write {}", out.display()))?;
            Ok(format!("Wrote {} ({} bytes)", out.display(), bytes.len()))
        }
        Commands::Import { input } => {
            let bytes = tokio::fs::read(&input)
                .await
                .with_context(|| format!("failed to read {}", input.display()))?;
            let report = gallery
                .import_archive(bytes, |progress| {
                    tracing::debug!(
                        completed = progress.completed,
                        total = progress.total,
                        "import progress"
                    );
                })
                .await?;
            Ok(format!(
                "Imported {} photos ({} duplicates skipped, {} missing, {} failed)",
                report.imported, report.skipped_duplicates, report.missing_blobs, report.failed
            ))
        }
    }
}

/// Return the canonical name of folder `name`, creating it when missing.
fn ensure_folder(gallery: &Gallery, name: &str) -> anyhow::Result<String> {
    let name = validate_folder_name(name)?;
    if gallery.folders().iter().any(|folder| folder.name == name) {
        return Ok(name);
    }
    Ok(gallery.create_folder(&name)?.name)
}

fn format_items(items: &[Item]) -> String {
    items
        .iter()
        .map(|item| {
            let folder = if item.folder.is_empty() {
                "-"
            } else {
                item.folder.as_str()
            };
            format!(
                "{:<36} {:<24} {:<12} {}",
                item.id, item.name, folder, item.notes
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
