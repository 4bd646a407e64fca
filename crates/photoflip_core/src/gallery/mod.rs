//! Optimistic in-memory gallery and its synchronization with the stores.
//!
//! Every user action updates the in-memory collection first and then issues
//! its store write as a tracked background task. Low-stakes writes (notes,
//! flip) only log failures; moves, deletes and folder changes reconcile by
//! re-reading the record store. Writes still in flight are replayed over
//! every fresh listing.

mod pending;
pub mod projection;
mod tasks;

#[cfg(test)]
mod tests;

use crate::archive::{self, ImportReport, Progress};
use crate::config::{Config, GalleryTiming};
use crate::content::{ContentStore, UrlGrant};
use crate::db::{Database, RecordStore};
use crate::drag::{self, DragAction, DragGesture};
use crate::error::AppError;
use crate::models::{
    folder::{validate_folder_name, Folder},
    item::{ContentKey, Fingerprint, Item, ItemField, OwnerId},
};
use pending::{PendingWrite, PendingWrites};
use projection::FolderFilter;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tasks::{Debouncer, TaskTracker};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Notifications for whoever renders the gallery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GalleryEvent {
    /// The in-memory collection was replaced by a fresh store listing.
    ItemsRefreshed,
    /// A debounced notes write landed.
    NotesSaved { id: String },
    /// A background write failed; a reconciling refresh follows.
    SyncFailed { op: &'static str, message: String },
    /// The reconciling refresh after a failed write finished.
    Reconciled,
    /// A user-visible batch-level message.
    Status(String),
}

/// One file handed to [`Gallery::upload`].
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Display name, also the source of the content key's extension.
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
struct GalleryState {
    owner: Option<OwnerId>,
    /// Bumped on every identity change; background results from an older epoch are dropped.
    epoch: u64,
    items: Vec<Item>,
    folders: Vec<Folder>,
    active_folder: FolderFilter,
    search: String,
    selection: BTreeSet<String>,
    /// Notes typed but not yet confirmed by the store.
    pending_notes: HashMap<String, String>,
    /// Moves, deletes, flips and folder changes not yet confirmed by the store.
    writes: PendingWrites,
    saved_until: Option<Instant>,
    dropping_until: Option<Instant>,
    upload_progress: Progress,
}

struct Shared {
    records: Arc<dyn RecordStore>,
    content: Arc<ContentStore>,
    timing: GalleryTiming,
    max_upload_size: usize,
    state: Mutex<GalleryState>,
    events: mpsc::UnboundedSender<GalleryEvent>,
    tasks: TaskTracker,
    notes: Debouncer,
}

/// The gallery state machine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Gallery {
    shared: Arc<Shared>,
}

fn no_owner() -> AppError {
    AppError::Permission("No signed-in owner".to_string())
}

fn item_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("item '{}'", id))
}

impl Gallery {
    /// Build a gallery over explicitly opened stores.
    ///
    /// # Returns
    /// The gallery and the receiving end of its event stream.
    pub fn new(
        records: Arc<dyn RecordStore>,
        content: Arc<ContentStore>,
        timing: GalleryTiming,
        max_upload_size: usize,
    ) -> (Self, mpsc::UnboundedReceiver<GalleryEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let gallery = Self {
            shared: Arc::new(Shared {
                records,
                content,
                timing,
                max_upload_size,
                state: Mutex::new(GalleryState::default()),
                events,
                tasks: TaskTracker::default(),
                notes: Debouncer::default(),
            }),
        };
        (gallery, rx)
    }

    /// Build a gallery over `database` with timing and limits from `config`.
    pub fn from_database(
        database: &Database,
        config: &Config,
    ) -> (Self, mpsc::UnboundedReceiver<GalleryEvent>) {
        Self::new(
            Arc::clone(&database.records),
            Arc::clone(&database.content),
            config.timing(),
            config.max_upload_size,
        )
    }

    fn state(&self) -> MutexGuard<'_, GalleryState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: GalleryEvent) {
        // Nobody listening is fine.
        let _ = self.shared.events.send(event);
    }

    fn current_owner(&self) -> Result<(OwnerId, u64), AppError> {
        let state = self.state();
        let owner = state.owner.clone().ok_or_else(no_owner)?;
        Ok((owner, state.epoch))
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.state().owner.clone()
    }

    /// Apply an identity change from the authentication layer.
    ///
    /// Signing in (or switching owner) reloads everything from the stores.
    /// Signing out clears items, folders and selection, cancels pending notes
    /// writes and releases render URLs.
    ///
    /// # Errors
    /// Returns the store error when the sign-in refresh fails.
    pub async fn set_owner(&self, owner: Option<OwnerId>) -> Result<(), AppError> {
        {
            let mut state = self.state();
            if state.owner == owner {
                return Ok(());
            }
            let epoch = state.epoch + 1;
            *state = GalleryState {
                owner: owner.clone(),
                epoch,
                ..GalleryState::default()
            };
        }
        self.shared.notes.cancel_all();
        self.shared.content.close().await;

        match owner {
            Some(owner) => {
                tracing::info!(owner = %owner, "owner signed in");
                self.refresh().await
            }
            None => {
                tracing::info!("owner signed out");
                self.emit(GalleryEvent::ItemsRefreshed);
                Ok(())
            }
        }
    }

    /// Replace the in-memory collection with the record store's listing.
    ///
    /// Writes still in flight and notes edits whose write is still pending
    /// are re-applied on top, and results are dropped if the owner changed
    /// while loading. Render URLs are materialized for the visible items only.
    pub async fn refresh(&self) -> Result<(), AppError> {
        let Ok((owner, epoch)) = self.current_owner() else {
            return Ok(());
        };
        let mut items = self.shared.records.list_items(&owner).await?;
        let mut folders = self.shared.records.list_folders(&owner).await?;

        let vanished: Vec<ContentKey> = {
            let mut state = self.state();
            if state.epoch != epoch {
                tracing::debug!(owner = %owner, "dropping refresh for a previous owner");
                return Ok(());
            }
            if state.writes.len() > 0 {
                tracing::debug!(pending = state.writes.len(), "replaying in-flight writes");
            }
            state.writes.replay(&mut items, &mut folders);
            for item in &mut items {
                if let Some(notes) = state.pending_notes.get(&item.id) {
                    item.notes = notes.clone();
                }
            }
            let known: HashSet<&str> = items.iter().map(|item| item.id.as_str()).collect();
            let selection = std::mem::take(&mut state.selection);
            state.selection = selection
                .into_iter()
                .filter(|id| known.contains(id.as_str()))
                .collect();
            let vanished = state
                .items
                .iter()
                .filter(|item| !known.contains(item.id.as_str()))
                .map(|item| item.content_ref.clone())
                .collect();
            state.folders = folders;
            state.items = items;
            vanished
        };

        for key in &vanished {
            self.shared.content.release_url(key).await;
        }
        self.materialize_visible_urls(epoch).await;
        self.emit(GalleryEvent::ItemsRefreshed);
        Ok(())
    }

    /// Materialize render URLs for the visible items, at most one cache's worth.
    async fn materialize_visible_urls(&self, epoch: u64) {
        let capacity = self.shared.content.url_capacity();
        let targets: Vec<(String, ContentKey)> = {
            let state = self.state();
            projection::visible(&state.items, &state.active_folder, &state.search)
                .into_iter()
                .take(capacity)
                .map(|item| (item.id.clone(), item.content_ref.clone()))
                .collect()
        };

        for (id, key) in targets {
            match self.shared.content.grant_url(&key).await {
                Ok(grant) => self.apply_grant(epoch, &key, &grant),
                Err(AppError::NotFound(_)) => {
                    tracing::debug!(item_id = %id, key = %key, "no blob to render");
                }
                Err(err) => {
                    tracing::warn!(
                        item_id = %id,
                        key = %key,
                        error = %err,
                        "failed to materialize render url"
                    );
                }
            }
        }
    }

    /// Point `key`'s items at the granted URL and drop URLs whose handles were evicted.
    fn apply_grant(&self, epoch: u64, key: &ContentKey, grant: &UrlGrant) {
        let mut state = self.state();
        if state.epoch != epoch {
            return;
        }
        for item in state.items.iter_mut() {
            if &item.content_ref == key {
                item.render_url = Some(grant.url.clone());
            } else if grant.evicted.contains(&item.content_ref) {
                item.render_url = None;
            }
        }
    }

    /// Render URL for `id`, materializing it on demand.
    ///
    /// Items whose handles are evicted to make room lose their `render_url`.
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] for unknown ids or missing blobs.
    pub async fn render_url(&self, id: &str) -> Result<String, AppError> {
        let (key, epoch) = {
            let state = self.state();
            let item = state
                .items
                .iter()
                .find(|item| item.id == id)
                .ok_or_else(|| item_not_found(id))?;
            (item.content_ref.clone(), state.epoch)
        };
        let grant = self.shared.content.grant_url(&key).await?;
        self.apply_grant(epoch, &key, &grant);
        Ok(grant.url)
    }

    /// Confirm the optimistic write under `token` as answered by the store.
    fn finish_write(&self, epoch: u64, token: u64) {
        let mut state = self.state();
        if state.epoch == epoch {
            state.writes.finish(token);
        }
    }

    /// Roll the view back to the store's state after a failed high-stakes write.
    ///
    /// Transient faults reconcile silently. Any other failure was rejected
    /// before the store changed; it is also surfaced as a status message and
    /// never retried.
    async fn write_failed(&self, op: &'static str, epoch: u64, err: AppError) {
        let current = self.state().epoch;
        if current != epoch {
            tracing::debug!(op, error = %err, "ignoring failed write for a previous owner");
            return;
        }
        if err.is_transient() {
            tracing::warn!(op, error = %err, "background write failed; reconciling");
        } else {
            tracing::error!(op, error = %err, "background write rejected");
            self.emit(GalleryEvent::Status(format!("Could not {}: {}", op, err)));
        }
        self.emit(GalleryEvent::SyncFailed {
            op,
            message: err.to_string(),
        });
        if let Err(err) = self.refresh().await {
            tracing::error!(op, error = %err, "reconciling refresh failed");
        }
        self.emit(GalleryEvent::Reconciled);
    }

    pub fn items(&self) -> Vec<Item> {
        self.state().items.clone()
    }

    pub fn item(&self, id: &str) -> Option<Item> {
        self.state().items.iter().find(|item| item.id == id).cloned()
    }

    pub fn folders(&self) -> Vec<Folder> {
        self.state().folders.clone()
    }

    /// Items shown for the current folder and search text.
    pub fn visible_items(&self) -> Vec<Item> {
        let state = self.state();
        projection::visible(&state.items, &state.active_folder, &state.search)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn active_folder(&self) -> FolderFilter {
        self.state().active_folder.clone()
    }

    pub fn set_active_folder(&self, filter: FolderFilter) {
        self.state().active_folder = filter;
    }

    pub fn set_search(&self, query: impl Into<String>) {
        self.state().search = query.into();
    }

    /// Toggle `id` in the selection.
    ///
    /// # Returns
    /// Whether `id` is selected afterwards.
    pub fn toggle_select(&self, id: &str) -> bool {
        let mut state = self.state();
        if !state.items.iter().any(|item| item.id == id) {
            return false;
        }
        if state.selection.remove(id) {
            false
        } else {
            state.selection.insert(id.to_string());
            true
        }
    }

    pub fn clear_selection(&self) {
        self.state().selection.clear();
    }

    pub fn selected_ids(&self) -> BTreeSet<String> {
        self.state().selection.clone()
    }

    /// Whether the "saved" indicator is showing.
    pub fn is_saved(&self) -> bool {
        self.state()
            .saved_until
            .is_some_and(|until| Instant::now() < until)
    }

    /// Whether the trash "dropping" indicator is showing.
    pub fn is_dropping(&self) -> bool {
        self.state()
            .dropping_until
            .is_some_and(|until| Instant::now() < until)
    }

    /// Progress of the most recent upload batch.
    pub fn upload_progress(&self) -> Progress {
        self.state().upload_progress
    }

    /// Upload `files` one after another into the active folder.
    ///
    /// Each file is written blob first, then row. A failing file is logged
    /// and skipped; it still counts as processed. The collection is reloaded
    /// from the record store once the batch is done.
    ///
    /// # Returns
    /// The final progress snapshot.
    ///
    /// # Errors
    /// Returns [`AppError::Permission`] when nobody is signed in.
    pub async fn upload<F>(&self, files: Vec<UploadFile>, mut on_progress: F) -> Result<Progress, AppError>
    where
        F: FnMut(Progress) + Send,
    {
        let (owner, _) = self.current_owner()?;
        let folder = self.state().active_folder.label().to_string();
        let mut progress = Progress::new(0, files.len());
        self.state().upload_progress = progress;

        for file in files {
            if let Err(err) = self.upload_one(&owner, &folder, file).await {
                tracing::warn!(error = %err, "upload skipped");
            }
            progress.completed += 1;
            self.state().upload_progress = progress;
            on_progress(progress);
        }

        if let Err(err) = self.refresh().await {
            tracing::warn!(error = %err, "post-upload refresh failed");
            self.emit(GalleryEvent::SyncFailed {
                op: "upload",
                message: err.to_string(),
            });
        }
        Ok(progress)
    }

    async fn upload_one(&self, owner: &OwnerId, folder: &str, file: UploadFile) -> Result<(), AppError> {
        if file.bytes.len() > self.shared.max_upload_size {
            return Err(AppError::Validation(format!(
                "'{}' exceeds the {} byte upload limit",
                file.name, self.shared.max_upload_size
            )));
        }
        let key = ContentKey::generate(owner, &file.name);
        self.shared.content.put(&key, file.bytes).await?;

        let item = Item::new(owner.clone(), key, file.name, folder.to_string());
        if let Err(err) = self.shared.records.upsert(owner, &item).await {
            // The blob stays behind as an orphan.
            tracing::warn!(
                item_id = %item.id,
                key = %item.content_ref,
                "item row write failed after blob upload"
            );
            return Err(err);
        }
        tracing::debug!(item_id = %item.id, name = %item.name, "uploaded");
        Ok(())
    }

    /// Show `text` as `id`'s notes now and persist it after the quiet period.
    ///
    /// Only the latest text is written; each call restarts the delay.
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] for unknown ids.
    pub fn update_notes(&self, id: &str, text: impl Into<String>) -> Result<(), AppError> {
        let text = text.into();
        {
            let mut state = self.state();
            if state.owner.is_none() {
                return Err(no_owner());
            }
            let item = state
                .items
                .iter_mut()
                .find(|item| item.id == id)
                .ok_or_else(|| item_not_found(id))?;
            item.notes = text.clone();
            state.pending_notes.insert(id.to_string(), text);
        }
        self.schedule_notes_write(id.to_string(), self.shared.timing.notes_debounce);
        Ok(())
    }

    /// Write every pending notes edit now instead of waiting out the quiet period.
    pub fn flush_notes(&self) {
        let ids: Vec<String> = self.state().pending_notes.keys().cloned().collect();
        for id in ids {
            self.schedule_notes_write(id, Duration::ZERO);
        }
    }

    fn schedule_notes_write(&self, id: String, delay: Duration) {
        let Ok((owner, epoch)) = self.current_owner() else {
            return;
        };
        let gallery = self.clone();
        let task_id = id.clone();
        self.shared
            .notes
            .schedule(&self.shared.tasks, id, delay, async move {
                gallery.write_notes(owner, epoch, task_id).await;
            });
    }

    async fn write_notes(&self, owner: OwnerId, epoch: u64, id: String) {
        let text = {
            let state = self.state();
            if state.epoch != epoch {
                return;
            }
            state.pending_notes.get(&id).cloned()
        };
        let Some(text) = text else {
            return;
        };

        let result = self
            .shared
            .records
            .update_field(&owner, &id, &ItemField::Notes(text.clone()))
            .await;

        let mut state = self.state();
        if state.epoch != epoch {
            return;
        }
        if state.pending_notes.get(&id) == Some(&text) {
            state.pending_notes.remove(&id);
        }
        match result {
            Ok(()) => {
                state.saved_until = Some(Instant::now() + self.shared.timing.saved_indicator);
                drop(state);
                tracing::debug!(item_id = %id, "notes saved");
                self.emit(GalleryEvent::NotesSaved { id });
            }
            Err(err) => {
                drop(state);
                tracing::warn!(item_id = %id, error = %err, "notes write failed");
            }
        }
    }

    /// Flip a card. The write is fire-and-forget; failures are only logged.
    ///
    /// # Returns
    /// The new flipped state.
    pub fn toggle_flip(&self, id: &str) -> Result<bool, AppError> {
        let (owner, epoch, flipped, token) = {
            let mut state = self.state();
            let owner = state.owner.clone().ok_or_else(no_owner)?;
            let flipped = {
                let item = state
                    .items
                    .iter_mut()
                    .find(|item| item.id == id)
                    .ok_or_else(|| item_not_found(id))?;
                item.flipped = !item.flipped;
                item.flipped
            };
            let token = state.writes.begin(PendingWrite::Flip {
                id: id.to_string(),
                flipped,
            });
            (owner, state.epoch, flipped, token)
        };

        let gallery = self.clone();
        let id = id.to_string();
        self.shared.tasks.spawn(async move {
            let result = gallery
                .shared
                .records
                .update_field(&owner, &id, &ItemField::Flipped(flipped))
                .await;
            gallery.finish_write(epoch, token);
            if let Err(err) = result {
                tracing::warn!(item_id = %id, error = %err, "flip write failed");
            }
        });
        Ok(flipped)
    }

    /// Start dragging `id`, freezing the current selection for the gesture.
    ///
    /// Flipped cards are being edited and cannot be dragged.
    pub fn begin_drag(&self, id: &str) -> Option<DragGesture> {
        let state = self.state();
        let item = state.items.iter().find(|item| item.id == id)?;
        if item.flipped {
            return None;
        }
        Some(DragGesture::new(
            id,
            item.folder.clone(),
            state.selection.clone(),
        ))
    }

    /// Finish a drag over `over`.
    ///
    /// The resolved action is applied to the in-memory collection, the
    /// selection is cleared, and the batched store write is issued in the
    /// background. A failed write reconciles with the record store.
    pub fn end_drag(&self, gesture: &DragGesture, over: Option<&str>) -> DragAction {
        let mut state = self.state();
        let action = drag::resolve(gesture, over, &state.folders);
        let Some(owner) = state.owner.clone() else {
            state.selection.clear();
            return DragAction::NoOp;
        };

        let (doomed_keys, token): (Vec<ContentKey>, u64) = match &action {
            DragAction::NoOp => (Vec::new(), 0),
            DragAction::Move { ids, folder } => {
                for item in state.items.iter_mut().filter(|item| ids.contains(&item.id)) {
                    item.folder = folder.clone();
                }
                let token = state.writes.begin(PendingWrite::Move {
                    ids: ids.clone(),
                    folder: folder.clone(),
                });
                (Vec::new(), token)
            }
            DragAction::Delete { ids } => {
                let keys = state
                    .items
                    .iter()
                    .filter(|item| ids.contains(&item.id))
                    .map(|item| item.content_ref.clone())
                    .collect();
                state.items.retain(|item| !ids.contains(&item.id));
                for id in ids {
                    state.pending_notes.remove(id);
                }
                state.dropping_until = Some(Instant::now() + self.shared.timing.drop_feedback);
                let token = state.writes.begin(PendingWrite::Delete { ids: ids.clone() });
                (keys, token)
            }
        };
        state.selection.clear();
        let epoch = state.epoch;
        drop(state);

        match action.clone() {
            DragAction::NoOp => {}
            DragAction::Move { ids, folder } => self.spawn_move(owner, epoch, token, ids, folder),
            DragAction::Delete { ids } => {
                for id in &ids {
                    self.shared.notes.cancel(id);
                }
                self.spawn_delete(owner, epoch, token, ids, doomed_keys);
            }
        }
        action
    }

    fn spawn_move(&self, owner: OwnerId, epoch: u64, token: u64, ids: Vec<String>, folder: String) {
        let gallery = self.clone();
        self.shared.tasks.spawn(async move {
            let field = ItemField::Folder(folder);
            let result = gallery
                .shared
                .records
                .update_field_many(&owner, &ids, &field)
                .await;
            gallery.finish_write(epoch, token);
            if let Err(err) = result {
                gallery.write_failed("move", epoch, err).await;
            }
        });
    }

    fn spawn_delete(
        &self,
        owner: OwnerId,
        epoch: u64,
        token: u64,
        ids: Vec<String>,
        keys: Vec<ContentKey>,
    ) {
        let gallery = self.clone();
        self.shared.tasks.spawn(async move {
            let result = async {
                // Nothing is touched when any blob lies outside the owner's namespace.
                if let Some(foreign) = keys.iter().find(|key| !key.is_owned_by(&owner)) {
                    return Err(AppError::Permission(format!(
                        "content '{}' is outside owner '{}'",
                        foreign, owner
                    )));
                }
                // Blob deletes are best effort; the rows go regardless.
                for key in &keys {
                    if let Err(err) = gallery.shared.content.delete(key).await {
                        tracing::warn!(key = %key, error = %err, "blob delete failed; leaving orphan");
                    }
                }
                gallery.shared.records.delete_many(&owner, &ids).await
            }
            .await;
            gallery.finish_write(epoch, token);
            if let Err(err) = result {
                gallery.write_failed("delete", epoch, err).await;
            }
        });
    }

    /// Add a folder.
    ///
    /// # Errors
    /// Returns [`AppError::Validation`] for empty, reserved or duplicate names.
    pub fn create_folder(&self, name: &str) -> Result<Folder, AppError> {
        let name = validate_folder_name(name)?;
        let (owner, epoch, folder, token) = {
            let mut state = self.state();
            let owner = state.owner.clone().ok_or_else(no_owner)?;
            if state.folders.iter().any(|folder| folder.name == name) {
                return Err(AppError::Validation(format!(
                    "Folder '{}' already exists",
                    name
                )));
            }
            let folder = Folder::new(owner.clone(), name.clone());
            let position = state.folders.partition_point(|existing| existing.name < name);
            state.folders.insert(position, folder.clone());
            let token = state.writes.begin(PendingWrite::CreateFolder(folder.clone()));
            (owner, state.epoch, folder, token)
        };

        let gallery = self.clone();
        self.shared.tasks.spawn(async move {
            let result = gallery.shared.records.create_folder(&owner, &name).await;
            gallery.finish_write(epoch, token);
            if let Err(err) = result {
                gallery.write_failed("create folder", epoch, err).await;
            }
        });
        Ok(folder)
    }

    /// Remove a folder, first moving its items back to the main gallery.
    ///
    /// # Returns
    /// Ids of the items that were relabeled.
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] when the folder is not listed.
    pub fn delete_folder(&self, name: &str) -> Result<Vec<String>, AppError> {
        let (owner, epoch, reassigned, token) = {
            let mut state = self.state();
            let owner = state.owner.clone().ok_or_else(no_owner)?;
            if !state.folders.iter().any(|folder| folder.name == name) {
                return Err(AppError::NotFound(format!("folder '{}'", name)));
            }

            // Step 1: relabel the folder's items as unfiled.
            let mut reassigned = Vec::new();
            for item in state.items.iter_mut().filter(|item| item.folder == name) {
                item.folder.clear();
                reassigned.push(item.id.clone());
            }
            // Step 2: drop the folder.
            state.folders.retain(|folder| folder.name != name);
            if state.active_folder.label() == name {
                state.active_folder = FolderFilter::Main;
            }
            let token = state
                .writes
                .begin(PendingWrite::DeleteFolder(name.to_string()));
            (owner, state.epoch, reassigned, token)
        };

        let gallery = self.clone();
        let name = name.to_string();
        self.shared.tasks.spawn(async move {
            let result = gallery.shared.records.delete_folder(&owner, &name).await;
            gallery.finish_write(epoch, token);
            if let Err(err) = result {
                gallery.write_failed("delete folder", epoch, err).await;
            }
        });
        Ok(reassigned)
    }

    /// Export the gallery, or only the selection when `selection_only` is set.
    ///
    /// A scoped export clears the selection afterwards.
    pub async fn export_archive(&self, selection_only: bool) -> Result<Vec<u8>, AppError> {
        let (items, selection) = {
            let state = self.state();
            let selection = selection_only.then(|| state.selection.clone());
            (state.items.clone(), selection)
        };

        match archive::export_archive(&items, &self.shared.content, selection.as_ref()).await {
            Ok(bytes) => {
                if selection_only {
                    self.clear_selection();
                }
                Ok(bytes)
            }
            Err(err) => {
                tracing::error!(error = %err, "export failed");
                self.emit(GalleryEvent::Status(format!("Export failed: {}", err)));
                Err(err)
            }
        }
    }

    /// Import an archive for the signed-in owner.
    ///
    /// Entries already present (same name and notes) are skipped. Folder
    /// labels brought in by the archive are added to the folder list, and the
    /// collection is reloaded afterwards.
    ///
    /// # Errors
    /// Returns the container-level failure, after emitting an
    /// `Import failed: <reason>` status.
    pub async fn import_archive<F>(&self, bytes: Vec<u8>, on_progress: F) -> Result<ImportReport, AppError>
    where
        F: FnMut(Progress) + Send,
    {
        let (owner, _) = self.current_owner()?;
        let report = match self.import_for(&owner, bytes, on_progress).await {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(owner = %owner, error = %err, "import failed");
                self.emit(GalleryEvent::Status(format!("Import failed: {}", err)));
                return Err(err);
            }
        };

        let known: HashSet<String> = self
            .state()
            .folders
            .iter()
            .map(|folder| folder.name.clone())
            .collect();
        for label in report.folders.iter().filter(|label| !known.contains(*label)) {
            if validate_folder_name(label).is_err() {
                continue;
            }
            match self.shared.records.create_folder(&owner, label).await {
                Ok(_) | Err(AppError::Validation(_)) => {}
                Err(err) => {
                    tracing::warn!(folder = %label, error = %err, "failed to add imported folder");
                }
            }
        }

        if let Err(err) = self.refresh().await {
            tracing::warn!(error = %err, "post-import refresh failed");
        }
        self.emit(GalleryEvent::Status(format!(
            "Imported {} photos ({} duplicates skipped)",
            report.imported, report.skipped_duplicates
        )));
        Ok(report)
    }

    async fn import_for<F>(&self, owner: &OwnerId, bytes: Vec<u8>, on_progress: F) -> Result<ImportReport, AppError>
    where
        F: FnMut(Progress) + Send,
    {
        let existing: HashSet<Fingerprint> = self
            .shared
            .records
            .list_items(owner)
            .await?
            .iter()
            .map(Item::fingerprint)
            .collect();
        archive::import_archive(
            bytes,
            owner,
            &self.shared.content,
            self.shared.records.as_ref(),
            &existing,
            on_progress,
        )
        .await
    }

    /// Wait until every background write (and any reconcile it triggers) is done.
    ///
    /// Pending notes writes are included, so this also waits out their quiet period.
    pub async fn settle(&self) {
        self.shared.tasks.settle().await;
    }

    /// Cancel pending notes writes, wait for in-flight writes and release render URLs.
    pub async fn close(&self) {
        let pending = self.shared.notes.pending_keys();
        if !pending.is_empty() {
            tracing::debug!(pending = pending.len(), "dropping unsaved notes edits on close");
        }
        self.shared.notes.cancel_all();
        self.shared.tasks.settle().await;
        self.shared.content.close().await;
    }
}
