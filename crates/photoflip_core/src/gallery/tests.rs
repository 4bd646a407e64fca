use super::*;
use crate::constants::{MAIN_GALLERY_TARGET_ID, TRASH_TARGET_ID};
use crate::content::MemoryBlobStore;
use crate::db::DocumentRecordStore;
use crate::models::folder::Folder;
use crate::test_support::{owner, seed_item, FlakyRecordStore};
use async_trait::async_trait;
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

struct Harness {
    gallery: Gallery,
    events: UnboundedReceiver<GalleryEvent>,
    records: Arc<FlakyRecordStore>,
    content: Arc<ContentStore>,
    blobs: Arc<MemoryBlobStore>,
    _dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        Self::with_store(Arc::new(DocumentRecordStore::in_memory()), 64).await
    }

    async fn with_store(store: Arc<dyn RecordStore>, url_capacity: usize) -> Self {
        let dir = TempDir::new().unwrap();
        let blobs = Arc::new(MemoryBlobStore::new());
        let content = Arc::new(
            ContentStore::new(blobs.clone(), dir.path().join("render"), url_capacity)
                .await
                .unwrap(),
        );
        let records = Arc::new(FlakyRecordStore::new(store));
        let (gallery, events) = Gallery::new(
            records.clone(),
            Arc::clone(&content),
            GalleryTiming::default(),
            1024,
        );
        Self {
            gallery,
            events,
            records,
            content,
            blobs,
            _dir: dir,
        }
    }

    async fn seed(&self, name: &str, notes: &str, folder: &str) -> Item {
        seed_item(
            self.records.inner().as_ref(),
            &self.content,
            &owner("alice"),
            name,
            notes,
            folder,
        )
        .await
    }

    async fn stored(&self) -> Vec<Item> {
        self.records.list_items(&owner("alice")).await.unwrap()
    }

    fn drain_events(&mut self) -> Vec<GalleryEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

fn folder_of(items: &[Item], id: &str) -> String {
    items
        .iter()
        .find(|item| item.id == id)
        .map(|item| item.folder.clone())
        .unwrap()
}

fn url_path(url: &str) -> PathBuf {
    PathBuf::from(url.strip_prefix("file://").unwrap())
}

/// Record store that stalls writes into one folder and rejects writes into another.
struct ScriptedRecordStore {
    inner: DocumentRecordStore,
    slow_folder: &'static str,
    failing_folder: &'static str,
    delay: Duration,
}

impl ScriptedRecordStore {
    fn new(slow_folder: &'static str, failing_folder: &'static str) -> Self {
        Self {
            inner: DocumentRecordStore::in_memory(),
            slow_folder,
            failing_folder,
            delay: Duration::from_millis(200),
        }
    }
}

#[async_trait]
impl RecordStore for ScriptedRecordStore {
    async fn list_items(&self, owner: &OwnerId) -> Result<Vec<Item>, AppError> {
        self.inner.list_items(owner).await
    }

    async fn upsert(&self, owner: &OwnerId, item: &Item) -> Result<(), AppError> {
        self.inner.upsert(owner, item).await
    }

    async fn update_field_many(
        &self,
        owner: &OwnerId,
        ids: &[String],
        field: &ItemField,
    ) -> Result<(), AppError> {
        match field {
            ItemField::Folder(folder) if folder == self.failing_folder => {
                return Err(AppError::Storage("write rejected".to_string()));
            }
            ItemField::Folder(folder) if folder == self.slow_folder => {
                tokio::time::sleep(self.delay).await;
            }
            _ => {}
        }
        self.inner.update_field_many(owner, ids, field).await
    }

    async fn delete_many(&self, owner: &OwnerId, ids: &[String]) -> Result<(), AppError> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete_many(owner, ids).await
    }

    async fn list_folders(&self, owner: &OwnerId) -> Result<Vec<Folder>, AppError> {
        self.inner.list_folders(owner).await
    }

    async fn create_folder(&self, owner: &OwnerId, name: &str) -> Result<Folder, AppError> {
        self.inner.create_folder(owner, name).await
    }

    async fn delete_folder(&self, owner: &OwnerId, name: &str) -> Result<Vec<String>, AppError> {
        self.inner.delete_folder(owner, name).await
    }
}

#[tokio::test]
async fn sign_in_loads_items_with_render_urls_and_sign_out_clears() {
    let h = Harness::new().await;
    let a = h.seed("a.jpg", "", "").await;
    h.records
        .inner()
        .create_folder(&owner("alice"), "Trips")
        .await
        .unwrap();

    h.gallery.set_owner(Some(owner("alice"))).await.unwrap();
    let item = h.gallery.item(&a.id).unwrap();
    assert!(item.render_url.is_some());
    assert_eq!(h.gallery.folders().len(), 1);
    assert!(h.gallery.toggle_select(&a.id));
    assert_eq!(h.content.cached_urls(), 1);

    h.gallery.set_owner(None).await.unwrap();
    assert!(h.gallery.items().is_empty());
    assert!(h.gallery.folders().is_empty());
    assert!(h.gallery.selected_ids().is_empty());
    assert_eq!(h.content.cached_urls(), 0);
    assert!(matches!(
        h.gallery.update_notes(&a.id, "x"),
        Err(AppError::Permission(_))
    ));
}

#[tokio::test]
async fn deleting_folder_returns_items_to_main_gallery() {
    let h = Harness::new().await;
    let a = h.seed("a.jpg", "", "").await;
    h.gallery.set_owner(Some(owner("alice"))).await.unwrap();

    h.gallery.create_folder("Trips").unwrap();
    let gesture = h.gallery.begin_drag(&a.id).unwrap();
    assert_eq!(
        h.gallery.end_drag(&gesture, Some("Trips")),
        DragAction::Move {
            ids: vec![a.id.clone()],
            folder: "Trips".to_string(),
        }
    );
    h.gallery.settle().await;
    assert_eq!(folder_of(&h.stored().await, &a.id), "Trips");
    assert!(h.gallery.visible_items().is_empty());

    h.gallery.set_active_folder(FolderFilter::Named("Trips".to_string()));
    let reassigned = h.gallery.delete_folder("Trips").unwrap();
    assert_eq!(reassigned, vec![a.id.clone()]);
    assert_eq!(h.gallery.active_folder(), FolderFilter::Main);
    assert_eq!(folder_of(&h.gallery.items(), &a.id), "");
    assert_eq!(h.gallery.visible_items()[0].id, a.id);

    h.gallery.settle().await;
    assert_eq!(folder_of(&h.stored().await, &a.id), "");
    assert!(h
        .records
        .list_folders(&owner("alice"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn failed_move_reconciles_with_record_store() {
    let mut h = Harness::new().await;
    let a = h.seed("a.jpg", "", "").await;
    let b = h.seed("b.jpg", "", "").await;
    h.records
        .inner()
        .create_folder(&owner("alice"), "Trips")
        .await
        .unwrap();
    h.gallery.set_owner(Some(owner("alice"))).await.unwrap();
    h.drain_events();

    h.records.set_failing(true);
    h.gallery.toggle_select(&a.id);
    h.gallery.toggle_select(&b.id);
    let gesture = h.gallery.begin_drag(&a.id).unwrap();
    h.gallery.end_drag(&gesture, Some("Trips"));

    // Optimistic state first.
    assert_eq!(folder_of(&h.gallery.items(), &a.id), "Trips");
    assert_eq!(folder_of(&h.gallery.items(), &b.id), "Trips");
    assert!(h.gallery.selected_ids().is_empty());

    h.gallery.settle().await;
    let in_memory: Vec<(String, String)> = h
        .gallery
        .items()
        .into_iter()
        .map(|item| (item.id, item.folder))
        .collect();
    let stored: Vec<(String, String)> = h
        .stored()
        .await
        .into_iter()
        .map(|item| (item.id, item.folder))
        .collect();
    assert_eq!(in_memory, stored);
    assert!(in_memory.iter().all(|(_, folder)| folder.is_empty()));

    let events = h.drain_events();
    assert!(events.iter().any(|event| matches!(
        event,
        GalleryEvent::SyncFailed { op: "move", .. }
    )));
    assert_eq!(events.last(), Some(&GalleryEvent::Reconciled));
}

#[tokio::test(start_paused = true)]
async fn rapid_notes_edits_write_once_with_latest_text() {
    let mut h = Harness::new().await;
    let a = h.seed("a.jpg", "", "").await;
    h.gallery.set_owner(Some(owner("alice"))).await.unwrap();
    h.drain_events();

    for text in ["s", "s1", "s12", "s123", "s1234"] {
        h.gallery.update_notes(&a.id, text).unwrap();
        assert_eq!(h.gallery.item(&a.id).unwrap().notes, text);
    }
    assert!(h.records.field_writes().is_empty());

    h.gallery.settle().await;
    assert_eq!(
        h.records.field_writes(),
        vec![(vec![a.id.clone()], ItemField::Notes("s1234".to_string()))]
    );
    assert_eq!(h.stored().await[0].notes, "s1234");
    assert!(h.gallery.is_saved());
    assert!(h
        .drain_events()
        .contains(&GalleryEvent::NotesSaved { id: a.id.clone() }));

    tokio::time::advance(Duration::from_secs(5)).await;
    assert!(!h.gallery.is_saved());
}

#[tokio::test(start_paused = true)]
async fn each_edit_restarts_the_quiet_period() {
    let h = Harness::new().await;
    let a = h.seed("a.jpg", "", "").await;
    h.gallery.set_owner(Some(owner("alice"))).await.unwrap();

    h.gallery.update_notes(&a.id, "first").unwrap();
    tokio::time::advance(Duration::from_millis(600)).await;
    h.gallery.update_notes(&a.id, "second").unwrap();
    tokio::time::advance(Duration::from_millis(600)).await;
    tokio::task::yield_now().await;
    assert!(h.records.field_writes().is_empty());

    h.gallery.settle().await;
    assert_eq!(h.records.field_writes().len(), 1);
    assert_eq!(h.stored().await[0].notes, "second");
}

#[tokio::test(start_paused = true)]
async fn sign_out_cancels_pending_notes_write() {
    let h = Harness::new().await;
    let a = h.seed("a.jpg", "", "").await;
    h.gallery.set_owner(Some(owner("alice"))).await.unwrap();

    h.gallery.update_notes(&a.id, "unsaved").unwrap();
    h.gallery.set_owner(None).await.unwrap();
    h.gallery.settle().await;

    assert!(h.records.field_writes().is_empty());
    assert_eq!(h.stored().await[0].notes, "");
}

#[tokio::test(start_paused = true)]
async fn refresh_keeps_notes_still_being_typed() {
    let h = Harness::new().await;
    let a = h.seed("a.jpg", "old", "").await;
    h.gallery.set_owner(Some(owner("alice"))).await.unwrap();

    h.gallery.update_notes(&a.id, "draft").unwrap();
    h.gallery.refresh().await.unwrap();
    assert_eq!(h.gallery.item(&a.id).unwrap().notes, "draft");

    h.gallery.settle().await;
    assert_eq!(h.stored().await[0].notes, "draft");
}

#[tokio::test(start_paused = true)]
async fn flush_writes_pending_notes_immediately() {
    let h = Harness::new().await;
    let a = h.seed("a.jpg", "", "").await;
    h.gallery.set_owner(Some(owner("alice"))).await.unwrap();

    h.gallery.update_notes(&a.id, "now").unwrap();
    h.gallery.flush_notes();
    h.gallery.settle().await;

    assert_eq!(h.records.field_writes().len(), 1);
    assert_eq!(h.stored().await[0].notes, "now");
}

#[tokio::test]
async fn drag_scope_follows_frozen_selection() {
    let h = Harness::new().await;
    let x = h.seed("x.jpg", "", "").await;
    let y = h.seed("y.jpg", "", "").await;
    let z = h.seed("z.jpg", "", "").await;
    let w = h.seed("w.jpg", "", "").await;
    h.gallery.set_owner(Some(owner("alice"))).await.unwrap();

    // X excluded from the selection: only X goes.
    h.gallery.toggle_select(&y.id);
    h.gallery.toggle_select(&z.id);
    let gesture = h.gallery.begin_drag(&x.id).unwrap();
    assert_eq!(
        h.gallery.end_drag(&gesture, Some(TRASH_TARGET_ID)),
        DragAction::Delete {
            ids: vec![x.id.clone()]
        }
    );
    assert!(h.gallery.is_dropping());
    h.gallery.settle().await;
    assert_eq!(h.stored().await.len(), 3);
    assert_eq!(h.blobs.len().await, 3);

    // Selection containing the dragged item: all of it goes.
    h.gallery.toggle_select(&y.id);
    h.gallery.toggle_select(&z.id);
    h.gallery.toggle_select(&w.id);
    let gesture = h.gallery.begin_drag(&w.id).unwrap();
    h.gallery.end_drag(&gesture, Some(TRASH_TARGET_ID));
    assert!(h.gallery.items().is_empty());
    assert!(h.gallery.selected_ids().is_empty());

    h.gallery.settle().await;
    assert!(h.stored().await.is_empty());
    assert!(h.blobs.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn dropping_indicator_clears_after_feedback_period() {
    let h = Harness::new().await;
    let a = h.seed("a.jpg", "", "").await;
    h.gallery.set_owner(Some(owner("alice"))).await.unwrap();

    let gesture = h.gallery.begin_drag(&a.id).unwrap();
    h.gallery.end_drag(&gesture, Some(TRASH_TARGET_ID));
    assert!(h.gallery.is_dropping());

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(!h.gallery.is_dropping());
}

#[tokio::test]
async fn drops_without_effect_skip_the_store() {
    let h = Harness::new().await;
    let a = h.seed("a.jpg", "", "").await;
    let b = h.seed("b.jpg", "", "").await;
    h.gallery.set_owner(Some(owner("alice"))).await.unwrap();
    let writes = h.records.writes();

    h.gallery.toggle_select(&a.id);
    let gesture = h.gallery.begin_drag(&a.id).unwrap();
    assert_eq!(
        h.gallery.end_drag(&gesture, Some(MAIN_GALLERY_TARGET_ID)),
        DragAction::NoOp
    );
    assert!(h.gallery.selected_ids().is_empty());

    let gesture = h.gallery.begin_drag(&a.id).unwrap();
    assert_eq!(h.gallery.end_drag(&gesture, Some(b.id.as_str())), DragAction::NoOp);
    assert_eq!(h.gallery.end_drag(&gesture, None), DragAction::NoOp);

    h.gallery.settle().await;
    assert_eq!(h.records.writes(), writes);
}

#[tokio::test]
async fn flipped_cards_cannot_be_dragged_and_flip_failures_stick() {
    let mut h = Harness::new().await;
    let a = h.seed("a.jpg", "", "").await;
    h.gallery.set_owner(Some(owner("alice"))).await.unwrap();
    h.drain_events();

    h.records.set_failing(true);
    assert!(h.gallery.toggle_flip(&a.id).unwrap());
    assert!(h.gallery.begin_drag(&a.id).is_none());

    h.gallery.settle().await;
    assert!(h.gallery.item(&a.id).unwrap().flipped);
    assert!(!h.stored().await[0].flipped);
    assert!(!h
        .drain_events()
        .iter()
        .any(|event| matches!(event, GalleryEvent::Reconciled)));

    h.records.set_failing(false);
    assert!(!h.gallery.toggle_flip(&a.id).unwrap());
    assert!(h.gallery.toggle_flip(&a.id).unwrap());
    h.gallery.settle().await;
    assert!(h.stored().await[0].flipped);
}

#[tokio::test]
async fn folder_names_are_validated_before_any_write() {
    let h = Harness::new().await;
    h.gallery.set_owner(Some(owner("alice"))).await.unwrap();
    h.gallery.create_folder("  Trips ").unwrap();
    h.gallery.settle().await;
    let writes = h.records.writes();

    for name in ["", "   ", TRASH_TARGET_ID, MAIN_GALLERY_TARGET_ID, "Trips"] {
        assert!(
            matches!(h.gallery.create_folder(name), Err(AppError::Validation(_))),
            "{name:?}"
        );
    }
    assert!(matches!(
        h.gallery.delete_folder("Nope"),
        Err(AppError::NotFound(_))
    ));
    assert_eq!(h.records.writes(), writes);
    assert_eq!(h.gallery.folders()[0].name, "Trips");
}

#[tokio::test]
async fn failed_folder_creation_reconciles() {
    let h = Harness::new().await;
    h.gallery.set_owner(Some(owner("alice"))).await.unwrap();
    h.records.set_failing(true);

    h.gallery.create_folder("Trips").unwrap();
    assert_eq!(h.gallery.folders().len(), 1);
    h.gallery.settle().await;
    assert!(h.gallery.folders().is_empty());
}

#[tokio::test]
async fn upload_lands_in_active_folder_and_skips_oversized_files() {
    let h = Harness::new().await;
    h.gallery.set_owner(Some(owner("alice"))).await.unwrap();
    h.gallery.create_folder("Trips").unwrap();
    h.gallery.set_active_folder(FolderFilter::Named("Trips".to_string()));

    let files = vec![
        UploadFile {
            name: "one.PNG".to_string(),
            bytes: vec![1; 10],
        },
        UploadFile {
            name: "huge.jpg".to_string(),
            bytes: vec![0; 4096],
        },
        UploadFile {
            name: "two.jpg".to_string(),
            bytes: vec![2; 10],
        },
    ];
    let mut seen = Vec::new();
    let progress = h
        .gallery
        .upload(files, |progress| seen.push(progress))
        .await
        .unwrap();

    assert_eq!(progress, Progress::new(3, 3));
    assert_eq!(
        seen,
        vec![Progress::new(1, 3), Progress::new(2, 3), Progress::new(3, 3)]
    );
    assert_eq!(h.gallery.upload_progress(), Progress::new(3, 3));

    let visible = h.gallery.visible_items();
    assert_eq!(visible.len(), 2);
    assert!(visible.iter().all(|item| item.folder == "Trips"));
    assert!(visible
        .iter()
        .any(|item| item.name == "one.PNG" && item.content_ref.as_str().ends_with(".png")));
    assert_eq!(h.blobs.len().await, 2);
}

#[tokio::test]
async fn failed_import_reports_status() {
    let mut h = Harness::new().await;
    h.gallery.set_owner(Some(owner("alice"))).await.unwrap();
    h.drain_events();

    let err = h
        .gallery
        .import_archive(b"garbage".to_vec(), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    let events = h.drain_events();
    assert!(matches!(
        events.as_slice(),
        [GalleryEvent::Status(message)] if message.starts_with("Import failed:")
    ));
}

#[tokio::test]
async fn scoped_export_then_import_restores_folders() {
    let h = Harness::new().await;
    let a = h.seed("a.jpg", "lake", "Trips").await;
    h.seed("b.jpg", "city", "").await;
    h.gallery.set_owner(Some(owner("alice"))).await.unwrap();

    h.gallery.toggle_select(&a.id);
    let archive = h.gallery.export_archive(true).await.unwrap();
    assert!(h.gallery.selected_ids().is_empty());

    let other = Harness::new().await;
    other.gallery.set_owner(Some(owner("alice"))).await.unwrap();
    let report = other
        .gallery
        .import_archive(archive, |_| {})
        .await
        .unwrap();

    assert_eq!(report.imported, 1);
    let items = other.gallery.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].notes, "lake");
    assert!(items[0].render_url.is_some());
    assert_eq!(other.gallery.folders()[0].name, "Trips");
}

#[tokio::test]
async fn reconcile_keeps_writes_that_are_still_in_flight() {
    let h = Harness::with_store(Arc::new(ScriptedRecordStore::new("Family", "Trips")), 64).await;
    let a = h.seed("a.jpg", "", "").await;
    let b = h.seed("b.jpg", "", "").await;
    let c = h.seed("c.jpg", "", "").await;
    for name in ["Family", "Trips"] {
        h.records
            .inner()
            .create_folder(&owner("alice"), name)
            .await
            .unwrap();
    }
    h.gallery.set_owner(Some(owner("alice"))).await.unwrap();

    let gesture = h.gallery.begin_drag(&b.id).unwrap();
    h.gallery.end_drag(&gesture, Some("Family"));
    let gesture = h.gallery.begin_drag(&c.id).unwrap();
    h.gallery.end_drag(&gesture, Some(TRASH_TARGET_ID));
    // This move fails at once and reconciles while the other two are still pending.
    let gesture = h.gallery.begin_drag(&a.id).unwrap();
    h.gallery.end_drag(&gesture, Some("Trips"));
    h.gallery.settle().await;

    let summary = |items: Vec<Item>| -> Vec<(String, String)> {
        items
            .into_iter()
            .map(|item| (item.id, item.folder))
            .collect()
    };
    let stored = h.stored().await;
    assert_eq!(summary(h.gallery.items()), summary(stored.clone()));
    assert_eq!(folder_of(&stored, &b.id), "Family");
    assert_eq!(folder_of(&stored, &a.id), "");
    assert!(h.gallery.item(&c.id).is_none());
    assert!(!h.content.exists(&c.content_ref).await.unwrap());
}

#[tokio::test]
async fn render_urls_never_outlive_their_files() {
    let h = Harness::with_store(Arc::new(DocumentRecordStore::in_memory()), 2).await;
    for name in ["a.jpg", "b.jpg", "c.jpg"] {
        h.seed(name, "", "").await;
    }
    h.gallery.set_owner(Some(owner("alice"))).await.unwrap();

    let live_urls = |gallery: &Gallery| -> usize {
        let urls: Vec<String> = gallery
            .items()
            .into_iter()
            .filter_map(|item| item.render_url)
            .collect();
        for url in &urls {
            assert!(url_path(url).exists(), "dead url {}", url);
        }
        urls.len()
    };
    assert_eq!(live_urls(&h.gallery), 2);

    let missing = h
        .gallery
        .items()
        .into_iter()
        .find(|item| item.render_url.is_none())
        .unwrap();
    let url = h.gallery.render_url(&missing.id).await.unwrap();
    assert!(url_path(&url).exists());
    assert_eq!(h.gallery.item(&missing.id).unwrap().render_url, Some(url));
    assert_eq!(live_urls(&h.gallery), 2);

    assert!(matches!(
        h.gallery.render_url("missing").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn trashing_content_outside_the_owner_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("items.json");
    let alice = owner("alice");
    let bob = owner("bob");
    let foreign_key = ContentKey::generate(&bob, "b.jpg");
    let planted = Item::new(
        alice.clone(),
        foreign_key.clone(),
        "b.jpg".to_string(),
        String::new(),
    );
    let document = serde_json::json!({ "alice": { "items": [planted], "folders": [] } });
    std::fs::write(&path, serde_json::to_vec(&document).unwrap()).unwrap();

    let store = DocumentRecordStore::open(&path).await.unwrap();
    let mut h = Harness::with_store(Arc::new(store), 64).await;
    h.content.put(&foreign_key, b"bob's photo".to_vec()).await.unwrap();
    h.gallery.set_owner(Some(alice)).await.unwrap();
    h.drain_events();

    let gesture = h.gallery.begin_drag(&planted.id).unwrap();
    h.gallery.end_drag(&gesture, Some(TRASH_TARGET_ID));
    assert!(h.gallery.item(&planted.id).is_none());
    h.gallery.settle().await;

    assert!(h.content.exists(&foreign_key).await.unwrap());
    assert_eq!(h.stored().await.len(), 1);
    assert!(h.gallery.item(&planted.id).is_some());
    let events = h.drain_events();
    assert!(events
        .iter()
        .any(|event| matches!(event, GalleryEvent::SyncFailed { op: "delete", .. })));
    assert!(events
        .iter()
        .any(|event| matches!(event, GalleryEvent::Status(message) if message.starts_with("Could not delete"))));
}
