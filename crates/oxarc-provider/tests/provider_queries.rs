//! Query-surface tests for the provider facade.

use std::sync::{Arc, Mutex};

use oxarc_core::testing::{MemoryArchive, ScriptedOpener};
use oxarc_core::{ArchiveRegistry, HandleStatus, RegistryError};
use oxarc_provider::{ArchivesProvider, ChangeNotifier, ProviderError};

const ROOT_ID: &str = "file:///data/sample.zip::r::/";
const README_ID: &str = "file:///data/sample.zip::r::/docs/readme.txt";

fn sample_archive() -> Arc<MemoryArchive> {
    MemoryArchive::builder()
        .file_with_type("/docs/readme.txt", b"hello", "text/plain")
        .file("/top.bin", &[1, 2, 3])
        .build()
}

async fn ready_provider() -> ArchivesProvider {
    let opener = ScriptedOpener::with_archive(sample_archive());
    let provider = ArchivesProvider::new(ArchiveRegistry::new(opener));
    provider.acquire_archive(ROOT_ID).unwrap();
    let handle = provider.registry().lookup(ROOT_ID).unwrap();
    assert_eq!(handle.wait_until_settled().await, HandleStatus::Opened);
    provider
}

#[tokio::test]
async fn listing_is_loading_while_container_opens() {
    let opener = ScriptedOpener::new();
    opener.hold();
    let provider = ArchivesProvider::new(ArchiveRegistry::new(opener.clone()));
    provider.acquire_archive(ROOT_ID).unwrap();

    let listing = provider.query_children(ROOT_ID).unwrap();
    assert!(listing.loading);
    assert!(listing.documents.is_empty());
    assert!(listing.error.is_none());
    assert_eq!(listing.notification_id, ROOT_ID);

    opener.release();
    provider.release_archive(ROOT_ID).unwrap();
}

#[tokio::test]
async fn listing_carries_failure_text() {
    let opener = ScriptedOpener::failing("bad magic");
    let provider = ArchivesProvider::new(ArchiveRegistry::new(opener));
    provider.acquire_archive(ROOT_ID).unwrap();
    provider
        .registry()
        .lookup(ROOT_ID)
        .unwrap()
        .wait_until_settled()
        .await;

    let listing = provider.query_children(ROOT_ID).unwrap();
    assert!(!listing.loading);
    assert!(listing.documents.is_empty());
    assert!(listing.error.as_ref().unwrap().contains("bad magic"));
    assert_eq!(listing.notification_id, ROOT_ID);
}

#[tokio::test]
async fn ready_listing_encodes_child_ids() {
    let provider = ready_provider().await;

    let listing = provider.query_children(ROOT_ID).unwrap();
    assert!(!listing.loading);
    let ids: Vec<_> = listing
        .documents
        .iter()
        .map(|row| row.document_id.as_str())
        .collect();
    assert_eq!(
        ids,
        [
            "file:///data/sample.zip::r::/docs",
            "file:///data/sample.zip::r::/top.bin"
        ]
    );

    let docs = provider
        .query_children("file:///data/sample.zip::r::/docs")
        .unwrap();
    assert_eq!(docs.documents.len(), 1);
    assert_eq!(docs.documents[0].display_name, "readme.txt");
    assert_eq!(docs.documents[0].mime_type, "text/plain");
}

#[tokio::test]
async fn queries_require_prior_acquire() {
    let provider = ArchivesProvider::new(ArchiveRegistry::new(ScriptedOpener::new()));
    let err = provider.query_children(ROOT_ID).unwrap_err();
    assert!(matches!(
        err,
        ProviderError::Registry(RegistryError::NotAcquired { .. })
    ));
}

#[tokio::test]
async fn root_row_is_synthesized_without_acquire() {
    let provider = ArchivesProvider::new(ArchiveRegistry::new(ScriptedOpener::new()));
    let row = provider.query_document(ROOT_ID).unwrap();
    assert_eq!(row.display_name, "sample.zip");
    assert_eq!(row.mime_type, "inode/directory");
    assert_eq!(row.size, 0);
    assert_eq!(row.document_id, ROOT_ID);
}

#[tokio::test]
async fn query_document_delegates_for_entries() {
    let provider = ready_provider().await;
    let row = provider.query_document(README_ID).unwrap();
    assert_eq!(row.display_name, "readme.txt");
    assert_eq!(row.mime_type, "text/plain");
    assert_eq!(row.size, 5);
}

#[tokio::test]
async fn document_type_special_cases_root() {
    let provider = ready_provider().await;
    assert_eq!(provider.document_type(ROOT_ID).unwrap(), "inode/directory");
    assert_eq!(provider.document_type(README_ID).unwrap(), "text/plain");
}

#[tokio::test]
async fn read_document_returns_contents() {
    let provider = ready_provider().await;
    let content = provider.read_document(README_ID).unwrap();
    assert_eq!(&content[..], b"hello");
}

#[tokio::test]
async fn archive_status_reports_lifecycle() {
    let opener = ScriptedOpener::new();
    opener.hold();
    let provider = ArchivesProvider::new(ArchiveRegistry::new(opener.clone()));

    provider.acquire_archive(ROOT_ID).unwrap();
    assert_eq!(
        provider.archive_status(ROOT_ID).unwrap(),
        HandleStatus::Opening
    );

    opener.release();
    provider
        .registry()
        .lookup(ROOT_ID)
        .unwrap()
        .wait_until_settled()
        .await;
    assert_eq!(
        provider.archive_status(ROOT_ID).unwrap(),
        HandleStatus::Opened
    );

    provider.release_archive(ROOT_ID).unwrap();
    assert!(provider.archive_status(ROOT_ID).is_err());
}

#[tokio::test]
async fn is_child_document_checks_key_and_path() {
    let provider = ArchivesProvider::new(ArchiveRegistry::new(ScriptedOpener::new()));
    assert!(provider.is_child_document(ROOT_ID, README_ID).unwrap());
    assert!(!provider.is_child_document(README_ID, ROOT_ID).unwrap());
    // A different access mode addresses a different container.
    assert!(
        !provider
            .is_child_document("file:///data/sample.zip::rw::/", README_ID)
            .unwrap()
    );
}

struct RecordingNotifier {
    ids: Mutex<Vec<String>>,
}

impl ChangeNotifier for RecordingNotifier {
    fn notify_change(&self, document_id: &str) {
        self.ids.lock().unwrap().push(document_id.to_owned());
    }
}

#[tokio::test]
async fn status_changes_notify_by_root_id() {
    let provider = ArchivesProvider::new(ArchiveRegistry::new(ScriptedOpener::new()));
    let notifier = Arc::new(RecordingNotifier {
        ids: Mutex::new(Vec::new()),
    });
    let subscription = provider.subscribe_notifications(notifier.clone());

    // Acquired by an inner entry id; notifications still key by the root.
    provider.acquire_archive(README_ID).unwrap();
    let handle = provider.registry().lookup(README_ID).unwrap();
    assert_eq!(handle.wait_until_settled().await, HandleStatus::Opened);

    {
        let ids = notifier.ids.lock().unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.iter().all(|id| id == ROOT_ID));
    }

    assert!(provider.unsubscribe_notifications(subscription));
    provider.release_archive(README_ID).unwrap();
}
