//! Search → fetch → merge → save.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use drivemerge_common::{Error, Result};
use drivemerge_document::{merge, page_count, Exporter};
use drivemerge_drive::DriveClient;

use crate::state::{ItemState, ItemStatus};

/// Configuration for the acquisition pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of items searched or downloaded at once.
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// Outcome of a complete run.
#[derive(Debug)]
pub struct RunReport {
    /// Every requested item in request order, with its final state.
    pub items: Vec<ItemStatus>,
    /// Where the merged document was saved.
    pub output: PathBuf,
    /// Pages in the merged document.
    pub pages: usize,
}

/// Drives requested items through the Drive client, the merger and an exporter.
pub struct Pipeline {
    client: Arc<DriveClient>,
    exporter: Arc<dyn Exporter>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline.
    pub fn new(
        client: Arc<DriveClient>,
        exporter: Arc<dyn Exporter>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            client,
            exporter,
            config,
        }
    }

    /// Create one pending item per non-blank name, numbered from 1 in order.
    pub fn enqueue<I, S>(names: I) -> Vec<ItemStatus>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter_map(|name| {
                let name = name.as_ref().trim();
                (!name.is_empty()).then(|| name.to_string())
            })
            .zip(1..)
            .map(|(name, id)| ItemStatus::new(id, name))
            .collect()
    }

    /// Search for and download every pending item.
    ///
    /// Items run concurrently up to the configured limit. A failing item
    /// ends in `error` with the failure as its message and never stops the
    /// others.
    pub async fn acquire(&self, items: &mut [ItemStatus]) {
        let limit = self.config.concurrency.max(1);

        stream::iter(
            items
                .iter_mut()
                .filter(|item| item.state() == ItemState::Pending),
        )
        .for_each_concurrent(limit, |item| self.acquire_item(item))
        .await;
    }

    async fn acquire_item(&self, item: &mut ItemStatus) {
        if let Err(e) = self.try_acquire(item).await {
            warn!("'{}' failed: {}", item.name, e);
            if let Err(transition) = item.mark_error(e.to_string()) {
                warn!("{}", transition);
            }
        }
    }

    async fn try_acquire(&self, item: &mut ItemStatus) -> Result<()> {
        item.begin_search()?;

        let Some(record) = self.client.search(&item.name).await? else {
            info!("No match for '{}'", item.name);
            return item.mark_not_found();
        };

        info!("Found '{}' as {} ({})", item.name, record.name, record.id);
        item.mark_found(record.id.clone())?;
        item.begin_download()?;

        let data = self.client.download(&record.id).await?;
        info!("Downloaded '{}' ({} bytes)", record.name, data.len());
        item.mark_downloaded(data)
    }

    /// Merge the content of every downloaded item, in item order.
    ///
    /// The content is moved out of the items only once the merge succeeds;
    /// after a failure every item still holds its download.
    ///
    /// # Errors
    /// - `NotFound` if no item holds downloaded content
    /// - `Parse` if any downloaded file is not a valid PDF
    pub fn merge_downloaded(items: &mut [ItemStatus]) -> Result<Vec<u8>> {
        let buffers: Vec<&[u8]> = items.iter().filter_map(ItemStatus::data).collect();

        if buffers.is_empty() {
            return Err(Error::NotFound(
                "No documents were downloaded".to_string(),
            ));
        }

        info!("Merging {} documents", buffers.len());
        let merged = merge(buffers)?;

        for item in items.iter_mut() {
            item.take_data();
        }
        Ok(merged)
    }

    /// Save a finished document through the configured exporter.
    pub async fn save(&self, document: &[u8], filename: &str) -> Result<PathBuf> {
        self.exporter.save(document, filename).await
    }

    /// Enqueue, acquire, merge and save in one go.
    ///
    /// # Errors
    /// - `InvalidInput` if no usable name was given
    /// - Any merge or save error; individual item failures are only
    ///   reflected in the item states
    pub async fn run<I, S>(&self, names: I, filename: &str) -> Result<RunReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut items = Self::enqueue(names);
        if items.is_empty() {
            return Err(Error::InvalidInput("No document names given".to_string()));
        }

        self.acquire(&mut items).await;
        let merged = Self::merge_downloaded(&mut items)?;
        let pages = page_count(&merged)?;
        let output = self.save(&merged, filename).await?;

        Ok(RunReport {
            items,
            output,
            pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivemerge_common::{Credential, RemoteFileRecord, PDF_MIME_TYPE};
    use drivemerge_document::LocalExporter;
    use drivemerge_drive::{CredentialStore, MockTransport};
    use lopdf::{dictionary, Document, Object};
    use tempfile::TempDir;

    /// A PDF with one page per entry, each page identified by its width.
    fn sample_pdf(widths: &[i64]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = widths
            .iter()
            .map(|&width| {
                let media_box = vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(width),
                    Object::Integer(792),
                ];
                Object::Reference(doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => media_box,
                }))
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => widths.len() as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    fn page_widths(buffer: &[u8]) -> Vec<i64> {
        let doc = Document::load_mem(buffer).unwrap();
        doc.get_pages()
            .values()
            .map(|&id| {
                let page = doc.get_dictionary(id).unwrap();
                page.get(b"MediaBox").unwrap().as_array().unwrap()[2]
                    .as_i64()
                    .unwrap()
            })
            .collect()
    }

    fn record(id: &str, name: &str) -> RemoteFileRecord {
        RemoteFileRecord {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: PDF_MIME_TYPE.to_string(),
        }
    }

    fn pipeline(transport: Arc<MockTransport>, signed_in: bool, out: &TempDir) -> Pipeline {
        let store = Arc::new(CredentialStore::new());
        if signed_in {
            store.set(Credential::new("token").unwrap());
        }
        let client = Arc::new(DriveClient::new(transport, store));
        let exporter = Arc::new(LocalExporter::new(out.path()));
        Pipeline::new(client, exporter, PipelineConfig::default())
    }

    #[test]
    fn test_enqueue_skips_blank_names() {
        let items = Pipeline::enqueue(["Amazing Grace", "  ", "", " Be Thou My Vision "]);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, 1);
        assert_eq!(items[1].id, 2);
        assert_eq!(items[1].name, "Be Thou My Vision");
        assert!(items.iter().all(|i| i.state() == ItemState::Pending));
    }

    #[tokio::test]
    async fn test_single_item_scenario() {
        let original = sample_pdf(&[100, 200]);
        let transport = Arc::new(
            MockTransport::new()
                .with_search("Amazing Grace", vec![record("abc", "Amazing Grace.pdf")])
                .with_file("abc", original.clone()),
        );
        let out = TempDir::new().unwrap();
        let pipeline = pipeline(transport.clone(), true, &out);

        let report = pipeline.run(["Amazing Grace"], "setlist").await.unwrap();

        assert_eq!(report.items[0].state(), ItemState::Downloaded);
        assert_eq!(report.items[0].file_id.as_deref(), Some("abc"));
        assert_eq!(report.pages, page_count(&original).unwrap());
        assert_eq!(report.output, out.path().join("setlist.pdf"));
        let saved = std::fs::read(&report.output).unwrap();
        assert_eq!(page_widths(&saved), vec![100, 200]);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_item_failures_are_isolated() {
        let transport = Arc::new(
            MockTransport::new()
                .with_search("Good", vec![record("g", "Good.pdf")])
                .with_file("g", sample_pdf(&[1]))
                .with_search_failure("Broken", 500, "Internal Server Error")
                .with_search("Gone", vec![record("x", "Gone.pdf")])
                .with_file_failure("x", 404, "Not Found"),
        );
        let out = TempDir::new().unwrap();
        let pipeline = pipeline(transport, true, &out);

        let mut items = Pipeline::enqueue(["Broken", "Missing", "Good", "Gone"]);
        pipeline.acquire(&mut items).await;

        assert_eq!(items[0].state(), ItemState::Error);
        assert!(items[0]
            .message
            .as_deref()
            .unwrap()
            .contains("Internal Server Error"));
        assert_eq!(items[1].state(), ItemState::NotFound);
        assert_eq!(items[2].state(), ItemState::Downloaded);
        assert_eq!(items[3].state(), ItemState::Error);
        assert_eq!(items[3].file_id.as_deref(), Some("x"));

        let merged = Pipeline::merge_downloaded(&mut items).unwrap();
        assert_eq!(page_widths(&merged), vec![1]);
    }

    #[tokio::test]
    async fn test_merge_follows_request_order() {
        let transport = Arc::new(
            MockTransport::new()
                .with_search("First", vec![record("1", "First.pdf")])
                .with_search("Second", vec![record("2", "Second.pdf")])
                .with_search("Third", vec![record("3", "Third.pdf")])
                .with_file("1", sample_pdf(&[11, 12]))
                .with_file("2", sample_pdf(&[21]))
                .with_file("3", sample_pdf(&[31, 32])),
        );
        let out = TempDir::new().unwrap();
        let pipeline = pipeline(transport, true, &out);

        let report = pipeline
            .run(["Third", "First", "Second"], "ordered.pdf")
            .await
            .unwrap();

        let saved = std::fs::read(report.output).unwrap();
        assert_eq!(page_widths(&saved), vec![31, 32, 11, 12, 21]);
        assert_eq!(report.pages, 5);
    }

    #[tokio::test]
    async fn test_unauthenticated_run_fails_every_item_without_network() {
        let transport = Arc::new(MockTransport::new());
        let out = TempDir::new().unwrap();
        let pipeline = pipeline(transport.clone(), false, &out);

        let mut items = Pipeline::enqueue(["a", "b"]);
        pipeline.acquire(&mut items).await;

        for item in &items {
            assert_eq!(item.state(), ItemState::Error);
            assert!(item.message.as_deref().unwrap().contains("Authentication"));
        }
        assert_eq!(transport.calls(), 0);
        assert!(matches!(
            Pipeline::merge_downloaded(&mut items),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_download_aborts_merge() {
        let transport = Arc::new(
            MockTransport::new()
                .with_search("Good", vec![record("g", "Good.pdf")])
                .with_file("g", sample_pdf(&[1]))
                .with_search("Bad", vec![record("b", "Bad.pdf")])
                .with_file("b", b"<html>quota exceeded</html>".to_vec()),
        );
        let out = TempDir::new().unwrap();
        let pipeline = pipeline(transport, true, &out);

        let result = pipeline.run(["Good", "Bad"], "merged").await;

        assert!(matches!(result, Err(Error::Parse(_))));
        assert!(!out.path().join("merged.pdf").exists());
    }

    #[tokio::test]
    async fn test_failed_merge_keeps_downloads() {
        let transport = Arc::new(
            MockTransport::new()
                .with_search("Good", vec![record("g", "Good.pdf")])
                .with_file("g", sample_pdf(&[1]))
                .with_search("Bad", vec![record("b", "Bad.pdf")])
                .with_file("b", b"<html>quota exceeded</html>".to_vec()),
        );
        let out = TempDir::new().unwrap();
        let pipeline = pipeline(transport, true, &out);

        let mut items = Pipeline::enqueue(["Good", "Bad"]);
        pipeline.acquire(&mut items).await;

        assert!(matches!(
            Pipeline::merge_downloaded(&mut items),
            Err(Error::Parse(_))
        ));
        assert!(items.iter().all(|item| item.data_len().is_some()));
        assert!(matches!(
            Pipeline::merge_downloaded(&mut items),
            Err(Error::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_successful_merge_releases_downloads() {
        let transport = Arc::new(
            MockTransport::new()
                .with_search("Good", vec![record("g", "Good.pdf")])
                .with_file("g", sample_pdf(&[1])),
        );
        let out = TempDir::new().unwrap();
        let pipeline = pipeline(transport, true, &out);

        let mut items = Pipeline::enqueue(["Good"]);
        pipeline.acquire(&mut items).await;
        Pipeline::merge_downloaded(&mut items).unwrap();

        assert!(items[0].data_len().is_none());
        assert_eq!(items[0].state(), ItemState::Downloaded);
    }

    #[tokio::test]
    async fn test_run_without_names_is_rejected() {
        let transport = Arc::new(MockTransport::new());
        let out = TempDir::new().unwrap();
        let pipeline = pipeline(transport, true, &out);

        let result = pipeline.run(Vec::<String>::new(), "merged").await;

        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_acquire_skips_items_already_processed() {
        let transport = Arc::new(MockTransport::new());
        let out = TempDir::new().unwrap();
        let pipeline = pipeline(transport.clone(), true, &out);

        let mut items = Pipeline::enqueue(["a"]);
        items[0].begin_search().unwrap();
        items[0].mark_not_found().unwrap();
        pipeline.acquire(&mut items).await;

        assert_eq!(transport.calls(), 0);
    }
}
