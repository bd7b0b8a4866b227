use std::path::PathBuf;
use std::sync::OnceLock;

use camino::Utf8Path;
use tracing::info;

use crate::archive::ArchiveClient;
use crate::collection::DatasetCollection;
use crate::config::Config;
use crate::dataset::DatasetReader;
use crate::error::CollidbError;
use crate::manifest::{Manifest, ReactionIndex};
use crate::query::Query;

/// Everything known about one retrieved archive. Each pipeline stage
/// hands its product on explicitly; nothing hides in session state.
#[derive(Debug)]
pub struct FetchedArchive {
    /// URL the archive was resolved to, if it was fetched this session.
    pub archive_url: Option<String>,
    pub dataset_dir: PathBuf,
    pub manifest: Manifest,
    pub index: ReactionIndex,
}

/// Drives the pipeline: query -> archive URL -> local archive ->
/// dataset directory -> manifest -> reaction index -> loaded datasets.
pub struct App<A: ArchiveClient> {
    archive: A,
    config: Config,
    data_dir: OnceLock<camino::Utf8PathBuf>,
}

impl<A: ArchiveClient> App<A> {
    pub fn new(archive: A, config: Config) -> Self {
        Self {
            archive,
            config,
            data_dir: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The session's data directory, resolved on first use so a
    /// temporary directory is only created when something is downloaded
    /// or opened.
    fn data_dir(&self) -> Result<&Utf8Path, CollidbError> {
        if let Some(dir) = self.data_dir.get() {
            return Ok(dir);
        }
        let dir = self.config.resolve_data_dir()?;
        Ok(self.data_dir.get_or_init(|| dir))
    }

    /// Resolves a query to the URL of its dataset archive. No data is
    /// downloaded.
    pub fn query(&self, query: Query) -> Result<String, CollidbError> {
        let payload = query.build()?;
        self.archive.submit(&payload)
    }

    /// Runs a query, downloads and unpacks its archive, and indexes the
    /// manifest.
    pub fn fetch(&self, query: Query) -> Result<FetchedArchive, CollidbError> {
        let archive_url = self.query(query)?;
        let data_dir = self.data_dir()?;
        let archive_path = self
            .archive
            .fetch_archive(&archive_url, data_dir.as_std_path())?;
        let dataset_dir = self.archive.extract(&archive_path)?;
        let mut fetched = Self::index_dataset_dir(dataset_dir)?;
        fetched.archive_url = Some(archive_url);
        Ok(fetched)
    }

    /// Re-opens a previously extracted archive by its directory name
    /// under the configured data dir.
    pub fn open(&self, archive_uuid: &str) -> Result<FetchedArchive, CollidbError> {
        let data_dir = self.data_dir()?;
        Self::index_dataset_dir(data_dir.as_std_path().join(archive_uuid))
    }

    /// Loads every record the manifest names, in manifest order.
    pub fn load_datasets<R: DatasetReader>(
        &self,
        fetched: &FetchedArchive,
        reader: &R,
    ) -> Result<DatasetCollection<R::Dataset>, CollidbError> {
        DatasetCollection::load(reader, &fetched.dataset_dir, fetched.index.all_pks())
    }

    /// The whole pipeline in one call.
    pub fn fetch_datasets<R: DatasetReader>(
        &self,
        query: Query,
        reader: &R,
    ) -> Result<(FetchedArchive, DatasetCollection<R::Dataset>), CollidbError> {
        let fetched = self.fetch(query)?;
        let collection = self.load_datasets(&fetched, reader)?;
        Ok((fetched, collection))
    }

    fn index_dataset_dir(dataset_dir: PathBuf) -> Result<FetchedArchive, CollidbError> {
        let manifest = Manifest::from_path(&dataset_dir.join("manifest.json"))?;
        let index = ReactionIndex::from_manifest(&manifest)?;
        info!(
            records = index.all_pks().len(),
            reactions = index.len(),
            "archive indexed"
        );
        Ok(FetchedArchive {
            archive_url: None,
            dataset_dir,
            manifest,
            index,
        })
    }
}
