use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;

use collidb::app::App;
use collidb::archive::ArchiveClient;
use collidb::config::Config;
use collidb::error::CollidbError;
use collidb::query::{Query, QueryPayload, QueryValue};

const MANIFEST: &str =
    r#"{"ndatasets": 3, "datasets": {"D1": "A + B -> C", "D2": "A + B -> C", "D7": "X -> Y"}}"#;

#[derive(Clone, Default)]
struct MockArchive {
    submitted: Arc<Mutex<Vec<QueryPayload>>>,
}

impl ArchiveClient for MockArchive {
    fn submit(&self, payload: &QueryPayload) -> Result<String, CollidbError> {
        self.submitted.lock().unwrap().push(payload.clone());
        Ok("https://example.org/archives/abc123.zip".to_string())
    }

    fn fetch_archive(&self, archive_url: &str, data_dir: &Path) -> Result<PathBuf, CollidbError> {
        let name = archive_url.rsplit('/').next().unwrap();
        let path = data_dir.join(name);
        fs::write(&path, b"zip bytes").map_err(|err| CollidbError::Filesystem(err.to_string()))?;
        Ok(path)
    }

    fn extract(&self, archive_path: &Path) -> Result<PathBuf, CollidbError> {
        let dataset_dir = archive_path.with_file_name("abc123");
        fs::create_dir_all(&dataset_dir)
            .map_err(|err| CollidbError::Filesystem(err.to_string()))?;
        fs::write(dataset_dir.join("manifest.json"), MANIFEST)
            .map_err(|err| CollidbError::Filesystem(err.to_string()))?;
        Ok(dataset_dir)
    }
}

fn app_in(temp: &tempfile::TempDir) -> (App<MockArchive>, MockArchive) {
    let archive = MockArchive::default();
    let config = Config {
        data_dir: Some(Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap()),
        ..Config::default()
    };
    (App::new(archive.clone(), config), archive)
}

#[test]
fn fetch_indexes_the_extracted_manifest() {
    let temp = tempfile::tempdir().unwrap();
    let (app, _) = app_in(&temp);

    let fetched = app.fetch(Query::new().with("pk", 7)).unwrap();

    assert_eq!(
        fetched.archive_url.as_deref(),
        Some("https://example.org/archives/abc123.zip")
    );
    assert_eq!(fetched.manifest.record_count, 3);
    assert_eq!(fetched.index.all_pks(), [1, 2, 7]);
    assert_eq!(fetched.index.pks_for("A + B -> C"), [1, 2]);
    assert_eq!(fetched.index.pks_for("X -> Y"), [7]);
    assert!(fetched.dataset_dir.join("manifest.json").exists());
}

#[test]
fn query_submits_the_normalized_payload() {
    let temp = tempfile::tempdir().unwrap();
    let (app, archive) = app_in(&temp);

    app.query(Query::new().with("pk", 7).with("reactants", vec!["He"]))
        .unwrap();

    let submitted = archive.submitted.lock().unwrap();
    let payload = &submitted[0];
    assert_eq!(payload.get("pk"), None);
    assert_eq!(payload.get("pks"), Some(&QueryValue::IntList(vec![7])));
    assert_eq!(payload.get("reactants"), None);
    assert_eq!(
        payload.get("reactant1"),
        Some(&QueryValue::Text("He".to_string()))
    );
    assert_eq!(
        payload.get("reactant2"),
        Some(&QueryValue::Text(String::new()))
    );
}

#[test]
fn open_reuses_an_extracted_archive() {
    let temp = tempfile::tempdir().unwrap();
    let (app, _) = app_in(&temp);

    let dataset_dir = temp.path().join("feed1234");
    fs::create_dir_all(&dataset_dir).unwrap();
    fs::write(dataset_dir.join("manifest.json"), MANIFEST).unwrap();

    let opened = app.open("feed1234").unwrap();
    assert!(opened.archive_url.is_none());
    assert_eq!(opened.index.all_pks(), [1, 2, 7]);
}

#[test]
fn invalid_query_never_reaches_the_client() {
    let temp = tempfile::tempdir().unwrap();
    let (app, archive) = app_in(&temp);

    let err = app
        .query(Query::new().with("pk", 1).with("pks", vec![2]))
        .unwrap_err();
    assert!(matches!(err, CollidbError::Keyword(_)));
    assert!(archive.submitted.lock().unwrap().is_empty());
}
