use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use serde::Deserialize;
use tracing::debug;
use zip::ZipArchive;

use crate::error::CollidbError;
use crate::query::QueryPayload;

/// How a query payload becomes a local directory of per-record files:
/// submit resolves the payload to an archive URL, fetch_archive
/// materializes the archive, extract unpacks it next to itself.
pub trait ArchiveClient: Send + Sync {
    fn submit(&self, payload: &QueryPayload) -> Result<String, CollidbError>;

    fn fetch_archive(&self, archive_url: &str, data_dir: &Path) -> Result<PathBuf, CollidbError>;

    fn extract(&self, archive_path: &Path) -> Result<PathBuf, CollidbError>;
}

#[derive(Clone)]
pub struct HttpArchiveClient {
    client: Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    archive_url: String,
}

impl HttpArchiveClient {
    pub fn new(db_url: &str) -> Result<Self, CollidbError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("collidb/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CollidbError::Http(err.to_string()))?,
        );
        // The cookie store carries the csrftoken from the handshake GET
        // into the query POST.
        let client = Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| CollidbError::Http(err.to_string()))?;
        Ok(Self {
            client,
            api_url: format!("{}/api/", db_url.trim_end_matches('/')),
        })
    }

    fn check_status(
        response: &reqwest::blocking::Response,
        url: &str,
    ) -> Result<(), CollidbError> {
        if response.status().is_success() {
            return Ok(());
        }
        Err(CollidbError::Status {
            status: response.status().as_u16(),
            reason: response
                .status()
                .canonical_reason()
                .unwrap_or("unknown")
                .to_string(),
            url: url.to_string(),
        })
    }
}

impl ArchiveClient for HttpArchiveClient {
    fn submit(&self, payload: &QueryPayload) -> Result<String, CollidbError> {
        debug!("getting CSRF token");
        let handshake = self
            .client
            .get(&self.api_url)
            .send()
            .map_err(|err| CollidbError::Http(err.to_string()))?;
        let csrftoken = handshake
            .cookies()
            .find(|cookie| cookie.name() == "csrftoken")
            .map(|cookie| cookie.value().to_string())
            .ok_or_else(|| {
                CollidbError::Http("no csrftoken cookie in handshake response".to_string())
            })?;

        let response = self
            .client
            .post(&self.api_url)
            .header("X-CSRFToken", &csrftoken)
            .header(REFERER, &self.api_url)
            .form(&[("query", payload.to_json()?)])
            .send()
            .map_err(|err| CollidbError::Http(err.to_string()))?;
        Self::check_status(&response, &self.api_url)?;

        let body: QueryResponse = response
            .json()
            .map_err(|err| CollidbError::Http(err.to_string()))?;
        debug!(archive_url = %body.archive_url, "query accepted");
        Ok(body.archive_url)
    }

    fn fetch_archive(&self, archive_url: &str, data_dir: &Path) -> Result<PathBuf, CollidbError> {
        let archive_name = archive_url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                CollidbError::Http(format!("archive url has no file name: {archive_url}"))
            })?;
        debug!(url = archive_url, "downloading compressed dataset archive");

        let mut response = self
            .client
            .get(archive_url)
            .send()
            .map_err(|err| CollidbError::Http(err.to_string()))?;
        Self::check_status(&response, archive_url)?;

        fs::create_dir_all(data_dir).map_err(|err| CollidbError::Filesystem(err.to_string()))?;
        let archive_path = data_dir.join(archive_name);
        let mut file = fs::File::create(&archive_path)
            .map_err(|err| CollidbError::Filesystem(err.to_string()))?;
        io::copy(&mut response, &mut file)
            .map_err(|err| CollidbError::Filesystem(err.to_string()))?;
        debug!(path = %archive_path.display(), "archive written");
        Ok(archive_path)
    }

    fn extract(&self, archive_path: &Path) -> Result<PathBuf, CollidbError> {
        let stem = archive_path.file_stem().ok_or_else(|| {
            CollidbError::Filesystem(format!(
                "archive path has no file stem: {}",
                archive_path.display()
            ))
        })?;
        let dataset_dir = archive_path.with_file_name(stem);
        debug!(dir = %dataset_dir.display(), "unzipping dataset archive");
        let records = unpack_dataset_archive(archive_path, &dataset_dir)?;
        debug!(records, "dataset archive unpacked");
        Ok(dataset_dir)
    }
}

/// Unpacks a dataset archive into `dataset_dir` and returns the number
/// of per-record resources it contained. The archive must carry
/// `manifest.json` at its root; an archive without one is not a dataset
/// archive.
pub fn unpack_dataset_archive(
    zip_path: &Path,
    dataset_dir: &Path,
) -> Result<usize, CollidbError> {
    let file = fs::File::open(zip_path).map_err(|err| {
        CollidbError::Filesystem(format!("open archive {}: {err}", zip_path.display()))
    })?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| CollidbError::Filesystem(err.to_string()))?;

    let mut has_manifest = false;
    let mut records = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| CollidbError::Filesystem(err.to_string()))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(CollidbError::Filesystem(
                "archive entry path traversal detected".to_string(),
            ));
        };

        let entry_path = dataset_dir.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| CollidbError::Filesystem(err.to_string()))?;
            continue;
        }

        if relative == Path::new("manifest.json") {
            has_manifest = true;
        } else {
            records += 1;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| CollidbError::Filesystem(err.to_string()))?;
        }
        let mut outfile = fs::File::create(&entry_path)
            .map_err(|err| CollidbError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|err| CollidbError::Filesystem(err.to_string()))?;
    }

    if !has_manifest {
        return Err(CollidbError::ManifestFormat(format!(
            "archive {} has no manifest.json at its root",
            zip_path.display()
        )));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;

    use super::*;

    fn write_archive(zip_path: &Path, with_manifest: bool) {
        let file = fs::File::create(zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        if with_manifest {
            writer.start_file("manifest.json", options).unwrap();
            writer
                .write_all(br#"{"ndatasets": 2, "datasets": {"D1": "A -> B", "D2": "A -> B"}}"#)
                .unwrap();
        }
        for pk in [1, 2] {
            writer.start_file(format!("{pk}.txt"), options).unwrap();
            writer.write_all(b"record").unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn unpacks_manifest_and_counts_records() {
        let temp = tempfile::tempdir().unwrap();
        let zip_path = temp.path().join("abc123.zip");
        write_archive(&zip_path, true);

        let target = temp.path().join("abc123");
        let records = unpack_dataset_archive(&zip_path, &target).unwrap();
        assert_eq!(records, 2);
        assert!(target.join("manifest.json").exists());
        assert!(target.join("1.txt").exists());
        assert!(target.join("2.txt").exists());
    }

    #[test]
    fn rejects_archive_without_manifest() {
        let temp = tempfile::tempdir().unwrap();
        let zip_path = temp.path().join("abc123.zip");
        write_archive(&zip_path, false);

        let err = unpack_dataset_archive(&zip_path, &temp.path().join("abc123")).unwrap_err();
        assert_matches!(err, CollidbError::ManifestFormat(_));
    }
}
