use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::debug;

use crate::collection::DatasetCollection;
use crate::dataset::Dataset;
use crate::error::CollidbError;

/// Reference qualifier to bibliographic metadata.
pub type RefMap = BTreeMap<String, Value>;

/// Batch lookup against the references service.
pub trait RefsClient: Send + Sync {
    fn resolve(&self, qids: &BTreeSet<String>) -> Result<RefMap, CollidbError>;
}

/// Every reference qualifier cited by the loaded datasets, deduplicated.
pub fn collect_qids<D: Dataset>(collection: &DatasetCollection<D>) -> BTreeSet<String> {
    collection
        .iter()
        .flat_map(|(_, dataset)| dataset.metadata().refs.keys().cloned())
        .collect()
}

/// Resolves all references cited by the collection. An empty qualifier
/// set short-circuits to an empty map without touching the network.
pub fn resolve_refs<D: Dataset>(
    client: &dyn RefsClient,
    collection: &DatasetCollection<D>,
) -> Result<RefMap, CollidbError> {
    let qids = collect_qids(collection);
    if qids.is_empty() {
        return Ok(RefMap::new());
    }
    client.resolve(&qids)
}

#[derive(Clone)]
pub struct HttpRefsClient {
    client: Client,
    refs_api_url: String,
}

impl HttpRefsClient {
    pub fn new(db_url: &str) -> Result<Self, CollidbError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("collidb/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CollidbError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| CollidbError::Http(err.to_string()))?;
        Ok(Self {
            client,
            refs_api_url: format!("{}/refs/api/", db_url.trim_end_matches('/')),
        })
    }
}

impl RefsClient for HttpRefsClient {
    fn resolve(&self, qids: &BTreeSet<String>) -> Result<RefMap, CollidbError> {
        debug!(count = qids.len(), "resolving reference qualifiers");
        let mut request = self.client.get(&self.refs_api_url);
        for qid in qids {
            request = request.query(&[("qid", qid.as_str())]);
        }
        let response = request
            .send()
            .map_err(|err| CollidbError::Http(err.to_string()))?;
        if !response.status().is_success() {
            return Err(CollidbError::Status {
                status: response.status().as_u16(),
                reason: response
                    .status()
                    .canonical_reason()
                    .unwrap_or("unknown")
                    .to_string(),
                url: self.refs_api_url.clone(),
            });
        }
        // The service answers with a sequence of single-entry maps.
        let entries: Vec<BTreeMap<String, Value>> = response
            .json()
            .map_err(|err| CollidbError::Http(err.to_string()))?;
        Ok(entries.into_iter().flatten().collect())
    }
}
