use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::CollidbError;

/// Metadata file at the root of every downloaded archive, mapping record
/// qualifiers (e.g. "D1024") to the reaction text of the record.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(rename = "ndatasets")]
    pub record_count: u64,
    #[serde(rename = "datasets")]
    pub records: Map<String, Value>,
}

impl Manifest {
    pub fn from_path(path: &Path) -> Result<Self, CollidbError> {
        debug!(path = %path.display(), "reading archive manifest");
        let content = fs::read_to_string(path).map_err(|err| {
            CollidbError::Filesystem(format!("read manifest {}: {err}", path.display()))
        })?;
        let manifest: Manifest = serde_json::from_str(&content)
            .map_err(|err| CollidbError::ManifestFormat(err.to_string()))?;
        debug!(record_count = manifest.record_count, "manifest loaded");
        Ok(manifest)
    }
}

/// Extracts the integer primary key from a record qualifier by stripping
/// its single-character type prefix. The qualifier encoding is brittle;
/// every caller goes through this one function.
pub fn parse_qualifier(qualifier: &str) -> Result<i64, CollidbError> {
    let digits = qualifier
        .get(1..)
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| {
            CollidbError::ManifestFormat(format!("record qualifier too short: {qualifier:?}"))
        })?;
    digits.parse().map_err(|_| {
        CollidbError::ManifestFormat(format!(
            "record qualifier {qualifier:?} does not encode an integer pk"
        ))
    })
}

/// Inverted index from reaction text to the primary keys of its records.
/// Bucket order and the flat pk list both follow manifest order, which
/// defines the default display order downstream.
#[derive(Debug, Clone, Default)]
pub struct ReactionIndex {
    reactions: Vec<String>,
    buckets: HashMap<String, Vec<i64>>,
    all_pks: Vec<i64>,
}

impl ReactionIndex {
    pub fn from_manifest(manifest: &Manifest) -> Result<Self, CollidbError> {
        let mut index = ReactionIndex::default();
        for (qualifier, reaction) in &manifest.records {
            let reaction = reaction.as_str().ok_or_else(|| {
                CollidbError::ManifestFormat(format!(
                    "reaction text for {qualifier} is not a string"
                ))
            })?;
            let pk = parse_qualifier(qualifier)?;
            index.all_pks.push(pk);
            match index.buckets.entry(reaction.to_string()) {
                Entry::Occupied(bucket) => bucket.into_mut().push(pk),
                Entry::Vacant(slot) => {
                    index.reactions.push(reaction.to_string());
                    slot.insert(vec![pk]);
                }
            }
        }
        Ok(index)
    }

    /// Primary keys of every record with this exact reaction text.
    pub fn pks_for(&self, reaction: &str) -> &[i64] {
        self.buckets.get(reaction).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All primary keys in manifest order.
    pub fn all_pks(&self) -> &[i64] {
        &self.all_pks
    }

    /// Distinct reactions paired with their pk buckets, in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[i64])> {
        self.reactions
            .iter()
            .map(|reaction| (reaction.as_str(), self.pks_for(reaction)))
    }

    pub fn len(&self) -> usize {
        self.reactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }
}
