use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use crate::dataset::{Canvas, Dataset, DatasetReader, Species};
use crate::error::CollidbError;
use crate::manifest::ReactionIndex;

/// Reference values a grouped view agrees on, taken from its first member.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMetadata {
    pub data_type: String,
    pub frame: String,
    pub columns: Value,
}

/// Distinct reaction partners across all loaded datasets, plus the
/// internal-state tuples observed per formula on each side.
#[derive(Debug, Default)]
pub struct DistinctSpecies {
    pub reactants: HashSet<Species>,
    pub products: HashSet<Species>,
    pub reactant_states: HashMap<String, HashSet<Vec<String>>>,
    pub product_states: HashMap<String, HashSet<Vec<String>>>,
}

/// Owns the dataset handles of one retrieved archive, keyed by primary
/// key. Load order is kept for deterministic iteration and error
/// reporting; grouped operations go through a strict consistency gate.
#[derive(Debug)]
pub struct DatasetCollection<D: Dataset> {
    pks: Vec<i64>,
    datasets: HashMap<i64, D>,
}

impl<D: Dataset> DatasetCollection<D> {
    /// Loads one dataset per primary key from `<pk>.txt` in the dataset
    /// directory. Any single failure fails the whole load; partial
    /// collections are never returned.
    pub fn load<R>(reader: &R, dataset_dir: &Path, pks: &[i64]) -> Result<Self, CollidbError>
    where
        R: DatasetReader<Dataset = D>,
    {
        info!(count = pks.len(), dir = %dataset_dir.display(), "reading in all dataset data");
        let mut datasets = HashMap::with_capacity(pks.len());
        for &pk in pks {
            let path = dataset_dir.join(format!("{pk}.txt"));
            let dataset = reader.read(&path).map_err(|err| CollidbError::DatasetLoad {
                pk,
                message: err.to_string(),
            })?;
            datasets.insert(pk, dataset);
        }
        Ok(Self {
            pks: pks.to_vec(),
            datasets,
        })
    }

    pub fn len(&self) -> usize {
        self.pks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pks.is_empty()
    }

    /// Primary keys in load order.
    pub fn pks(&self) -> &[i64] {
        &self.pks
    }

    pub fn get(&self, pk: i64) -> Option<&D> {
        self.datasets.get(&pk)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &D)> {
        self.pks.iter().map(|&pk| (pk, &self.datasets[&pk]))
    }

    fn dataset(&self, pk: i64) -> Result<&D, CollidbError> {
        self.datasets
            .get(&pk)
            .ok_or(CollidbError::DatasetNotLoaded(pk))
    }

    /// The consistency gate for every grouped operation. The first pk
    /// supplies the reference data type, frame and column schema; each
    /// subsequent pk must match all three exactly. Fails fast on the
    /// first mismatch, naming the disagreeing property.
    pub fn resolve_group_metadata(&self, pks: &[i64]) -> Result<GroupMetadata, CollidbError> {
        let (&first, rest) = pks.split_first().ok_or(CollidbError::EmptyGroup)?;
        let reference = self.dataset(first)?.metadata();
        let group = GroupMetadata {
            data_type: reference.data_type.clone(),
            frame: reference.frame().to_string(),
            columns: reference.json_data.columns.clone(),
        };
        for &pk in rest {
            let metadata = self.dataset(pk)?.metadata();
            if metadata.data_type != group.data_type {
                return Err(CollidbError::PlotConsistency {
                    property: "data_type",
                    pk,
                });
            }
            if metadata.frame() != group.frame {
                return Err(CollidbError::PlotConsistency {
                    property: "frame",
                    pk,
                });
            }
            if metadata.json_data.columns != group.columns {
                return Err(CollidbError::PlotConsistency {
                    property: "columns",
                    pk,
                });
            }
        }
        Ok(group)
    }

    /// Plots the given pks onto one canvas after the consistency gate
    /// passes. Axis labels come from the first dataset in the group.
    pub fn plot(
        &self,
        canvas: &mut dyn Canvas,
        pks: &[i64],
        use_latex: bool,
    ) -> Result<GroupMetadata, CollidbError> {
        let group = self.resolve_group_metadata(pks)?;
        for &pk in pks {
            self.dataset(pk)?.plot_dataset(canvas, use_latex);
        }
        self.dataset(pks[0])?.label_axes(canvas, use_latex);
        Ok(group)
    }

    pub fn plot_all(
        &self,
        canvas: &mut dyn Canvas,
        use_latex: bool,
    ) -> Result<GroupMetadata, CollidbError> {
        self.plot(canvas, &self.pks, use_latex)
    }

    /// Plots every record whose reaction text matches one of the given
    /// texts, in index order.
    pub fn plot_reactions(
        &self,
        canvas: &mut dyn Canvas,
        index: &ReactionIndex,
        reaction_texts: &[&str],
        use_latex: bool,
    ) -> Result<GroupMetadata, CollidbError> {
        let pks: Vec<i64> = reaction_texts
            .iter()
            .flat_map(|reaction| index.pks_for(reaction))
            .copied()
            .collect();
        self.plot(canvas, &pks, use_latex)
    }

    /// Scans every loaded reaction once so downstream summaries do not
    /// have to.
    pub fn distinct_reactants_products(&self) -> DistinctSpecies {
        let mut distinct = DistinctSpecies::default();
        for (_, dataset) in self.iter() {
            let reaction = dataset.reaction();
            for (_, species) in &reaction.reactants {
                distinct
                    .reactant_states
                    .entry(species.formula.clone())
                    .or_default()
                    .insert(species.states.clone());
                distinct.reactants.insert(species.clone());
            }
            for (_, species) in &reaction.products {
                distinct
                    .product_states
                    .entry(species.formula.clone())
                    .or_default()
                    .insert(species.states.clone());
                distinct.products.insert(species.clone());
            }
        }
        distinct
    }

    /// Converts the named columns in every dataset, in load order.
    /// Conversion is eager and per-dataset: on failure, datasets already
    /// converted keep their new units.
    pub fn convert_units(
        &mut self,
        column_units: &BTreeMap<String, String>,
    ) -> Result<(), CollidbError> {
        debug!(columns = column_units.len(), "converting units in all datasets");
        let pks = self.pks.clone();
        for pk in pks {
            let dataset = self
                .datasets
                .get_mut(&pk)
                .ok_or(CollidbError::DatasetNotLoaded(pk))?;
            for (column, to_units) in column_units {
                dataset.convert_units(column, to_units)?;
            }
        }
        Ok(())
    }

    /// Validates every dataset and returns the conjunction of the
    /// results. With `raise_on_failure`, the first failing dataset's
    /// error propagates instead of being folded into the result.
    pub fn validate_all(&self, raise_on_failure: bool) -> Result<bool, CollidbError> {
        let mut all_valid = true;
        for &pk in &self.pks {
            all_valid &= self.dataset(pk)?.validate(raise_on_failure)?;
        }
        Ok(all_valid)
    }

    /// Per-reaction report of record qids with process types, data type
    /// and references for the loaded records.
    pub fn summarize(&self, index: &ReactionIndex) -> String {
        let mut out = String::new();
        for (reaction, pks) in index.iter() {
            let _ = writeln!(out, "{reaction}");
            let _ = writeln!(out, "{}", "=".repeat(72));
            for &pk in pks {
                let _ = writeln!(out, "   qid: D{pk}");
                if let Some(dataset) = self.datasets.get(&pk) {
                    let metadata = dataset.metadata();
                    let process_types: Vec<&str> =
                        metadata.process_types.keys().map(String::as_str).collect();
                    let refs: Vec<&str> = metadata.refs.keys().map(String::as_str).collect();
                    let _ = writeln!(out, "   process_types: {process_types:?}");
                    let _ = writeln!(out, "   data_type: {}", metadata.data_type);
                    let _ = writeln!(out, "   refs: {refs:?}");
                }
            }
            out.push('\n');
        }
        out
    }
}
