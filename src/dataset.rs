use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::CollidbError;

/// Reference frame assumed when a dataset's metadata omits `frame`.
pub const DEFAULT_FRAME: &str = "target";

/// One reaction partner: a chemical formula plus the internal-state
/// labels that distinguish it from other species with the same formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct Species {
    pub formula: String,
    #[serde(default)]
    pub states: Vec<String>,
}

/// Reactant and product sides as (role, species) pairs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Reaction {
    #[serde(default)]
    pub reactants: Vec<(String, Species)>,
    #[serde(default)]
    pub products: Vec<(String, Species)>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonData {
    pub columns: Value,
}

/// Metadata block every per-record dataset resource carries.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetMetadata {
    pub data_type: String,
    #[serde(default)]
    pub process_types: BTreeMap<String, Value>,
    #[serde(default)]
    pub refs: BTreeMap<String, Value>,
    #[serde(default)]
    frame: Option<String>,
    pub json_data: JsonData,
}

impl DatasetMetadata {
    pub fn frame(&self) -> &str {
        self.frame.as_deref().unwrap_or(DEFAULT_FRAME)
    }
}

/// Sink for rendered data; implemented by plotting backends.
pub trait Canvas {
    fn draw_series(&mut self, label: &str, x: &[f64], y: &[f64]);
    fn label_x(&mut self, label: &str);
    fn label_y(&mut self, label: &str);
}

/// One loaded collision-data record. Parsing, unit arithmetic and
/// rendering all live behind this boundary.
pub trait Dataset {
    fn metadata(&self) -> &DatasetMetadata;

    fn reaction(&self) -> &Reaction;

    fn plot_dataset(&self, canvas: &mut dyn Canvas, use_latex: bool);

    fn label_axes(&self, canvas: &mut dyn Canvas, use_latex: bool);

    /// Converts the named column in place. Dimensions have to match;
    /// a mismatch surfaces as [`CollidbError::UnitConversion`].
    fn convert_units(&mut self, column: &str, to_units: &str) -> Result<(), CollidbError>;

    /// Checks the dataset's internal consistency. With `raise_on_failure`
    /// the first defect is returned as an error instead of `false`.
    fn validate(&self, raise_on_failure: bool) -> Result<bool, CollidbError>;
}

/// Constructs dataset handles from per-record resources on disk.
pub trait DatasetReader: Send + Sync {
    type Dataset: Dataset;

    fn read(&self, path: &Path) -> Result<Self::Dataset, CollidbError>;
}
