//! Pipeline configuration.
//!
//! Loading and merging of `food-price-index.toml` files. Every field has a
//! default so an absent file or an empty table is always valid.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::FoodPriceError;
use crate::preprocess::{MissingStrategy, OutlierMethod};
use crate::schema::{geo, time};

/// Conventional config file name, looked up next to the data.
pub const CONFIG_FILE_NAME: &str = "food-price-index.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Dataset parsing settings.
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Preprocessing settings.
    #[serde(default)]
    pub preprocess: PreprocessConfig,

    /// Index derivation settings.
    #[serde(default)]
    pub derive: DeriveConfig,

    /// Output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Dataset parsing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Format of the `DATES` column.
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Columns a row must carry to survive the `drop` strategy.
    #[serde(default = "default_critical_columns")]
    pub critical_columns: Vec<String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            date_format: default_date_format(),
            critical_columns: default_critical_columns(),
        }
    }
}

fn default_date_format() -> String {
    crate::model::DEFAULT_DATE_FORMAT.to_string()
}

fn default_critical_columns() -> Vec<String> {
    vec![
        geo::ISO3.to_string(),
        geo::COUNTRY.to_string(),
        time::DATES.to_string(),
        time::YEAR.to_string(),
        time::MONTH.to_string(),
    ]
}

/// Preprocessing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Missing-value strategy.
    #[serde(default)]
    pub missing_strategy: MissingStrategy,

    /// Outlier detection method.
    #[serde(default)]
    pub outlier_method: OutlierMethod,

    /// IQR multiplier or z-score cutoff, depending on the method.
    #[serde(default = "default_outlier_threshold")]
    pub outlier_threshold: f64,

    /// Price columns to scan for outliers. Defaults to the first ten base
    /// commodity columns present in the data.
    #[serde(default)]
    pub outlier_columns: Option<Vec<String>>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            missing_strategy: MissingStrategy::default(),
            outlier_method: OutlierMethod::default(),
            outlier_threshold: default_outlier_threshold(),
            outlier_columns: None,
        }
    }
}

fn default_outlier_threshold() -> f64 {
    3.0
}

/// Index derivation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeriveConfig {
    /// Lag of the trailing inflation rate, in months.
    #[serde(default = "default_inflation_lag")]
    pub inflation_lag_months: u32,

    /// Damp trust scores by the dataset confidence score.
    #[serde(default = "default_true")]
    pub confidence_damping: bool,
}

impl Default for DeriveConfig {
    fn default() -> Self {
        Self {
            inflation_lag_months: default_inflation_lag(),
            confidence_damping: true,
        }
    }
}

fn default_inflation_lag() -> u32 {
    12
}

fn default_true() -> bool {
    true
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Suffix appended to the input file stem when saving.
    #[serde(default = "default_processed_suffix")]
    pub processed_suffix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            processed_suffix: default_processed_suffix(),
        }
    }
}

fn default_processed_suffix() -> String {
    "_processed".to_string()
}

impl PipelineConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, FoodPriceError> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load configuration from the conventional location in `dir`.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but
    /// can't be parsed.
    pub fn load_default(dir: &Path) -> Result<Option<Self>, FoodPriceError> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Ok(Some(Self::load(&path)?))
        } else {
            Ok(None)
        }
    }
}
