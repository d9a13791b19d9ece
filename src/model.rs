use std::collections::HashMap;
use std::path::{Path, PathBuf};

use polars::datatypes::TimeUnit;
use polars::prelude::StrptimeOptions;
use polars::prelude::*;

use chrono::{NaiveDate, NaiveTime};
use tracing::{info, warn};

use crate::config::{DeriveConfig, PipelineConfig};
use crate::derive;
use crate::error::FoodPriceError;
use crate::preprocess::{
    self, DatasetProfile, MissingReport, MissingStrategy, OutlierMethod, OutlierSummary,
};
use crate::schema::{self, geo, meta, time};
use crate::validate::ValidationReport;

/// Default file name of the raw observations CSV.
pub const DEFAULT_OBSERVATIONS_FILE: &str = "food-prices.csv";

/// Date format of the `DATES` column, used for parsing and for writing
/// processed files so they round-trip.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// The dataset model: owns the observations frame and the pipeline steps.
pub struct FoodPriceModel {
    base_path: PathBuf,
    source_file: Option<PathBuf>,
    observations: Option<DataFrame>,
}

impl FoodPriceModel {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            source_file: None,
            observations: None,
        }
    }

    // ── Data loading ────────────────────────────────────────────────────────

    /// Load any CSV into a DataFrame with all columns as strings.
    /// Optionally rename columns via a map.
    pub fn load_csv(
        &self,
        filename: &str,
        rename: Option<HashMap<String, String>>,
    ) -> Result<DataFrame, FoodPriceError> {
        self.read_csv_as_strings(filename, rename)
    }

    /// Load the observations CSV.
    ///
    /// Required columns: the geographic and temporal identifiers plus
    /// `currency`, and at least one known commodity price column. All
    /// columns are loaded as strings - run `convert_types` before the
    /// numeric pipeline steps.
    pub fn load_observations(
        &mut self,
        filename: Option<&str>,
    ) -> Result<&DataFrame, FoodPriceError> {
        let fname = filename.unwrap_or(DEFAULT_OBSERVATIONS_FILE);
        let raw = self.read_csv_as_strings(fname, None)?;

        let mut required: Vec<&str> = Vec::new();
        required.extend(geo::ALL);
        required.extend(time::ALL);
        required.push(meta::CURRENCY);
        Self::require_columns(&raw, &required)?;

        let commodity_count = schema::COMMODITIES
            .iter()
            .filter(|c| raw.column(c).is_ok())
            .count();
        if commodity_count == 0 {
            return Err(FoodPriceError::InvalidData(
                "Observations CSV contains no known commodity price columns".to_string(),
            ));
        }

        info!(
            rows = raw.height(),
            columns = raw.width(),
            commodities = commodity_count,
            file = %fname,
            "observations loaded"
        );

        self.source_file = Some(self.base_path.join(fname));
        self.observations = Some(raw);
        Ok(self.observations.as_ref().unwrap())
    }

    /// The loaded observations frame.
    pub fn observations(&self) -> Result<&DataFrame, FoodPriceError> {
        self.observations
            .as_ref()
            .ok_or_else(|| FoodPriceError::NotLoaded("observations".into()))
    }

    /// Replace the observations frame (pipeline steps do this internally).
    pub fn set_observations(&mut self, df: DataFrame) {
        self.observations = Some(df);
    }

    // ── Type conversion ─────────────────────────────────────────────────────

    /// Convert columns to their documented types: `DATES` to datetime,
    /// `year`/`month` and the interpolation flag to ints, coordinates,
    /// prices, derived metrics and quality scores to floats.
    pub fn convert_types(&mut self, date_format: &str) -> Result<(), FoodPriceError> {
        let df = self.observations()?.clone();
        let df = Self::parse_datetime(df, time::DATES, date_format)?;

        let headers: Vec<String> = df
            .get_column_names_str()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let groups = schema::identify_column_groups(&headers);

        let mut float_cols: Vec<String> = vec![
            geo::LAT.to_string(),
            geo::LON.to_string(),
            meta::DATA_COVERAGE.to_string(),
            meta::DATA_COVERAGE_RECENT.to_string(),
            meta::INDEX_CONFIDENCE_SCORE.to_string(),
        ];
        float_cols.extend(groups.base_prices.iter().cloned());
        for cols in groups.derived.values() {
            float_cols.extend(cols.iter().cloned());
        }
        for cols in groups.composite.values() {
            float_cols.extend(cols.iter().cloned());
        }

        let int_cols = [
            time::YEAR.to_string(),
            time::MONTH.to_string(),
            meta::SPATIALLY_INTERPOLATED.to_string(),
            schema::features::QUARTER.to_string(),
            schema::features::DAYS_SINCE_START.to_string(),
        ];

        let mut casts: Vec<Expr> = Vec::new();
        for name in &float_cols {
            if df.column(name).is_ok() {
                casts.push(col(name.as_str()).cast(DataType::Float64));
            }
        }
        for name in &int_cols {
            if df.column(name).is_ok() {
                casts.push(col(name.as_str()).cast(DataType::Int64));
            }
        }

        let df = df.lazy().with_columns(casts).collect()?;
        self.observations = Some(df);
        Ok(())
    }

    // ── Parse helpers ───────────────────────────────────────────────────────

    /// Parse a string column to Datetime using the given format string.
    ///
    /// Example formats: "%Y-%m-%d", "%Y-%m-%d %H:%M:%S", "%d/%m/%Y"
    pub fn parse_datetime(
        df: DataFrame,
        column: &str,
        format: &str,
    ) -> Result<DataFrame, FoodPriceError> {
        if df.column(column).is_err() {
            return Ok(df);
        }
        let df = df
            .lazy()
            .with_columns([col(column)
                .str()
                .strip_chars(lit(" \t\r\n"))
                .str()
                .to_datetime(
                    Some(TimeUnit::Microseconds),
                    None,
                    StrptimeOptions {
                        format: Some(format.into()),
                        strict: true,
                        ..Default::default()
                    },
                    lit("raise"),
                )])
            .collect()?;
        Ok(df)
    }

    /// Parse a string column to Float64.
    pub fn parse_float(df: DataFrame, column: &str) -> Result<DataFrame, FoodPriceError> {
        let result = df
            .lazy()
            .with_columns([col(column)
                .str()
                .strip_chars(lit(" \t\r\n"))
                .cast(DataType::Float64)])
            .collect()?;
        Ok(result)
    }

    /// Parse a string column to Int64.
    pub fn parse_int(df: DataFrame, column: &str) -> Result<DataFrame, FoodPriceError> {
        let result = df
            .lazy()
            .with_columns([col(column)
                .str()
                .strip_chars(lit(" \t\r\n"))
                .cast(DataType::Int64)])
            .collect()?;
        Ok(result)
    }

    // ── Filtering ───────────────────────────────────────────────────────────

    /// Observation rows for a single market.
    pub fn market_observations(&self, market: &str) -> Result<DataFrame, FoodPriceError> {
        let df = self.observations()?;
        let out = df
            .clone()
            .lazy()
            .filter(col(geo::MKT_NAME).eq(lit(market)))
            .collect()?;
        Ok(out)
    }

    /// Observation rows with `start <= DATES < end`.
    ///
    /// `DATES` must already be parsed to datetime.
    pub fn observations_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DataFrame, FoodPriceError> {
        let df = self.observations()?;
        let start_us = start.and_time(NaiveTime::MIN).and_utc().timestamp_micros();
        let end_us = end.and_time(NaiveTime::MIN).and_utc().timestamp_micros();

        let out = df
            .clone()
            .lazy()
            .filter(
                col(time::DATES)
                    .gt_eq(lit(start_us))
                    .and(col(time::DATES).lt(lit(end_us))),
            )
            .collect()?;
        Ok(out)
    }

    /// Distinct market names observed in a given year.
    pub fn markets_in_year(&self, year: i64) -> Result<Vec<String>, FoodPriceError> {
        let df = self.observations()?;
        let filtered = df
            .clone()
            .lazy()
            .filter(col(time::YEAR).eq(lit(year)))
            .select([col(geo::MKT_NAME)])
            .collect()?;

        let mut names: Vec<String> = filtered
            .column(geo::MKT_NAME)?
            .as_materialized_series()
            .str()?
            .into_iter()
            .flatten()
            .map(|s| s.to_string())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    // ── Pipeline steps ──────────────────────────────────────────────────────

    /// Dataset overview statistics.
    pub fn profile(&self) -> Result<DatasetProfile, FoodPriceError> {
        preprocess::profile(self.observations()?)
    }

    /// Apply a missing-value strategy to the observations frame.
    pub fn handle_missing(
        &mut self,
        strategy: MissingStrategy,
        critical_columns: &[String],
    ) -> Result<MissingReport, FoodPriceError> {
        let (df, report) =
            preprocess::handle_missing(self.observations()?, strategy, critical_columns)?;
        self.observations = Some(df);
        Ok(report)
    }

    /// Count outliers in the given price columns (default: the first ten
    /// base commodity columns present).
    pub fn detect_outliers(
        &self,
        columns: Option<&[String]>,
        method: OutlierMethod,
        threshold: f64,
    ) -> Result<OutlierSummary, FoodPriceError> {
        let df = self.observations()?;
        let owned_default;
        let columns = match columns {
            Some(cols) => cols,
            None => {
                let headers: Vec<String> = df
                    .get_column_names_str()
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
                let mut groups = schema::identify_column_groups(&headers);
                groups.base_prices.truncate(10);
                owned_default = groups.base_prices;
                &owned_default
            }
        };
        preprocess::detect_outliers(df, columns, method, threshold)
    }

    /// Add the calendar feature columns.
    pub fn add_calendar_features(&mut self) -> Result<(), FoodPriceError> {
        let df = preprocess::add_calendar_features(self.observations()?)?;
        self.observations = Some(df);
        Ok(())
    }

    /// Run the index aggregator: derive OHLC, inflation, trust and the
    /// composite index columns.
    pub fn derive_indices(&mut self, config: &DeriveConfig) -> Result<(), FoodPriceError> {
        let df = derive::derive_price_indices(self.observations()?, config)?;
        self.observations = Some(df);
        Ok(())
    }

    /// Check the observations frame against the documented schema.
    pub fn validate(&self) -> Result<ValidationReport, FoodPriceError> {
        crate::validate::validate(self.observations()?)
    }

    /// Like `validate`, but a non-empty report becomes an error.
    pub fn validate_strict(&self) -> Result<(), FoodPriceError> {
        self.validate()?.into_result()
    }

    /// Run the whole pipeline on the loaded observations and save the
    /// processed CSV. Returns the output path.
    pub fn run(&mut self, config: &PipelineConfig) -> Result<PathBuf, FoodPriceError> {
        self.convert_types(&config.dataset.date_format)?;

        let missing = self.handle_missing(
            config.preprocess.missing_strategy,
            &config.dataset.critical_columns,
        )?;
        info!(?missing, "missing-value pass done");

        let outliers = self.detect_outliers(
            config.preprocess.outlier_columns.as_deref(),
            config.preprocess.outlier_method,
            config.preprocess.outlier_threshold,
        )?;
        if outliers.total() > 0 {
            warn!(total = outliers.total(), "outliers detected in price columns");
        }

        self.add_calendar_features()?;
        self.derive_indices(&config.derive)?;

        let report = self.validate()?;
        for violation in report.violations() {
            warn!(%violation, "schema violation in processed frame");
        }

        self.save_processed(&config.output.processed_suffix)
    }

    // ── Persistence ─────────────────────────────────────────────────────────

    /// Write the observations frame as CSV to an explicit path.
    pub fn write_csv(&self, path: &Path) -> Result<(), FoodPriceError> {
        let mut df = self.observations()?.clone();
        let file = std::fs::File::create(path)?;
        CsvWriter::new(file)
            .include_header(true)
            .with_datetime_format(Some(DEFAULT_DATE_FORMAT.to_string()))
            .finish(&mut df)?;
        Ok(())
    }

    /// Save next to the source file as `<stem><suffix>.csv`.
    pub fn save_processed(&self, suffix: &str) -> Result<PathBuf, FoodPriceError> {
        let source = self
            .source_file
            .as_ref()
            .ok_or_else(|| FoodPriceError::NotLoaded("observations".into()))?;
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| FoodPriceError::InvalidData(format!(
                "Source path has no file stem: {}",
                source.display()
            )))?;
        let path = source.with_file_name(format!("{stem}{suffix}.csv"));
        self.write_csv(&path)?;
        info!(path = %path.display(), "processed data saved");
        Ok(path)
    }
}

// ── Private helpers ─────────────────────────────────────────────────────────

impl FoodPriceModel {
    /// Read a CSV file with all columns as String dtype.
    /// Trims whitespace from column names and applies optional rename.
    fn read_csv_as_strings(
        &self,
        filename: &str,
        rename: Option<HashMap<String, String>>,
    ) -> Result<DataFrame, FoodPriceError> {
        let path = self.base_path.join(filename);
        let mut df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0)) // all columns as String
            .try_into_reader_with_file_path(Some(path))?
            .finish()?;

        // Trim whitespace from column names
        let trimmed: Vec<String> = df
            .get_column_names_str()
            .iter()
            .map(|c| c.trim().to_string())
            .collect();
        df.set_column_names(trimmed.as_slice())?;

        // Apply optional column rename
        if let Some(map) = rename {
            let old: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
            let new: Vec<&str> = map.values().map(|s| s.as_str()).collect();
            df = df.lazy().rename(old, new, true).collect()?;
        }

        Ok(df)
    }

    fn require_columns(df: &DataFrame, required: &[&str]) -> Result<(), FoodPriceError> {
        for &col_name in required {
            if df.column(col_name).is_err() {
                return Err(FoodPriceError::MissingColumn(col_name.to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_csv(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    const MINIMAL_CSV: &str = "\
ISO3,country,adm1_name,adm2_name,mkt_name,lat,lon,geo_id,DATES,year,month,currency,rice
PHL,Philippines,NCR,Metro Manila,Divisoria,14.6,120.97,g1,2024-01-01,2024,1,PHP,45.0
PHL,Philippines,NCR,Metro Manila,Divisoria,14.6,120.97,g1,2024-02-01,2024,2,PHP,46.0
PHL,Philippines,NCR,Metro Manila,Quiapo,14.59,120.98,g2,2024-01-01,2024,1,PHP,
";

    #[test]
    fn test_load_observations_as_strings() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "food-prices.csv", MINIMAL_CSV);

        let mut model = FoodPriceModel::new(dir.path());
        let df = model.load_observations(None).unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.column("rice").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_load_observations_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "food-prices.csv", "ISO3,country\nPHL,Philippines\n");

        let mut model = FoodPriceModel::new(dir.path());
        let err = model.load_observations(None).unwrap_err();
        assert!(matches!(err, FoodPriceError::MissingColumn(_)));
    }

    #[test]
    fn test_observations_before_load() {
        let model = FoodPriceModel::new(".");
        assert!(matches!(
            model.observations(),
            Err(FoodPriceError::NotLoaded(_))
        ));
    }

    #[test]
    fn test_convert_types() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "food-prices.csv", MINIMAL_CSV);

        let mut model = FoodPriceModel::new(dir.path());
        model.load_observations(None).unwrap();
        model.convert_types("%Y-%m-%d").unwrap();

        let df = model.observations().unwrap();
        assert_eq!(df.column("year").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("rice").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("lat").unwrap().dtype(), &DataType::Float64);
        assert!(matches!(
            df.column("DATES").unwrap().dtype(),
            DataType::Datetime(_, _)
        ));
        // Empty price cell becomes null, not zero.
        assert_eq!(df.column("rice").unwrap().null_count(), 1);
    }

    #[test]
    fn test_market_filter_and_date_range() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "food-prices.csv", MINIMAL_CSV);

        let mut model = FoodPriceModel::new(dir.path());
        model.load_observations(None).unwrap();
        model.convert_types("%Y-%m-%d").unwrap();

        let divisoria = model.market_observations("Divisoria").unwrap();
        assert_eq!(divisoria.height(), 2);

        let january = model
            .observations_between(
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            )
            .unwrap();
        assert_eq!(january.height(), 2);

        let markets = model.markets_in_year(2024).unwrap();
        assert_eq!(markets, vec!["Divisoria".to_string(), "Quiapo".to_string()]);
    }

    #[test]
    fn test_save_processed_naming() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "food-prices.csv", MINIMAL_CSV);

        let mut model = FoodPriceModel::new(dir.path());
        model.load_observations(None).unwrap();
        let path = model.save_processed("_processed").unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "food-prices_processed.csv"
        );
        assert!(path.exists());
    }

    #[test]
    fn test_parse_helpers() {
        let df = df![
            "price" => [" 45.0 ", "46.5"],
            "count" => ["3", " 7 "],
        ]
        .unwrap();

        let df = FoodPriceModel::parse_float(df, "price").unwrap();
        let df = FoodPriceModel::parse_int(df, "count").unwrap();
        assert_eq!(df.column("price").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("count").unwrap().dtype(), &DataType::Int64);
        let counts: Vec<i64> = df
            .column("count")
            .unwrap()
            .as_materialized_series()
            .i64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(counts, vec![3, 7]);
    }

    #[test]
    fn test_load_csv_with_rename() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "other.csv", " name ,value\na,1\n");

        let model = FoodPriceModel::new(dir.path());
        let mut rename = HashMap::new();
        rename.insert("name".to_string(), "market".to_string());
        let df = model.load_csv("other.csv", Some(rename)).unwrap();
        assert!(df.column("market").is_ok());
    }
}
