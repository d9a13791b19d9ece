//! Preprocessing of the observations frame: dataset profile, missing-value
//! handling, outlier detection and calendar features.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::FoodPriceError;
use crate::schema::{self, geo, time};

/// Missing-value handling strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingStrategy {
    /// Only report missing values.
    #[default]
    Analyze,
    /// Remove rows with critical identifiers missing.
    Drop,
    /// Forward-fill numeric columns within each `geo_id` series.
    Impute,
}

/// Outlier detection method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierMethod {
    /// Interquartile range fences: Q1 − k·IQR, Q3 + k·IQR.
    #[default]
    Iqr,
    /// Standard scores: |z| > k.
    ZScore,
}

/// Basic shape and coverage statistics of the loaded dataset.
#[derive(Debug, Clone)]
pub struct DatasetProfile {
    pub rows: usize,
    pub columns: usize,
    pub countries: usize,
    pub regions: usize,
    pub provinces: usize,
    pub markets: usize,
    pub years: Vec<i64>,
    pub date_min: Option<String>,
    pub date_max: Option<String>,
    /// Columns with more than half of their values missing.
    pub columns_over_half_missing: usize,
    /// Columns with more than 90% of their values missing.
    pub columns_over_ninety_missing: usize,
}

/// Outcome of a missing-value pass.
#[derive(Debug, Clone, Default)]
pub struct MissingReport {
    pub strategy: MissingStrategy,
    /// Missing counts for critical identifier columns (only non-zero entries).
    pub critical_missing: Vec<(String, usize)>,
    /// Number of base price columns carrying at least one missing value.
    pub price_columns_with_missing: usize,
    /// Rows removed by the `drop` strategy.
    pub rows_dropped: usize,
    /// Columns forward-filled by the `impute` strategy.
    pub imputed_columns: usize,
}

/// Per-column outlier counts (only columns with at least one hit).
#[derive(Debug, Clone, Default)]
pub struct OutlierSummary {
    pub per_column: Vec<(String, usize)>,
}

impl OutlierSummary {
    pub fn total(&self) -> usize {
        self.per_column.iter().map(|(_, n)| n).sum()
    }
}

// ── Profile ─────────────────────────────────────────────────────────────────

/// Compute the dataset overview the original pipeline printed on load.
pub fn profile(df: &DataFrame) -> Result<DatasetProfile, FoodPriceError> {
    let years = match df.column(time::YEAR) {
        Ok(col) => {
            let mut years: Vec<i64> = col
                .as_materialized_series()
                .cast(&DataType::Int64)?
                .i64()?
                .into_iter()
                .flatten()
                .collect();
            years.sort_unstable();
            years.dedup();
            years
        }
        Err(_) => Vec::new(),
    };

    let (date_min, date_max) = match df.column(time::DATES) {
        Ok(col) => {
            let s = col.as_materialized_series();
            let min = s.min_reduce()?;
            let max = s.max_reduce()?;
            let render = |v: &Scalar| {
                let v = v.value();
                if v.is_null() {
                    None
                } else {
                    Some(format!("{v}"))
                }
            };
            (render(&min), render(&max))
        }
        Err(_) => (None, None),
    };

    let half = df.height() / 2;
    let ninety = df.height() * 9 / 10;
    let mut over_half = 0;
    let mut over_ninety = 0;
    for col in df.get_columns() {
        let nulls = col.null_count();
        if nulls > half {
            over_half += 1;
        }
        if nulls > ninety {
            over_ninety += 1;
        }
    }

    let profile = DatasetProfile {
        rows: df.height(),
        columns: df.width(),
        countries: n_unique_or_zero(df, geo::COUNTRY)?,
        regions: n_unique_or_zero(df, geo::ADM1_NAME)?,
        provinces: n_unique_or_zero(df, geo::ADM2_NAME)?,
        markets: n_unique_or_zero(df, geo::MKT_NAME)?,
        years,
        date_min,
        date_max,
        columns_over_half_missing: over_half,
        columns_over_ninety_missing: over_ninety,
    };

    info!(
        rows = profile.rows,
        columns = profile.columns,
        markets = profile.markets,
        "dataset profile computed"
    );
    Ok(profile)
}

fn n_unique_or_zero(df: &DataFrame, name: &str) -> Result<usize, FoodPriceError> {
    match df.column(name) {
        Ok(col) => Ok(col.as_materialized_series().n_unique()?),
        Err(_) => Ok(0),
    }
}

// ── Missing values ──────────────────────────────────────────────────────────

/// Apply a missing-value strategy to the frame.
///
/// `critical_columns` are the identifiers a row must carry to survive the
/// `drop` strategy; `analyze` reports on the same set.
pub fn handle_missing(
    df: &DataFrame,
    strategy: MissingStrategy,
    critical_columns: &[String],
) -> Result<(DataFrame, MissingReport), FoodPriceError> {
    let mut report = MissingReport {
        strategy,
        ..Default::default()
    };

    match strategy {
        MissingStrategy::Analyze => {
            for name in critical_columns {
                if let Ok(col) = df.column(name) {
                    let missing = col.null_count();
                    if missing > 0 {
                        warn!(column = %name, missing, "critical column has missing values");
                        report.critical_missing.push((name.clone(), missing));
                    }
                }
            }

            let headers: Vec<String> = df
                .get_column_names_str()
                .iter()
                .map(|s| s.to_string())
                .collect();
            let groups = schema::identify_column_groups(&headers);
            report.price_columns_with_missing = groups
                .base_prices
                .iter()
                .filter(|name| {
                    df.column(name)
                        .map(|c| c.null_count() > 0)
                        .unwrap_or(false)
                })
                .count();

            Ok((df.clone(), report))
        }

        MissingStrategy::Drop => {
            let before = df.height();

            let mut keep: Option<Expr> = None;
            for name in critical_columns {
                if df.column(name).is_err() {
                    return Err(FoodPriceError::MissingColumn(name.clone()));
                }
                let not_null = col(name.as_str()).is_not_null();
                keep = Some(match keep {
                    Some(acc) => acc.and(not_null),
                    None => not_null,
                });
            }

            let out = match keep {
                Some(predicate) => df.clone().lazy().filter(predicate).collect()?,
                None => df.clone(),
            };
            report.rows_dropped = before - out.height();
            info!(dropped = report.rows_dropped, "dropped rows with missing critical data");
            Ok((out, report))
        }

        MissingStrategy::Impute => {
            if df.column(geo::GEO_ID).is_err() {
                return Err(FoodPriceError::MissingColumn(geo::GEO_ID.to_string()));
            }

            let numeric: Vec<String> = df
                .get_columns()
                .iter()
                .filter(|c| c.dtype().is_primitive_numeric())
                .map(|c| c.name().to_string())
                .collect();
            report.imputed_columns = numeric.len();

            let sorted = df.sort([geo::GEO_ID, time::DATES], SortMultipleOptions::default())?;
            let fills: Vec<Expr> = numeric
                .iter()
                .map(|name| {
                    col(name.as_str())
                        .fill_null_with_strategy(FillNullStrategy::Forward(None))
                        .over([col(geo::GEO_ID)])
                })
                .collect();

            let out = sorted.lazy().with_columns(fills).collect()?;
            info!(columns = report.imputed_columns, "applied forward-fill imputation");
            Ok((out, report))
        }
    }
}

// ── Outlier detection ───────────────────────────────────────────────────────

/// Count outliers per column with the chosen method.
///
/// `threshold` is the IQR multiplier or the z-score cutoff.
pub fn detect_outliers(
    df: &DataFrame,
    columns: &[String],
    method: OutlierMethod,
    threshold: f64,
) -> Result<OutlierSummary, FoodPriceError> {
    let mut summary = OutlierSummary::default();

    for name in columns {
        let Ok(col) = df.column(name) else {
            continue;
        };
        let values: Vec<f64> = col
            .as_materialized_series()
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .flatten()
            .filter(|v| v.is_finite())
            .collect();
        if values.is_empty() {
            continue;
        }

        let outliers = match method {
            OutlierMethod::Iqr => {
                let mut sorted = values.clone();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let q1 = quantile(&sorted, 0.25);
                let q3 = quantile(&sorted, 0.75);
                let iqr = q3 - q1;
                let lower = q1 - threshold * iqr;
                let upper = q3 + threshold * iqr;
                values.iter().filter(|v| **v < lower || **v > upper).count()
            }
            OutlierMethod::ZScore => {
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                    / (n - 1.0).max(1.0);
                let std = var.sqrt();
                if std == 0.0 {
                    0
                } else {
                    values
                        .iter()
                        .filter(|v| ((*v - mean) / std).abs() > threshold)
                        .count()
                }
            }
        };

        if outliers > 0 {
            debug!(column = %name, outliers, "outliers detected");
            summary.per_column.push((name.clone(), outliers));
        }
    }

    Ok(summary)
}

/// Linear-interpolation quantile of a sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = q * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

// ── Calendar features ───────────────────────────────────────────────────────

/// Add `quarter`, `year_month` and `days_since_start` columns.
///
/// `DATES` must already be parsed to datetime, `year` and `month` to ints.
pub fn add_calendar_features(df: &DataFrame) -> Result<DataFrame, FoodPriceError> {
    let quarter = ((col(time::MONTH) + lit(2)) / lit(3))
        .cast(DataType::Int64)
        .alias(schema::features::QUARTER);

    let month_str = when(col(time::MONTH).lt(lit(10)))
        .then(concat_str(
            [lit("0"), col(time::MONTH).cast(DataType::String)],
            "",
            false,
        ))
        .otherwise(col(time::MONTH).cast(DataType::String));
    let year_month = concat_str(
        [col(time::YEAR).cast(DataType::String), month_str],
        "-",
        false,
    )
    .alias(schema::features::YEAR_MONTH);

    let days_since_start = (col(time::DATES) - col(time::DATES).min())
        .dt()
        .total_days()
        .alias(schema::features::DAYS_SINCE_START);

    let out = df
        .clone()
        .lazy()
        .with_columns([quarter, year_month, days_since_start])
        .collect()?;
    debug!("added calendar feature columns");
    Ok(out)
}
