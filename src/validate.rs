//! Schema conformance checks against the documented data dictionary.
//!
//! Checks accumulate into a report instead of failing fast, so one pass
//! over a file surfaces every violated rule.

use polars::prelude::*;

use crate::error::FoodPriceError;
use crate::schema::{self, expected, geo, meta, time, Metric};

/// Accumulated rule violations, one entry per rule and column.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    violations: Vec<String>,
}

impl ValidationReport {
    pub fn is_conformant(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    /// A non-empty report becomes a validation error.
    pub fn into_result(self) -> Result<(), FoodPriceError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(FoodPriceError::Validation(self.violations.join("; ")))
        }
    }

    fn push(&mut self, violation: String) {
        self.violations.push(violation);
    }
}

/// Check a frame against the documented schema.
///
/// Works on both raw and processed files: derived-column rules only apply
/// to the derived columns actually present.
pub fn validate(df: &DataFrame) -> Result<ValidationReport, FoodPriceError> {
    let mut report = ValidationReport::default();

    check_presence(df, &mut report);
    check_derived_completeness(df, &mut report);
    check_constants(df, &mut report)?;
    check_ranges(df, &mut report)?;

    Ok(report)
}

fn check_presence(df: &DataFrame, report: &mut ValidationReport) {
    let mut required: Vec<&str> = Vec::new();
    required.extend(geo::ALL);
    required.extend(time::ALL);
    required.extend(meta::ALL);

    for name in required {
        if df.column(name).is_err() {
            report.push(format!("{name}: required column missing"));
        }
    }
}

fn check_derived_completeness(df: &DataFrame, report: &mut ValidationReport) {
    let mut any_derived = false;

    for commodity in schema::COMMODITIES {
        let derived = schema::derived_columns(commodity);
        let present = derived.iter().filter(|c| df.column(c).is_ok()).count();
        if present == 0 {
            continue;
        }
        any_derived = true;
        if present < derived.len() {
            for name in &derived {
                if df.column(name).is_err() {
                    report.push(format!(
                        "{name}: derived set for '{commodity}' is incomplete"
                    ));
                }
            }
        }
    }

    if any_derived {
        for metric in Metric::ALL {
            if df.column(metric.index_column()).is_err() {
                report.push(format!(
                    "{}: composite index column missing",
                    metric.index_column()
                ));
            }
        }
    }
}

fn check_constants(df: &DataFrame, report: &mut ValidationReport) -> Result<(), FoodPriceError> {
    let string_constants = [
        (geo::ISO3, expected::ISO3),
        (geo::COUNTRY, expected::COUNTRY),
        (meta::CURRENCY, expected::CURRENCY),
    ];
    for (name, value) in string_constants {
        if df.column(name).is_err() {
            continue;
        }
        let bad = count_where(df, col(name).neq_missing(lit(value)))?;
        if bad > 0 {
            report.push(format!("{name}: {bad} rows differ from \"{value}\""));
        }
    }

    let float_constants = [
        (meta::DATA_COVERAGE, expected::DATA_COVERAGE),
        (meta::DATA_COVERAGE_RECENT, expected::DATA_COVERAGE_RECENT),
        (meta::INDEX_CONFIDENCE_SCORE, expected::INDEX_CONFIDENCE_SCORE),
    ];
    for (name, value) in float_constants {
        if df.column(name).is_err() {
            continue;
        }
        let eps = 1e-9;
        let out_of_band = col(name)
            .lt(lit(value - eps))
            .or(col(name).gt(lit(value + eps)))
            .or(col(name).is_null());
        let bad = count_where(df, out_of_band)?;
        if bad > 0 {
            report.push(format!("{name}: {bad} rows differ from {value}"));
        }
    }

    if df.column(meta::SPATIALLY_INTERPOLATED).is_ok() {
        let bad = count_where(
            df,
            col(meta::SPATIALLY_INTERPOLATED)
                .neq_missing(lit(expected::SPATIALLY_INTERPOLATED)),
        )?;
        if bad > 0 {
            report.push(format!(
                "{}: {bad} rows differ from {}",
                meta::SPATIALLY_INTERPOLATED,
                expected::SPATIALLY_INTERPOLATED
            ));
        }
    }

    Ok(())
}

fn check_ranges(df: &DataFrame, report: &mut ValidationReport) -> Result<(), FoodPriceError> {
    if df.column(time::MONTH).is_ok() {
        let bad = count_where(
            df,
            col(time::MONTH)
                .lt(lit(1))
                .or(col(time::MONTH).gt(lit(12)))
                .or(col(time::MONTH).is_null()),
        )?;
        if bad > 0 {
            report.push(format!("month: {bad} rows outside [1, 12]"));
        }
    }

    if df.column(time::YEAR).is_ok() {
        let bad = count_where(
            df,
            col(time::YEAR)
                .lt(lit(expected::YEAR_MIN))
                .or(col(time::YEAR).gt(lit(expected::YEAR_MAX)))
                .or(col(time::YEAR).is_null()),
        )?;
        if bad > 0 {
            report.push(format!(
                "year: {bad} rows outside [{}, {}]",
                expected::YEAR_MIN,
                expected::YEAR_MAX
            ));
        }
    }

    if df.column(meta::INDEX_CONFIDENCE_SCORE).is_ok() {
        let bad = count_where(
            df,
            col(meta::INDEX_CONFIDENCE_SCORE)
                .lt(lit(0.0))
                .or(col(meta::INDEX_CONFIDENCE_SCORE).gt(lit(1.0))),
        )?;
        if bad > 0 {
            report.push(format!(
                "{}: {bad} rows outside [0, 1]",
                meta::INDEX_CONFIDENCE_SCORE
            ));
        }
    }

    if df.column(meta::SPATIALLY_INTERPOLATED).is_ok() {
        let flags = Series::new("".into(), [0i64, 1]);
        let bad = count_where(
            df,
            col(meta::SPATIALLY_INTERPOLATED)
                .is_in(lit(flags), false)
                .not(),
        )?;
        if bad > 0 {
            report.push(format!(
                "{}: {bad} rows outside {{0, 1}}",
                meta::SPATIALLY_INTERPOLATED
            ));
        }
    }

    // Trust scores live in [1, 10] wherever present.
    let headers: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let groups = schema::identify_column_groups(&headers);
    let mut trust_cols: Vec<String> = Vec::new();
    if let Some(cols) = groups.derived.get(&Metric::Trust) {
        trust_cols.extend(cols.iter().cloned());
    }
    if let Some(cols) = groups.composite.get(&Metric::Trust) {
        trust_cols.extend(cols.iter().cloned());
    }
    for name in trust_cols {
        let bad = count_where(
            df,
            col(name.as_str())
                .lt(lit(1.0))
                .or(col(name.as_str()).gt(lit(10.0))),
        )?;
        if bad > 0 {
            report.push(format!("{name}: {bad} rows outside [1, 10]"));
        }
    }

    Ok(())
}

fn count_where(df: &DataFrame, predicate: Expr) -> Result<usize, FoodPriceError> {
    let filtered = df.clone().lazy().filter(predicate).collect()?;
    Ok(filtered.height())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A two-row frame satisfying every documented rule, with one commodity
    /// carrying its full derived set.
    fn conformant_frame() -> DataFrame {
        df![
            geo::ISO3 => ["PHL", "PHL"],
            geo::COUNTRY => ["Philippines", "Philippines"],
            geo::ADM1_NAME => ["NCR", "NCR"],
            geo::ADM2_NAME => ["Metro Manila", "Metro Manila"],
            geo::MKT_NAME => ["Divisoria", "Divisoria"],
            geo::LAT => [14.6, 14.6],
            geo::LON => [120.97, 120.97],
            geo::GEO_ID => ["g1", "g1"],
            time::DATES => ["2024-01-01", "2024-02-01"],
            time::YEAR => [2024i64, 2024],
            time::MONTH => [1i64, 2],
            meta::CURRENCY => ["PHP", "PHP"],
            meta::COMPONENTS => ["rice:1", "rice:1"],
            meta::START_DENSE_DATA => ["2007-01-01", "2007-01-01"],
            meta::LAST_SURVEY_POINT => ["2025-05-01", "2025-05-01"],
            meta::DATA_COVERAGE => [20.71, 20.71],
            meta::DATA_COVERAGE_RECENT => [40.18, 40.18],
            meta::INDEX_CONFIDENCE_SCORE => [0.98, 0.98],
            meta::SPATIALLY_INTERPOLATED => [0i64, 0],
            "rice" => [45.0, 46.0],
            "o_rice" => [45.0, 45.0],
            "h_rice" => [45.0, 46.0],
            "l_rice" => [45.0, 45.0],
            "c_rice" => [45.0, 46.0],
            "inflation_rice" => [0.1, 0.1],
            "trust_rice" => [10.0, 10.0],
            "o_food_price_index" => [45.0, 45.0],
            "h_food_price_index" => [45.0, 46.0],
            "l_food_price_index" => [45.0, 45.0],
            "c_food_price_index" => [45.0, 46.0],
            "inflation_food_price_index" => [0.1, 0.1],
            "trust_food_price_index" => [10.0, 10.0],
        ]
        .unwrap()
    }

    #[test]
    fn test_conformant_frame_passes() {
        let report = validate(&conformant_frame()).unwrap();
        assert!(
            report.is_conformant(),
            "unexpected violations: {:?}",
            report.violations()
        );
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_wrong_country_constant() {
        let mut df = conformant_frame();
        df.with_column(Column::new(
            geo::ISO3.into(),
            ["PHL", "IDN"].as_slice(),
        ))
        .unwrap();

        let report = validate(&df).unwrap();
        assert!(report.violations().iter().any(|v| v.contains("ISO3")));
        assert!(report.into_result().is_err());
    }

    #[test]
    fn test_month_out_of_range() {
        let mut df = conformant_frame();
        df.with_column(Column::new(time::MONTH.into(), [1i64, 13].as_slice()))
            .unwrap();

        let report = validate(&df).unwrap();
        assert!(report
            .violations()
            .iter()
            .any(|v| v.contains("month") && v.contains("[1, 12]")));
    }

    #[test]
    fn test_incomplete_derived_set() {
        let df = conformant_frame().drop("trust_rice").unwrap();
        let report = validate(&df).unwrap();
        assert!(report
            .violations()
            .iter()
            .any(|v| v.contains("trust_rice") && v.contains("incomplete")));
    }

    #[test]
    fn test_trust_out_of_range() {
        let mut df = conformant_frame();
        df.with_column(Column::new(
            "trust_rice".into(),
            [10.0, 11.0].as_slice(),
        ))
        .unwrap();

        let report = validate(&df).unwrap();
        assert!(report
            .violations()
            .iter()
            .any(|v| v.contains("trust_rice") && v.contains("[1, 10]")));
    }

    #[test]
    fn test_missing_required_column() {
        let df = conformant_frame().drop(meta::CURRENCY).unwrap();
        let report = validate(&df).unwrap();
        assert!(report
            .violations()
            .iter()
            .any(|v| v.contains("currency") && v.contains("missing")));
    }

    #[test]
    fn test_interpolation_flag_outside_domain() {
        let mut df = conformant_frame();
        df.with_column(Column::new(
            meta::SPATIALLY_INTERPOLATED.into(),
            [0i64, 2].as_slice(),
        ))
        .unwrap();

        let report = validate(&df).unwrap();
        assert!(report
            .violations()
            .iter()
            .any(|v| v.contains("spatially_interpolated")));
    }
}
