//! End-to-end pipeline test: a sparse raw CSV goes through load, type
//! conversion, preprocessing and index derivation, and the processed file
//! round-trips through the schema conformance checks.

use std::collections::HashMap;
use std::path::Path;

use food_price_index::schema::{self, geo, meta, time, Metric};
use food_price_index::{Aggregation, FoodPriceModel, PipelineConfig};

const MONTHS: usize = 14; // 2024-01 .. 2025-02

fn month_date(index: usize) -> (String, i32, i32) {
    let year = 2024 + index as i32 / 12;
    let month = index as i32 % 12 + 1;
    (format!("{year}-{month:02}-01"), year, month)
}

fn header() -> String {
    let mut cols: Vec<&str> = Vec::new();
    cols.extend(geo::ALL);
    cols.extend(time::ALL);
    cols.extend(meta::ALL);
    cols.extend(schema::COMMODITIES);
    cols.join(",")
}

fn row(
    market: &str,
    geo_id: &str,
    lat: f64,
    lon: f64,
    index: usize,
    prices: &HashMap<&str, f64>,
) -> String {
    let (date, year, month) = month_date(index);
    let mut fields = vec![
        "PHL".to_string(),
        "Philippines".to_string(),
        "NCR".to_string(),
        "Metro Manila".to_string(),
        market.to_string(),
        lat.to_string(),
        lon.to_string(),
        geo_id.to_string(),
        date,
        year.to_string(),
        month.to_string(),
        "PHP".to_string(),
        String::new(), // components, filled by the pipeline
        "2007-01-01".to_string(),
        "2025-05-01".to_string(),
        "20.71".to_string(),
        "40.18".to_string(),
        "0.98".to_string(),
        "0".to_string(),
    ];
    for commodity in schema::COMMODITIES {
        match prices.get(commodity) {
            Some(price) => fields.push(price.to_string()),
            None => fields.push(String::new()),
        }
    }
    fields.join(",")
}

/// Two markets over 14 months with sparse observations. Rice is observed
/// twelve months apart at 45.00 and 49.50 in Divisoria, which must yield a
/// 10% inflation figure.
fn write_raw_csv(dir: &Path) {
    let mut lines = vec![header()];

    for index in 0..MONTHS {
        let mut divisoria: HashMap<&str, f64> = HashMap::new();
        let mut quiapo: HashMap<&str, f64> = HashMap::new();

        match index {
            0 => {
                divisoria.insert("rice", 45.0);
                divisoria.insert("corn_white", 30.0);
                divisoria.insert("garlic", 120.0);
                quiapo.insert("rice", 44.0);
            }
            1 => {
                quiapo.insert("corn_white", 31.0);
            }
            6 => {
                divisoria.insert("rice", 46.0);
            }
            12 => {
                divisoria.insert("rice", 49.5);
                divisoria.insert("garlic", 130.0);
                quiapo.insert("rice", 48.4);
            }
            _ => {}
        }

        lines.push(row("Divisoria", "g1", 14.60, 120.97, index, &divisoria));
        lines.push(row("Quiapo", "g2", 14.59, 120.98, index, &quiapo));
    }

    std::fs::write(dir.join("food-prices.csv"), lines.join("\n") + "\n").unwrap();
}

fn column_f64(df: &polars::prelude::DataFrame, name: &str) -> Vec<Option<f64>> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .f64()
        .unwrap()
        .into_iter()
        .collect()
}

#[test]
fn full_pipeline_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    write_raw_csv(dir.path());

    let config = PipelineConfig::default();

    let mut model = FoodPriceModel::new(dir.path());
    model.load_observations(None).unwrap();
    let processed_path = model.run(&config).unwrap();
    assert_eq!(
        processed_path.file_name().unwrap().to_str().unwrap(),
        "food-prices_processed.csv"
    );

    // The processed frame carries the complete documented column set:
    // 19 identifier/metadata columns, 73 base prices, 3 calendar features,
    // 73 x 6 derived columns and 6 composite indices.
    let df = model.observations().unwrap();
    assert_eq!(df.width(), 19 + 73 + 3 + 73 * 6 + 6);
    assert_eq!(df.height(), 2 * MONTHS);

    // Reload the processed file and check schema conformance on the typed frame.
    let mut reloaded = FoodPriceModel::new(dir.path());
    reloaded
        .load_observations(Some("food-prices_processed.csv"))
        .unwrap();
    reloaded.convert_types(&config.dataset.date_format).unwrap();

    let report = reloaded.validate().unwrap();
    assert!(
        report.is_conformant(),
        "violations: {:?}",
        report.violations()
    );

    // The worked inflation example: closes 45.00 and 49.50 twelve months
    // apart give a 10% rise, fully backed by direct observations.
    let divisoria = reloaded.market_observations("Divisoria").unwrap();
    let divisoria = divisoria
        .sort(
            [time::DATES.to_string()],
            polars::prelude::SortMultipleOptions::default(),
        )
        .unwrap();
    let inflation = column_f64(&divisoria, "inflation_rice");
    assert!((inflation[12].unwrap() - 0.10).abs() < 1e-9);
    for value in &inflation[..12] {
        assert!(value.is_none());
    }
    let trust = column_f64(&divisoria, "trust_rice");
    assert_eq!(trust[12], Some(10.0));

    // Composite close index in the first month is the simple mean of the
    // three observed commodities (uniform weights).
    let close_index = column_f64(&divisoria, Metric::Close.index_column());
    assert_eq!(close_index[0], Some((45.0 + 30.0 + 120.0) / 3.0));

    // Carried-forward closes keep the series dense after the first observation.
    let close = column_f64(&divisoria, "c_rice");
    assert_eq!(close[1], Some(45.0));
    assert_eq!(close[11], Some(46.0));

    // The components breakdown is stamped onto every row.
    let components = divisoria
        .column(meta::COMPONENTS)
        .unwrap()
        .as_materialized_series()
        .str()
        .unwrap()
        .get(0)
        .unwrap()
        .to_string();
    assert!(components.starts_with("rice:1, corn_white:1"));

    // Calendar features came through the round trip.
    let quarters = divisoria.column(schema::features::QUARTER).unwrap();
    assert_eq!(quarters.null_count(), 0);
    assert_eq!(
        quarters.dtype(),
        &polars::prelude::DataType::Int64
    );
}

#[test]
fn consolidates_markets_into_national_series() {
    let dir = tempfile::tempdir().unwrap();
    write_raw_csv(dir.path());

    let config = PipelineConfig::default();
    let mut model = FoodPriceModel::new(dir.path());
    model.load_observations(None).unwrap();
    model.run(&config).unwrap();

    let aggs = vec![
        Aggregation::avg(vec!["c_rice".to_string()]),
        Aggregation::concat(vec![geo::MKT_NAME.to_string()], ", ", true),
    ];
    let national = food_price_index::aggregation::consolidate(
        model.observations().unwrap(),
        &aggs,
        None,
    )
    .unwrap();

    // One row per month, both markets folded in.
    assert_eq!(national.height(), MONTHS);
    let markets = national
        .column(geo::MKT_NAME)
        .unwrap()
        .as_materialized_series()
        .str()
        .unwrap()
        .get(0)
        .unwrap()
        .to_string();
    assert!(markets.contains("Divisoria") && markets.contains("Quiapo"));

    // First month: both markets have observed rice closes.
    let avg = column_f64(&national, "c_rice_avg");
    assert_eq!(avg[0], Some((45.0 + 44.0) / 2.0));
}
