//! The index aggregator: densifies sparse per-commodity observations into
//! monthly OHLC series, computes the trailing inflation rate and its trust
//! score, and aggregates everything into the composite index columns.
//!
//! All window logic runs per `geo_id` series in `DATES` order. The close is
//! the raw observation when present, otherwise the last close carried
//! forward; the open is the previous close; high/low are the envelope of
//! open and close.

use polars::prelude::*;
use tracing::info;

use crate::config::DeriveConfig;
use crate::error::FoodPriceError;
use crate::schema::{self, geo, meta, time, Metric};

/// Derive the full set of per-commodity and composite index columns.
///
/// Expects `convert_types` to have run: `DATES` as datetime, prices as
/// floats. Commodities without a column in the frame are skipped.
pub fn derive_price_indices(
    df: &DataFrame,
    config: &DeriveConfig,
) -> Result<DataFrame, FoodPriceError> {
    for required in [geo::GEO_ID, time::DATES] {
        if df.column(required).is_err() {
            return Err(FoodPriceError::MissingColumn(required.to_string()));
        }
    }

    let commodities: Vec<&str> = schema::COMMODITIES
        .iter()
        .copied()
        .filter(|c| df.column(c).is_ok())
        .collect();
    if commodities.is_empty() {
        return Err(FoodPriceError::InvalidData(
            "No commodity price columns to derive from".to_string(),
        ));
    }

    let lag = config.inflation_lag_months as i64;
    let confidence = if config.confidence_damping && df.column(meta::INDEX_CONFIDENCE_SCORE).is_ok()
    {
        col(meta::INDEX_CONFIDENCE_SCORE).cast(DataType::Float64)
    } else {
        lit(1.0)
    };

    let sorted = df.sort([geo::GEO_ID, time::DATES], SortMultipleOptions::default())?;
    let by_series = [col(geo::GEO_ID)];

    // Stage 1: closes (raw observation, else carry-forward within the series).
    let closes: Vec<Expr> = commodities
        .iter()
        .map(|c| {
            col(*c)
                .cast(DataType::Float64)
                .fill_null_with_strategy(FillNullStrategy::Forward(None))
                .over(by_series.clone())
                .alias(Metric::Close.column(c))
        })
        .collect();

    // Stage 2: opens (previous close; first observed period opens at its close).
    let opens: Vec<Expr> = commodities
        .iter()
        .map(|c| {
            let close = col(Metric::Close.column(c));
            let prev = close.clone().shift(lit(1)).over(by_series.clone());
            when(prev.clone().is_null())
                .then(close)
                .otherwise(prev)
                .alias(Metric::Open.column(c))
        })
        .collect();

    // Stage 3: high/low envelope of open and close.
    let mut envelopes: Vec<Expr> = Vec::with_capacity(commodities.len() * 2);
    for c in &commodities {
        let open = col(Metric::Open.column(c));
        let close = col(Metric::Close.column(c));
        envelopes.push(pair_max(open.clone(), close.clone()).alias(Metric::High.column(c)));
        envelopes.push(pair_min(open, close).alias(Metric::Low.column(c)));
    }

    // Stage 4: trailing inflation, as the fraction (c_t − c_{t−lag}) / c_{t−lag}.
    let inflations: Vec<Expr> = commodities
        .iter()
        .map(|c| {
            let close = col(Metric::Close.column(c));
            let lagged = close.clone().shift(lit(lag)).over(by_series.clone());
            when(lagged.clone().gt(lit(0.0)))
                .then((close - lagged.clone()) / lagged)
                .otherwise(lit(NULL))
                .alias(Metric::Inflation.column(c))
        })
        .collect();

    // Stage 5: trust scores in [1, 10] for the inflation figures.
    let trusts: Vec<Expr> = commodities
        .iter()
        .map(|c| {
            let observed = col(*c).cast(DataType::Float64).is_not_null();
            let observed_lagged = observed
                .clone()
                .shift(lit(lag))
                .over(by_series.clone());
            let support = (observed.cast(DataType::Float64)
                + observed_lagged.cast(DataType::Float64))
                / lit(2.0);

            let score = lit(10.0) * confidence.clone() * support + lit(0.5);
            let rounded = score.cast(DataType::Int64);
            let clamped = when(rounded.clone().lt(lit(1)))
                .then(lit(1))
                .when(rounded.clone().gt(lit(10)))
                .then(lit(10))
                .otherwise(rounded)
                .cast(DataType::Float64);

            when(col(Metric::Inflation.column(c)).is_null())
                .then(lit(NULL))
                .otherwise(clamped)
                .alias(Metric::Trust.column(c))
        })
        .collect();

    // Stage 6: composite indices as weight-renormalised averages over the
    // commodities present in each row.
    let mut composites: Vec<Expr> = Vec::with_capacity(Metric::ALL.len() + 1);
    for metric in Metric::ALL {
        let mut numerator: Option<Expr> = None;
        let mut denominator: Option<Expr> = None;
        for c in &commodities {
            let value = col(metric.column(c));
            let weight = schema::index_weight(c);
            let contribution = value.clone().fill_null(lit(0.0)) * lit(weight);
            let presence = value.is_not_null().cast(DataType::Float64) * lit(weight);
            numerator = Some(match numerator {
                Some(acc) => acc + contribution,
                None => contribution,
            });
            denominator = Some(match denominator {
                Some(acc) => acc + presence,
                None => presence,
            });
        }
        // commodities is non-empty, so both sides exist
        let (num, den) = (numerator.unwrap(), denominator.unwrap());
        composites.push(
            when(den.clone().gt(lit(0.0)))
                .then(num / den)
                .otherwise(lit(NULL))
                .alias(metric.index_column()),
        );
    }
    composites.push(lit(schema::components_breakdown()).alias(meta::COMPONENTS));

    let out = sorted
        .lazy()
        .with_columns(closes)
        .with_columns(opens)
        .with_columns(envelopes)
        .with_columns(inflations)
        .with_columns(trusts)
        .with_columns(composites)
        .collect()?;

    info!(
        commodities = commodities.len(),
        lag_months = lag,
        "derived OHLC, inflation, trust and composite index columns"
    );
    Ok(out)
}

/// Null-tolerant elementwise max of two expressions.
fn pair_max(a: Expr, b: Expr) -> Expr {
    when(a.clone().is_null())
        .then(b.clone())
        .when(b.clone().is_null())
        .then(a.clone())
        .when(a.clone().gt(b.clone()))
        .then(a)
        .otherwise(b)
}

/// Null-tolerant elementwise min of two expressions.
fn pair_min(a: Expr, b: Expr) -> Expr {
    when(a.clone().is_null())
        .then(b.clone())
        .when(b.clone().is_null())
        .then(a.clone())
        .when(a.clone().lt(b.clone()))
        .then(a)
        .otherwise(b)
}
