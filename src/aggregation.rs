//! Declarative consolidation of market-level rows into coarser series.
//!
//! Callers describe the aggregates they want; the engine partitions the
//! frame by group columns (one national row per month by default) and
//! rebuilds a keys + aggregates frame. Partitions see rows in `DATES`
//! order, so `first`/`last` follow the period open/close convention.

use polars::prelude::*;

use crate::error::FoodPriceError;
use crate::schema::time;

/// One declarative aggregate, executed per group by the engine.
#[derive(Debug, Clone)]
pub struct Aggregation {
    kind: AggKind,
}

#[derive(Debug, Clone)]
enum AggKind {
    First {
        column: String,
        alias: Option<String>,
    },
    Last {
        column: String,
        alias: Option<String>,
    },
    Min {
        column: String,
        alias: Option<String>,
    },
    Max {
        column: String,
        alias: Option<String>,
    },
    Sum {
        columns: Vec<String>,
    },
    Avg {
        columns: Vec<String>,
    },
    WeightedAvg {
        column: String,
        weight_column: String,
    },
    Concat {
        columns: Vec<String>,
        separator: String,
        unique: bool,
    },
}

impl Aggregation {
    pub fn first(column: String, alias: Option<String>) -> Self {
        Self {
            kind: AggKind::First { column, alias },
        }
    }

    pub fn last(column: String, alias: Option<String>) -> Self {
        Self {
            kind: AggKind::Last { column, alias },
        }
    }

    pub fn min(column: String, alias: Option<String>) -> Self {
        Self {
            kind: AggKind::Min { column, alias },
        }
    }

    pub fn max(column: String, alias: Option<String>) -> Self {
        Self {
            kind: AggKind::Max { column, alias },
        }
    }

    pub fn sum(columns: Vec<String>) -> Self {
        Self {
            kind: AggKind::Sum { columns },
        }
    }

    pub fn avg(columns: Vec<String>) -> Self {
        Self {
            kind: AggKind::Avg { columns },
        }
    }

    /// Average of `column` weighted by `weight_column`. Rows with a missing
    /// value are excluded from both sums.
    pub fn weighted_avg(column: String, weight_column: String) -> Self {
        Self {
            kind: AggKind::WeightedAvg {
                column,
                weight_column,
            },
        }
    }

    pub fn concat(columns: Vec<String>, separator: &str, unique: bool) -> Self {
        Self {
            kind: AggKind::Concat {
                columns,
                separator: separator.to_string(),
                unique,
            },
        }
    }
}

/// Apply a list of aggregations to a single group DataFrame.
pub fn apply_aggregations(
    group: &DataFrame,
    aggregations: &[Aggregation],
) -> Result<Vec<(String, AnyValue<'static>)>, FoodPriceError> {
    let mut results: Vec<(String, AnyValue<'static>)> = Vec::new();

    for agg in aggregations {
        match &agg.kind {
            AggKind::First { column, alias } => {
                let s = group.column(column)?.as_materialized_series();
                let name = alias.clone().unwrap_or_else(|| format!("{column}_first"));
                let val = s.get(0)?;
                results.push((name, val.into_static()));
            }
            AggKind::Last { column, alias } => {
                let s = group.column(column)?.as_materialized_series();
                let name = alias.clone().unwrap_or_else(|| format!("{column}_last"));
                let val = s.get(s.len().saturating_sub(1))?;
                results.push((name, val.into_static()));
            }
            AggKind::Min { column, alias } => {
                let s = group.column(column)?.as_materialized_series();
                let name = alias.clone().unwrap_or_else(|| format!("{column}_min"));
                let val = s.min_reduce()?;
                let f = val.value().try_extract::<f64>().unwrap_or(f64::NAN);
                results.push((name, AnyValue::Float64(f)));
            }
            AggKind::Max { column, alias } => {
                let s = group.column(column)?.as_materialized_series();
                let name = alias.clone().unwrap_or_else(|| format!("{column}_max"));
                let val = s.max_reduce()?;
                let f = val.value().try_extract::<f64>().unwrap_or(f64::NAN);
                results.push((name, AnyValue::Float64(f)));
            }
            AggKind::Sum { columns } => {
                for col in columns {
                    let s = group.column(col)?.as_materialized_series();
                    let val = s.sum_reduce()?;
                    let f = val.value().try_extract::<f64>().unwrap_or(0.0);
                    results.push((format!("{col}_sum"), AnyValue::Float64(f)));
                }
            }
            AggKind::Avg { columns } => {
                for col in columns {
                    let s = group.column(col)?.as_materialized_series();
                    let mean = s.mean_reduce();
                    let f = mean.value().try_extract::<f64>().unwrap_or(f64::NAN);
                    results.push((format!("{col}_avg"), AnyValue::Float64(f)));
                }
            }
            AggKind::WeightedAvg {
                column,
                weight_column,
            } => {
                let v = group
                    .column(column)?
                    .as_materialized_series()
                    .cast(&DataType::Float64)?;
                let v = v.f64()?;
                let w = group
                    .column(weight_column)?
                    .as_materialized_series()
                    .cast(&DataType::Float64)?;
                let w = w.f64()?;

                let mut sum_vw: f64 = 0.0;
                let mut sum_w: f64 = 0.0;
                for i in 0..group.height() {
                    if let Some(value) = v.get(i) {
                        let weight = w.get(i).unwrap_or(0.0);
                        sum_vw += value * weight;
                        sum_w += weight;
                    }
                }

                let result = if sum_w > 0.0 {
                    AnyValue::Float64(sum_vw / sum_w)
                } else {
                    AnyValue::Null
                };
                results.push((format!("{column}_weighted_avg"), result));
            }
            AggKind::Concat {
                columns,
                separator,
                unique,
            } => {
                for col in columns {
                    let s = group.column(col)?.as_materialized_series();
                    let vals: Vec<String> = s
                        .iter()
                        .filter_map(|v| match v {
                            AnyValue::Null => None,
                            AnyValue::String(s) => Some(s.to_string()),
                            AnyValue::StringOwned(s) => Some(s.to_string()),
                            other => Some(format!("{other}")),
                        })
                        .collect();
                    let result = if *unique {
                        let mut seen = std::collections::HashSet::new();
                        vals.into_iter()
                            .filter(|v| seen.insert(v.clone()))
                            .collect::<Vec<_>>()
                            .join(separator)
                    } else {
                        vals.join(separator)
                    };
                    results.push((col.clone(), AnyValue::StringOwned(result.into())));
                }
            }
        }
    }

    Ok(results)
}

/// Consolidate the frame into one row per group.
///
/// `group_by` defaults to (`year`, `month`). The frame is sorted by `DATES`
/// first when that column is present, then partitioned, aggregated and
/// rebuilt as group keys + aggregate columns, sorted by the group keys.
pub fn consolidate(
    df: &DataFrame,
    aggregations: &[Aggregation],
    group_by: Option<Vec<String>>,
) -> Result<DataFrame, FoodPriceError> {
    let group_cols =
        group_by.unwrap_or_else(|| vec![time::YEAR.to_string(), time::MONTH.to_string()]);

    let sorted = if df.column(time::DATES).is_ok() {
        df.sort([time::DATES], SortMultipleOptions::default())?
    } else {
        df.clone()
    };

    let partitions = sorted.partition_by(group_cols.as_slice(), true)?;
    if partitions.is_empty() {
        return Ok(sorted);
    }

    let sample_results = apply_aggregations(&partitions[0], aggregations)?;
    let agg_names: Vec<String> = sample_results.iter().map(|(name, _)| name.clone()).collect();

    // Group keys: take first row of each partition
    let mut key_columns: Vec<Vec<AnyValue>> = vec![vec![]; group_cols.len()];
    let mut agg_columns: Vec<Vec<AnyValue>> = vec![vec![]; agg_names.len()];

    for partition in &partitions {
        for (i, gc) in group_cols.iter().enumerate() {
            let val = partition.column(gc)?.get(0)?;
            key_columns[i].push(val.into_static());
        }

        let results = apply_aggregations(partition, aggregations)?;
        for (i, (_name, val)) in results.into_iter().enumerate() {
            agg_columns[i].push(val);
        }
    }

    let mut columns: Vec<Column> = Vec::new();
    for (i, gc) in group_cols.iter().enumerate() {
        let series = Series::from_any_values(gc.as_str().into(), &key_columns[i], true)?;
        columns.push(series.into());
    }
    for (i, name) in agg_names.iter().enumerate() {
        let series = Series::from_any_values(name.as_str().into(), &agg_columns[i], true)?;
        columns.push(series.into());
    }

    let result = DataFrame::new(columns)?;
    let result = result.sort(group_cols, SortMultipleOptions::default())?;
    Ok(result)
}
