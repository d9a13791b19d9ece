//! Column-name constants for the food-price dataset schema.
//! Single source of truth - readers and writers must reproduce these verbatim.

use std::collections::BTreeMap;

// ── Geographic columns ──────────────────────────────────────────────────────
pub mod geo {
    pub const ISO3: &str = "ISO3";
    pub const COUNTRY: &str = "country";
    pub const ADM1_NAME: &str = "adm1_name";
    pub const ADM2_NAME: &str = "adm2_name";
    pub const MKT_NAME: &str = "mkt_name";
    pub const LAT: &str = "lat";
    pub const LON: &str = "lon";
    pub const GEO_ID: &str = "geo_id";

    pub const ALL: [&str; 8] = [
        ISO3, COUNTRY, ADM1_NAME, ADM2_NAME, MKT_NAME, LAT, LON, GEO_ID,
    ];
}

// ── Temporal columns ────────────────────────────────────────────────────────
pub mod time {
    pub const DATES: &str = "DATES";
    pub const YEAR: &str = "year";
    pub const MONTH: &str = "month";

    pub const ALL: [&str; 3] = [DATES, YEAR, MONTH];
}

// ── Metadata and quality columns ────────────────────────────────────────────
pub mod meta {
    pub const CURRENCY: &str = "currency";
    pub const COMPONENTS: &str = "components";
    pub const START_DENSE_DATA: &str = "start_dense_data";
    pub const LAST_SURVEY_POINT: &str = "last_survey_point";
    pub const DATA_COVERAGE: &str = "data_coverage";
    pub const DATA_COVERAGE_RECENT: &str = "data_coverage_recent";
    pub const INDEX_CONFIDENCE_SCORE: &str = "index_confidence_score";
    pub const SPATIALLY_INTERPOLATED: &str = "spatially_interpolated";

    pub const ALL: [&str; 8] = [
        CURRENCY,
        COMPONENTS,
        START_DENSE_DATA,
        LAST_SURVEY_POINT,
        DATA_COVERAGE,
        DATA_COVERAGE_RECENT,
        INDEX_CONFIDENCE_SCORE,
        SPATIALLY_INTERPOLATED,
    ];
}

// ── Calendar feature columns (added by preprocessing) ───────────────────────
pub mod features {
    pub const QUARTER: &str = "quarter";
    pub const YEAR_MONTH: &str = "year_month";
    pub const DAYS_SINCE_START: &str = "days_since_start";

    pub const ALL: [&str; 3] = [QUARTER, YEAR_MONTH, DAYS_SINCE_START];
}

// ── Expected constant values for this dataset snapshot ──────────────────────
pub mod expected {
    pub const ISO3: &str = "PHL";
    pub const COUNTRY: &str = "Philippines";
    pub const CURRENCY: &str = "PHP";
    pub const DATA_COVERAGE: f64 = 20.71;
    pub const DATA_COVERAGE_RECENT: f64 = 40.18;
    pub const INDEX_CONFIDENCE_SCORE: f64 = 0.98;
    pub const SPATIALLY_INTERPOLATED: i64 = 0;
    pub const YEAR_MIN: i64 = 2007;
    pub const YEAR_MAX: i64 = 2025;
}

/// Derived-metric kind. Each commodity carries one column per metric,
/// prefixed; each metric also has one composite index column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    Open,
    High,
    Low,
    Close,
    Inflation,
    Trust,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Open,
        Metric::High,
        Metric::Low,
        Metric::Close,
        Metric::Inflation,
        Metric::Trust,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            Metric::Open => "o_",
            Metric::High => "h_",
            Metric::Low => "l_",
            Metric::Close => "c_",
            Metric::Inflation => "inflation_",
            Metric::Trust => "trust_",
        }
    }

    /// Derived column name for one commodity, e.g. `o_rice`.
    pub fn column(&self, commodity: &str) -> String {
        format!("{}{}", self.prefix(), commodity)
    }

    /// Composite index column name, e.g. `inflation_food_price_index`.
    pub fn index_column(&self) -> &'static str {
        match self {
            Metric::Open => "o_food_price_index",
            Metric::High => "h_food_price_index",
            Metric::Low => "l_food_price_index",
            Metric::Close => "c_food_price_index",
            Metric::Inflation => "inflation_food_price_index",
            Metric::Trust => "trust_food_price_index",
        }
    }
}

// ── Commodity registry ──────────────────────────────────────────────────────

/// The 73 base commodities tracked by the dataset, in column order.
pub const COMMODITIES: [&str; 73] = [
    "rice",
    "corn_white",
    "corn_yellow",
    "bread",
    "flour_wheat",
    "noodles_instant",
    "oats",
    "meat_beef",
    "meat_pork",
    "meat_chicken",
    "meat_goat",
    "meat_carabao",
    "eggs",
    "fish_bangus",
    "fish_tilapia",
    "fish_galunggong",
    "fish_tuna",
    "fish_dried",
    "shrimp",
    "squid",
    "milk_evaporated",
    "milk_condensed",
    "milk_powder",
    "cheese",
    "oil_palm",
    "oil_coconut",
    "oil_vegetable",
    "margarine",
    "sugar_brown",
    "sugar_white",
    "salt",
    "soy_sauce",
    "vinegar",
    "fish_sauce",
    "banana_lakatan",
    "banana_latundan",
    "banana_saba",
    "mango",
    "papaya",
    "pineapple",
    "calamansi",
    "orange",
    "apple",
    "avocado",
    "watermelon",
    "coconut",
    "tomato",
    "onion_red",
    "onion_white",
    "garlic",
    "ginger",
    "cabbage",
    "carrot",
    "potato",
    "sweet_potato",
    "cassava",
    "taro",
    "eggplant",
    "squash",
    "chayote",
    "ampalaya",
    "okra",
    "string_beans",
    "pechay",
    "kangkong",
    "lettuce",
    "bell_pepper",
    "mung_beans",
    "peanuts",
    "beans_dried",
    "tofu",
    "chili",
    "cucumber",
];

/// Every commodity is surveyed per kilogram.
pub const COMMODITY_UNIT: &str = "1 KG";

/// Index weights are uniform in this snapshot, which makes the composite
/// index a simple mean whenever all components are present.
pub const INDEX_WEIGHT: f64 = 1.0;

/// Contribution weight of a commodity in the composite index.
pub fn index_weight(_commodity: &str) -> f64 {
    INDEX_WEIGHT
}

/// The six derived column names for one commodity, in metric order.
pub fn derived_columns(commodity: &str) -> [String; 6] {
    [
        Metric::Open.column(commodity),
        Metric::High.column(commodity),
        Metric::Low.column(commodity),
        Metric::Close.column(commodity),
        Metric::Inflation.column(commodity),
        Metric::Trust.column(commodity),
    ]
}

/// Render the `components` metadata string: `rice:1, corn_white:1, ...`.
pub fn components_breakdown() -> String {
    COMMODITIES
        .iter()
        .map(|c| {
            let w = index_weight(c);
            if w.fract() == 0.0 {
                format!("{}:{}", c, w as i64)
            } else {
                format!("{}:{}", c, w)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Column grouping ─────────────────────────────────────────────────────────

/// Headers of a dataset file, categorized into the documented groups.
#[derive(Debug, Default)]
pub struct ColumnGroups {
    pub geographic: Vec<String>,
    pub temporal: Vec<String>,
    pub metadata: Vec<String>,
    /// Base commodity price columns (no prefix).
    pub base_prices: Vec<String>,
    /// Per-commodity derived columns, keyed by metric.
    pub derived: BTreeMap<Metric, Vec<String>>,
    /// Composite `*_food_price_index` columns, keyed by metric.
    pub composite: BTreeMap<Metric, Vec<String>>,
}

impl ColumnGroups {
    pub fn derived_count(&self) -> usize {
        self.derived.values().map(Vec::len).sum()
    }
}

/// Categorize an arbitrary header list into column groups.
///
/// A header with a metric prefix lands in `derived`, or in `composite` when
/// it ends with `_index`. Calendar feature columns are recognized and
/// excluded from the base price group.
pub fn identify_column_groups(headers: &[String]) -> ColumnGroups {
    let mut groups = ColumnGroups::default();

    for header in headers {
        let name = header.as_str();

        if geo::ALL.contains(&name) {
            groups.geographic.push(header.clone());
            continue;
        }
        if time::ALL.contains(&name) {
            groups.temporal.push(header.clone());
            continue;
        }
        if meta::ALL.contains(&name) {
            groups.metadata.push(header.clone());
            continue;
        }
        if features::ALL.contains(&name) {
            continue;
        }

        match Metric::ALL.iter().find(|m| name.starts_with(m.prefix())) {
            Some(metric) => {
                if name.ends_with("_index") {
                    groups.composite.entry(*metric).or_default().push(header.clone());
                } else {
                    groups.derived.entry(*metric).or_default().push(header.clone());
                }
            }
            None => groups.base_prices.push(header.clone()),
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commodity_registry_is_complete() {
        assert_eq!(COMMODITIES.len(), 73);

        // No commodity name may collide with a metric prefix or a fixed column.
        for c in COMMODITIES {
            for m in Metric::ALL {
                assert!(!c.starts_with(m.prefix()), "{c} collides with {:?}", m);
            }
            assert!(!geo::ALL.contains(&c));
            assert!(!time::ALL.contains(&c));
            assert!(!meta::ALL.contains(&c));
        }
    }

    #[test]
    fn test_derived_columns_for_commodity() {
        let cols = derived_columns("rice");
        assert_eq!(
            cols,
            [
                "o_rice",
                "h_rice",
                "l_rice",
                "c_rice",
                "inflation_rice",
                "trust_rice"
            ]
        );
    }

    #[test]
    fn test_full_derived_set_is_unique() {
        let mut names: Vec<String> = COMMODITIES
            .iter()
            .flat_map(|c| derived_columns(c))
            .collect();
        names.extend(Metric::ALL.iter().map(|m| m.index_column().to_string()));

        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(total, 73 * 6 + 6);
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_components_breakdown_format() {
        let breakdown = components_breakdown();
        assert!(breakdown.starts_with("rice:1, corn_white:1"));
        assert_eq!(breakdown.matches(':').count(), 73);
    }

    #[test]
    fn test_identify_column_groups() {
        let headers: Vec<String> = [
            "ISO3",
            "country",
            "DATES",
            "year",
            "month",
            "currency",
            "rice",
            "onion_red",
            "o_rice",
            "h_rice",
            "inflation_rice",
            "trust_rice",
            "c_food_price_index",
            "quarter",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let groups = identify_column_groups(&headers);
        assert_eq!(groups.geographic, vec!["ISO3", "country"]);
        assert_eq!(groups.temporal, vec!["DATES", "year", "month"]);
        assert_eq!(groups.metadata, vec!["currency"]);
        assert_eq!(groups.base_prices, vec!["rice", "onion_red"]);
        assert_eq!(groups.derived[&Metric::Open], vec!["o_rice"]);
        assert_eq!(groups.derived[&Metric::Inflation], vec!["inflation_rice"]);
        assert_eq!(groups.composite[&Metric::Close], vec!["c_food_price_index"]);
        assert_eq!(groups.derived_count(), 4);
    }
}
