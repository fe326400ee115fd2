//! Built-in field mappings, one per synced entity type.
//!
//! A mapping is a static table from destination column to source field
//! and coercion, optionally followed by a finish hook for derived
//! columns and domain validation. Config entities reference mappings
//! by name.

use regex::Regex;
use serde_json::{Value, json};
use std::sync::LazyLock;

use super::coerce::Coerce;
use crate::record::TransformedRecord;

/// One destination column derived from one source field.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub column: &'static str,
    pub source: &'static str,
    pub coerce: Coerce,
}

/// A static field mapping for one entity type.
pub struct Mapping {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
    /// Destination columns that must be present and non-empty after
    /// coercion (on top of the configured conflict key).
    pub required: &'static [&'static str],
    /// Optional hook for derived columns and domain validation, run
    /// after column coercion. Returns a rejection reason on failure and
    /// may push warning-level entries.
    pub finish: Option<fn(&mut TransformedRecord, &mut Vec<String>) -> Result<(), String>>,
}

/// Look up a built-in mapping by name.
pub fn lookup(name: &str) -> Option<&'static Mapping> {
    MAPPINGS.iter().find(|m| m.name == name)
}

static MAPPINGS: &[Mapping] = &[
    NVE_PRICES,
    ENOVA_CERTIFICATES,
    NOTION_CALCULATIONS,
    NOTION_FEATURE_FLAGS,
    NOTION_FORMULAS,
];

// ---------------------------------------------------------------------------
// NVE weekly electricity spot prices (CSV export, Norwegian locale)
// ---------------------------------------------------------------------------

/// Valid Norwegian electricity price zones.
const VALID_ZONES: &[&str] = &["NO1", "NO2", "NO3", "NO4", "NO5"];

/// Sane spot price bound in øre/kWh; out-of-range prices are imported
/// with a warning, not rejected.
const PRICE_RANGE: std::ops::RangeInclusive<f64> = 0.0..=1000.0;

const NVE_PRICES: Mapping = Mapping {
    name: "nve_prices",
    columns: &[
        ColumnSpec { column: "week", source: "Uke", coerce: Coerce::Text },
        ColumnSpec { column: "zone", source: "Område slicer", coerce: Coerce::Text },
        ColumnSpec {
            column: "spot_price_ore_kwh",
            source: "Gjennomsnitt Pris (øre/kWh)",
            coerce: Coerce::Float,
        },
        ColumnSpec { column: "data_source", source: "", coerce: Coerce::Const("NVE") },
        ColumnSpec {
            column: "source_url",
            source: "",
            coerce: Coerce::Const(
                "https://www.nve.no/energi/analyser-og-statistikk/kraftpriser-og-kraftsystemdata/",
            ),
        },
    ],
    required: &["week", "zone", "spot_price_ore_kwh"],
    finish: Some(finish_nve_prices),
};

/// Week identifiers come as "38-2025" (week number, then year).
static WEEK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})-(\d{4})$").expect("Invalid regex pattern"));

fn finish_nve_prices(
    record: &mut TransformedRecord,
    warnings: &mut Vec<String>,
) -> Result<(), String> {
    let week = record
        .get("week")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let captures = WEEK_PATTERN
        .captures(&week)
        .ok_or_else(|| format!("invalid week format '{week}'"))?;

    // Capture groups are digit-only by construction
    let week_number: u32 = captures[1].parse().map_err(|_| format!("invalid week format '{week}'"))?;
    let year: i32 = captures[2].parse().map_err(|_| format!("invalid week format '{week}'"))?;
    record.insert("week_number".to_string(), json!(week_number));
    record.insert("year".to_string(), json!(year));

    let zone = record
        .get("zone")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !VALID_ZONES.contains(&zone) {
        return Err(format!("invalid zone code '{zone}'"));
    }

    if let Some(price) = record.get("spot_price_ore_kwh").and_then(Value::as_f64)
        && !PRICE_RANGE.contains(&price)
    {
        warnings.push(format!(
            "price outside reasonable range: {price} øre/kWh (week {week}, zone {zone})"
        ));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Enova energy certificates (CSV export / SQLite lookup database)
// ---------------------------------------------------------------------------

const ENOVA_CERTIFICATES: Mapping = Mapping {
    name: "enova_certificates",
    columns: &[
        // Cadastre identifiers: registry exports use 0 for "unknown"
        ColumnSpec { column: "knr", source: "Knr", coerce: Coerce::IntZeroAbsent },
        ColumnSpec { column: "gnr", source: "Gnr", coerce: Coerce::IntZeroAbsent },
        ColumnSpec { column: "bnr", source: "Bnr", coerce: Coerce::IntZeroAbsent },
        ColumnSpec { column: "snr", source: "Snr", coerce: Coerce::IntZeroAbsent },
        ColumnSpec { column: "fnr", source: "Fnr", coerce: Coerce::IntZeroAbsent },
        ColumnSpec { column: "andelsnummer", source: "Andelsnummer", coerce: Coerce::Text },
        ColumnSpec { column: "building_number", source: "Bygningsnummer", coerce: Coerce::Text },
        ColumnSpec { column: "address", source: "GateAdresse", coerce: Coerce::Text },
        ColumnSpec { column: "postal_code", source: "Postnummer", coerce: Coerce::Text },
        ColumnSpec { column: "city", source: "Poststed", coerce: Coerce::Text },
        ColumnSpec { column: "unit_number", source: "BruksEnhetsNummer", coerce: Coerce::Text },
        ColumnSpec {
            column: "organization_number",
            source: "Organisasjonsnummer",
            coerce: Coerce::Text,
        },
        ColumnSpec {
            column: "building_category",
            source: "Bygningskategori",
            coerce: Coerce::Text,
        },
        ColumnSpec { column: "construction_year", source: "Byggear", coerce: Coerce::Int },
        ColumnSpec { column: "energy_class", source: "Energikarakter", coerce: Coerce::Text },
        ColumnSpec { column: "heating_class", source: "Oppvarmingskarakter", coerce: Coerce::Text },
        ColumnSpec { column: "issue_date", source: "Utstedelsesdato", coerce: Coerce::Timestamp },
        ColumnSpec { column: "certificate_type", source: "TypeRegistrering", coerce: Coerce::Text },
        ColumnSpec { column: "certificate_id", source: "Attestnummer", coerce: Coerce::Text },
        ColumnSpec {
            column: "energy_consumption",
            source: "BeregnetLevertEnergiTotaltkWhm2",
            coerce: Coerce::Float,
        },
        ColumnSpec {
            column: "fossil_percentage",
            source: "BeregnetFossilandel",
            coerce: Coerce::Percent,
        },
        ColumnSpec { column: "material_type", source: "Materialvalg", coerce: Coerce::Text },
        ColumnSpec {
            column: "has_energy_evaluation",
            source: "HarEnergiVurdering",
            coerce: Coerce::Bool,
        },
        ColumnSpec {
            column: "energy_evaluation_date",
            source: "EnergiVurderingDato",
            coerce: Coerce::Timestamp,
        },
    ],
    required: &[],
    finish: None,
};

// ---------------------------------------------------------------------------
// Notion config databases
// ---------------------------------------------------------------------------

const NOTION_CALCULATIONS: Mapping = Mapping {
    name: "notion_calculations",
    columns: &[
        ColumnSpec { column: "name", source: "Name", coerce: Coerce::Text },
        ColumnSpec { column: "value", source: "Value", coerce: Coerce::Float },
        ColumnSpec { column: "unit", source: "Unit", coerce: Coerce::Text },
        ColumnSpec { column: "category", source: "Category", coerce: Coerce::Text },
        ColumnSpec { column: "description", source: "Description", coerce: Coerce::Text },
        ColumnSpec { column: "min_value", source: "Min Value", coerce: Coerce::Float },
        ColumnSpec { column: "max_value", source: "Max Value", coerce: Coerce::Float },
    ],
    required: &["name"],
    finish: None,
};

const NOTION_FEATURE_FLAGS: Mapping = Mapping {
    name: "notion_feature_flags",
    columns: &[
        ColumnSpec { column: "feature_name", source: "Feature Name", coerce: Coerce::Text },
        ColumnSpec { column: "enabled", source: "Enabled", coerce: Coerce::Bool },
        ColumnSpec {
            column: "rollout_percentage",
            source: "Rollout %",
            coerce: Coerce::FloatOrZero,
        },
        ColumnSpec { column: "description", source: "Description", coerce: Coerce::Text },
    ],
    required: &["feature_name"],
    finish: None,
};

const NOTION_FORMULAS: Mapping = Mapping {
    name: "notion_formulas",
    columns: &[
        ColumnSpec { column: "name", source: "Name", coerce: Coerce::Text },
        ColumnSpec { column: "formula", source: "Formula", coerce: Coerce::Text },
        ColumnSpec { column: "variables", source: "Variables", coerce: Coerce::TextList },
        ColumnSpec { column: "description", source: "Description", coerce: Coerce::Text },
        ColumnSpec { column: "category", source: "Category", coerce: Coerce::Text },
    ],
    required: &["name"],
    finish: None,
};
