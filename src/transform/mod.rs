//! Per-record transformation and validation.
//!
//! `transform` is a pure function from one raw record to either a
//! destination-shaped record (possibly with warnings) or a rejection
//! with a human-readable reason. It performs no I/O and holds no shared
//! state, so records may be transformed concurrently.

pub mod coerce;
pub mod mappings;

pub use mappings::Mapping;

use crate::record::{RawRecord, TransformedRecord, is_empty_value};

/// Outcome of transforming one raw record.
#[derive(Debug)]
pub enum TransformOutcome {
    /// The record is destination-ready. Warnings are advisory entries
    /// for the run report (e.g. suspicious but importable values).
    Record {
        record: TransformedRecord,
        warnings: Vec<String>,
    },
    /// The record failed validation and is counted, not written.
    Rejected { reason: String },
}

/// Transform one raw record according to a mapping.
///
/// A record missing any field needed to form the conflict key, or any
/// field the mapping marks as required, is rejected rather than
/// silently dropped. Absent optional fields are omitted from the
/// result, never set to null, preserving partial-update semantics at
/// the destination.
pub fn transform(
    raw: &RawRecord,
    mapping: &Mapping,
    conflict_key: &[String],
) -> TransformOutcome {
    let mut record = TransformedRecord::new();

    for spec in mapping.columns {
        let value = coerce::apply(raw.get(spec.source), spec.coerce);
        if !value.is_null() {
            record.insert(spec.column.to_string(), value);
        }
    }

    let required = mapping
        .required
        .iter()
        .copied()
        .chain(conflict_key.iter().map(String::as_str));
    for column in required {
        let missing = record.get(column).is_none_or(is_empty_value);
        if missing {
            return TransformOutcome::Rejected {
                reason: format!("missing required field '{column}'"),
            };
        }
    }

    let mut warnings = Vec::new();
    if let Some(finish) = mapping.finish
        && let Err(reason) = finish(&mut record, &mut warnings)
    {
        return TransformOutcome::Rejected { reason };
    }

    TransformOutcome::Record { record, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn raw(fields: &[(&str, Value)]) -> RawRecord {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn price_key() -> Vec<String> {
        vec!["week".to_string(), "zone".to_string()]
    }

    fn prices() -> &'static Mapping {
        mappings::lookup("nve_prices").unwrap()
    }

    #[test]
    fn test_valid_price_row() {
        let row = raw(&[
            ("Uke", json!("38-2025")),
            ("Område slicer", json!("NO1")),
            ("Gjennomsnitt Pris (øre/kWh)", json!("45,2")),
        ]);

        match transform(&row, prices(), &price_key()) {
            TransformOutcome::Record { record, warnings } => {
                assert_eq!(record["year"], json!(2025));
                assert_eq!(record["week_number"], json!(38));
                assert_eq!(record["zone"], json!("NO1"));
                assert_eq!(record["spot_price_ore_kwh"], json!(45.2));
                assert_eq!(record["data_source"], json!("NVE"));
                assert!(warnings.is_empty());
            }
            TransformOutcome::Rejected { reason } => panic!("rejected: {reason}"),
        }
    }

    #[test]
    fn test_invalid_zone_rejected() {
        let row = raw(&[
            ("Uke", json!("38-2025")),
            ("Område slicer", json!("NO9")),
            ("Gjennomsnitt Pris (øre/kWh)", json!("45,2")),
        ]);

        match transform(&row, prices(), &price_key()) {
            TransformOutcome::Rejected { reason } => {
                assert!(reason.contains("NO9"), "reason: {reason}");
            }
            TransformOutcome::Record { .. } => panic!("should be rejected"),
        }
    }

    #[test]
    fn test_missing_conflict_key_field_rejected() {
        // Never a partial record: missing zone must reject, with a reason
        let row = raw(&[
            ("Uke", json!("38-2025")),
            ("Gjennomsnitt Pris (øre/kWh)", json!("45,2")),
        ]);

        match transform(&row, prices(), &price_key()) {
            TransformOutcome::Rejected { reason } => {
                assert!(reason.contains("zone"), "reason: {reason}");
            }
            TransformOutcome::Record { .. } => panic!("should be rejected"),
        }
    }

    #[test]
    fn test_empty_required_field_rejected() {
        let row = raw(&[
            ("Uke", json!("")),
            ("Område slicer", json!("NO1")),
            ("Gjennomsnitt Pris (øre/kWh)", json!("45,2")),
        ]);

        assert!(matches!(
            transform(&row, prices(), &price_key()),
            TransformOutcome::Rejected { .. }
        ));
    }

    #[test]
    fn test_invalid_week_format_rejected() {
        let row = raw(&[
            ("Uke", json!("2025/38")),
            ("Område slicer", json!("NO1")),
            ("Gjennomsnitt Pris (øre/kWh)", json!("45,2")),
        ]);

        match transform(&row, prices(), &price_key()) {
            TransformOutcome::Rejected { reason } => {
                assert!(reason.contains("week format"), "reason: {reason}");
            }
            TransformOutcome::Record { .. } => panic!("should be rejected"),
        }
    }

    #[test]
    fn test_out_of_range_price_warns_but_imports() {
        let row = raw(&[
            ("Uke", json!("38-2025")),
            ("Område slicer", json!("NO3")),
            ("Gjennomsnitt Pris (øre/kWh)", json!("1500,0")),
        ]);

        match transform(&row, prices(), &price_key()) {
            TransformOutcome::Record { record, warnings } => {
                assert_eq!(record["spot_price_ore_kwh"], json!(1500.0));
                assert_eq!(warnings.len(), 1);
                assert!(warnings[0].contains("1500"));
            }
            TransformOutcome::Rejected { reason } => panic!("rejected: {reason}"),
        }
    }

    #[test]
    fn test_certificate_row_sparse_output() {
        let mapping = mappings::lookup("enova_certificates").unwrap();
        let key = vec!["certificate_id".to_string()];
        let row = raw(&[
            ("Knr", json!("0")),
            ("Gnr", json!("42")),
            ("GateAdresse", json!("Storgata 1")),
            ("Postnummer", json!("0155")),
            ("Poststed", json!("Oslo")),
            ("Attestnummer", json!("A-2024-001")),
            ("Byggear", json!("1986")),
            ("BeregnetFossilandel", json!("45")),
            ("HarEnergiVurdering", json!("Ja")),
            ("Utstedelsesdato", json!("2024-03-01T12:30:00.000Z")),
            ("Energikarakter", json!("")),
        ]);

        match transform(&row, mapping, &key) {
            TransformOutcome::Record { record, .. } => {
                // Zero cadastre number is absent, not 0
                assert!(!record.contains_key("knr"));
                assert_eq!(record["gnr"], json!(42));
                assert_eq!(record["construction_year"], json!(1986));
                assert_eq!(record["fossil_percentage"], json!(0.45));
                assert_eq!(record["has_energy_evaluation"], json!(true));
                assert_eq!(record["issue_date"], json!("2024-03-01T12:30:00Z"));
                // Unmapped/unparseable fields are omitted, not null
                assert!(!record.contains_key("energy_consumption"));
                assert!(!record.values().any(Value::is_null));
            }
            TransformOutcome::Rejected { reason } => panic!("rejected: {reason}"),
        }
    }

    #[test]
    fn test_formula_variables_split() {
        let mapping = mappings::lookup("notion_formulas").unwrap();
        let key = vec!["name".to_string()];
        let row = raw(&[
            ("Name", json!("effect")),
            ("Formula", json!("p = u * i")),
            ("Variables", json!("u, i")),
        ]);

        match transform(&row, mapping, &key) {
            TransformOutcome::Record { record, .. } => {
                assert_eq!(record["variables"], json!(["u", "i"]));
            }
            TransformOutcome::Rejected { reason } => panic!("rejected: {reason}"),
        }
    }

    #[test]
    fn test_feature_flag_defaults() {
        let mapping = mappings::lookup("notion_feature_flags").unwrap();
        let key = vec!["feature_name".to_string()];
        let row = raw(&[("Feature Name", json!("new_calculator"))]);

        match transform(&row, mapping, &key) {
            TransformOutcome::Record { record, .. } => {
                assert_eq!(record["enabled"], json!(false));
                assert_eq!(record["rollout_percentage"], json!(0.0));
            }
            TransformOutcome::Rejected { reason } => panic!("rejected: {reason}"),
        }
    }
}
