use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::WriterBuilder;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use spn_core::errors::{ErrorInfo, SpnError};

fn serde_error(code: &str, err: impl ToString) -> SpnError {
    SpnError::Serde(ErrorInfo::new(code, err.to_string()))
}

/// Writes the two-row result record: `{channel}_{header}` names, then the
/// flattened `(value, error)` pairs, tab separated.
pub fn write_results_to<W: Write>(
    writer: W,
    channel: &str,
    headers: &[String],
    values: &[(f64, f64)],
) -> Result<(), SpnError> {
    if headers.len() != 2 * values.len() {
        return Err(SpnError::Serde(
            ErrorInfo::new("record-shape", "one header per value and per error")
                .with_context("headers", headers.len())
                .with_context("pairs", values.len()),
        ));
    }
    let mut csv = WriterBuilder::new().delimiter(b'\t').from_writer(writer);
    csv.write_record(headers.iter().map(|header| format!("{channel}_{header}")))
        .map_err(|err| serde_error("csv-write", err))?;
    csv.write_record(
        values
            .iter()
            .flat_map(|(value, error)| [value.to_string(), error.to_string()]),
    )
    .map_err(|err| serde_error("csv-write", err))?;
    csv.flush().map_err(|err| serde_error("csv-flush", err))
}

/// [`write_results_to`] a file, replacing any previous record.
pub fn write_results(
    path: &Path,
    channel: &str,
    headers: &[String],
    values: &[(f64, f64)],
) -> Result<(), SpnError> {
    let file = File::create(path).map_err(|err| {
        SpnError::Serde(
            ErrorInfo::new("results-create", err.to_string()).with_context("path", path.display()),
        )
    })?;
    write_results_to(file, channel, headers, values)
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let ordered = map
                .into_iter()
                .map(|(key, value)| (key, canonicalize(value)))
                .collect::<BTreeMap<_, _>>();
            Value::Object(ordered.into_iter().collect::<Map<_, _>>())
        }
        Value::Array(values) => Value::Array(values.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Hex SHA-256 of the key-sorted JSON form of `value`.
pub fn report_hash<T: Serialize>(value: &T) -> Result<String, SpnError> {
    let value = serde_json::to_value(value).map_err(|err| serde_error("json-serialize", err))?;
    let bytes = serde_json::to_vec(&canonicalize(value))
        .map_err(|err| serde_error("json-write", err))?;
    Ok(format!("{:x}", Sha256::digest(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_has_prefixed_headers_and_flat_values() {
        let headers: Vec<String> = ["mass", "mass_error", "chisquare", "chisquare_error"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        let mut buffer = Vec::new();
        write_results_to(&mut buffer, "id", &headers, &[(0.5, 0.01), (1.25, 0.5)]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text,
            "id_mass\tid_mass_error\tid_chisquare\tid_chisquare_error\n0.5\t0.01\t1.25\t0.5\n"
        );
    }

    #[test]
    fn mismatched_record_is_rejected() {
        let headers = vec!["mass".to_string()];
        let err = write_results_to(Vec::new(), "id", &headers, &[(0.5, 0.01)]).unwrap_err();
        assert_eq!(err.code(), "record-shape");
    }

    #[test]
    fn hash_ignores_key_order() {
        let a = serde_json::json!({"b": 1, "a": [1.5, {"y": 2, "x": 3}]});
        let b = serde_json::json!({"a": [1.5, {"x": 3, "y": 2}], "b": 1});
        assert_eq!(report_hash(&a).unwrap(), report_hash(&b).unwrap());
        assert_eq!(report_hash(&a).unwrap().len(), 64);
    }
}
