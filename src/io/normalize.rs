//! Response normalization.
//!
//! This module turns whatever the demand service returned into a clean,
//! chronologically sorted list of `DemandPoint`s.
//!
//! Design goals:
//! - **Ordered strategies**: each known record shape is a `ParseStrategy`; the
//!   first one that recognizes the records wins
//! - **Record-level validation**: skip bad records, but report what happened
//!   (`ParseSummary`)
//! - **Loud schema drift**: if no strategy recognizes the payload at all, that
//!   is an `UnparsableResponse`, never a silent empty series

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::DemandPoint;
use crate::error::FetchError;

/// Timestamp-bearing field names, in priority order (case-insensitive).
const TIMESTAMP_FIELDS: [&str; 5] = ["fecha", "fechahora", "timestamp", "datetime", "hora"];

/// Value-bearing field names, in priority order (case-insensitive).
const VALUE_FIELDS: [&str; 5] = ["demanda", "valor", "mw", "value", "y"];

const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];

/// A record that could not be turned into a point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    /// Position in the unwrapped record list.
    pub index: usize,
    pub reason: String,
}

/// What happened to each record of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSummary {
    /// Name of the strategy that recognized the records.
    pub strategy: &'static str,
    pub records_seen: usize,
    pub records_used: usize,
    pub skipped: Vec<SkippedRecord>,
}

impl ParseSummary {
    fn empty() -> Self {
        Self {
            strategy: "empty",
            records_seen: 0,
            records_used: 0,
            skipped: Vec::new(),
        }
    }
}

/// Normalizer output: sorted points + per-record accounting.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub points: Vec<DemandPoint>,
    pub summary: ParseSummary,
}

/// Per-record result: a point, or the reason it was dropped.
pub type RecordOutcome = Result<DemandPoint, String>;

/// One way of reading a list of raw records.
pub trait ParseStrategy {
    fn name(&self) -> &'static str;

    /// Returns `None` when the records do not have the shape this strategy
    /// handles. Otherwise returns one outcome per record, in input order.
    fn parse(&self, records: &[Value]) -> Option<Vec<RecordOutcome>>;
}

/// Strategies tried by `normalize_response`, in order.
pub const DEFAULT_STRATEGIES: &[&dyn ParseStrategy] = &[&SplitDateHour, &NamedFields, &PairRows];

/// Normalize a decoded response with the default strategies.
pub fn normalize_response(payload: &Value) -> Result<Normalized, FetchError> {
    normalize_with(payload, DEFAULT_STRATEGIES)
}

/// Normalize a decoded response with an explicit strategy list.
pub fn normalize_with(payload: &Value, strategies: &[&dyn ParseStrategy]) -> Result<Normalized, FetchError> {
    let records = extract_records(payload)?;
    if records.is_empty() {
        return Ok(Normalized {
            points: Vec::new(),
            summary: ParseSummary::empty(),
        });
    }

    for strategy in strategies {
        let Some(outcomes) = strategy.parse(&records) else {
            continue;
        };
        debug!(strategy = strategy.name(), records = records.len(), "recognized response shape");
        return Ok(collect_outcomes(strategy.name(), outcomes));
    }

    Err(unparsable(
        payload,
        format!(
            "no timestamp/value field pair recognized in {} record(s)",
            records.len()
        ),
    ))
}

fn collect_outcomes(strategy: &'static str, outcomes: Vec<RecordOutcome>) -> Normalized {
    let records_seen = outcomes.len();
    let mut points = Vec::with_capacity(records_seen);
    let mut skipped = Vec::new();

    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(point) => points.push(point),
            Err(reason) => skipped.push(SkippedRecord { index, reason }),
        }
    }

    points.sort_by_key(|p| p.timestamp);

    Normalized {
        summary: ParseSummary {
            strategy,
            records_seen,
            records_used: points.len(),
            skipped,
        },
        points,
    }
}

/// Unwrap the known envelopes down to the record list.
///
/// - `{"Resultados": [...]}` (a `null` list is an empty result)
/// - `{"d": "<json string>"}` or `{"d": <value>}` (ASP.NET page methods)
/// - a bare top-level list
/// - otherwise the first list-valued field of the top-level object
fn extract_records(payload: &Value) -> Result<Vec<Value>, FetchError> {
    match payload {
        Value::Array(items) => Ok(items.clone()),
        Value::Object(map) => {
            if let Some(key) = find_key(map, "resultados") {
                return match &map[key] {
                    Value::Array(items) => Ok(items.clone()),
                    Value::Null => Ok(Vec::new()),
                    other => Err(unparsable(
                        payload,
                        format!("`{key}` is {}, not a list", type_name(other)),
                    )),
                };
            }

            if let Some(inner) = map.get("d") {
                return match inner {
                    Value::String(text) => {
                        let decoded: Value = serde_json::from_str(text).map_err(|e| {
                            unparsable(payload, format!("`d` envelope is not valid JSON: {e}"))
                        })?;
                        extract_records(&decoded)
                    }
                    other => extract_records(other),
                };
            }

            map.values()
                .find_map(Value::as_array)
                .cloned()
                .ok_or_else(|| unparsable(payload, "no list-valued field found".to_string()))
        }
        other => Err(unparsable(
            payload,
            format!("top-level {} is not a record list", type_name(other)),
        )),
    }
}

/// Records with separate `fecha` (date) and 1-indexed `hora` (1..=24) fields.
///
/// Hour 1 is 00:00 and hour 24 is 23:00 of the same date.
#[derive(Debug, Clone, Copy)]
pub struct SplitDateHour;

impl ParseStrategy for SplitDateHour {
    fn name(&self) -> &'static str {
        "split-date-hour"
    }

    fn parse(&self, records: &[Value]) -> Option<Vec<RecordOutcome>> {
        // Field names come from the first record only.
        let (date_key, hour_key, value_key) = {
            let rec = records.first()?.as_object()?;
            let date_key = find_key(rec, "fecha")?;
            let hour_key = find_key(rec, "hora")?;
            let exclude = [date_key, hour_key];
            let value_key = find_field(rec, &VALUE_FIELDS, &exclude)
                .or_else(|| first_field_where(rec, Value::is_number, &exclude))?;
            (date_key.to_string(), hour_key.to_string(), value_key.to_string())
        };

        Some(
            records
                .iter()
                .map(|record| {
                    let rec = record.as_object().ok_or_else(|| "record is not an object".to_string())?;
                    let date = coerce_date(rec.get(&date_key))?;
                    let hour = coerce_hour(rec.get(&hour_key))?;
                    let value = coerce_value(rec.get(&value_key))?;
                    let timestamp = date.and_time(NaiveTime::MIN) + Duration::hours(i64::from(hour - 1));
                    Ok(DemandPoint::new(timestamp, value))
                })
                .collect(),
        )
    }
}

/// Records with one timestamp field and one value field, found by name.
///
/// Falls back to the first string field for the timestamp and the first
/// numeric field for the value when no known name is present.
#[derive(Debug, Clone, Copy)]
pub struct NamedFields;

impl ParseStrategy for NamedFields {
    fn name(&self) -> &'static str {
        "named-fields"
    }

    fn parse(&self, records: &[Value]) -> Option<Vec<RecordOutcome>> {
        let (ts_key, value_key) = {
            let rec = records.first()?.as_object()?;
            let ts_named = find_field(rec, &TIMESTAMP_FIELDS, &[]);
            let ts_exclude: Vec<&str> = ts_named.into_iter().collect();
            let value_key = find_field(rec, &VALUE_FIELDS, &ts_exclude)
                .or_else(|| first_field_where(rec, Value::is_number, &ts_exclude))?;
            let ts_key = ts_named
                .filter(|k| *k != value_key)
                .or_else(|| first_field_where(rec, Value::is_string, &[value_key]))?;
            (ts_key.to_string(), value_key.to_string())
        };

        debug!(timestamp_field = %ts_key, value_field = %value_key, "selected record fields");

        Some(
            records
                .iter()
                .map(|record| {
                    let rec = record.as_object().ok_or_else(|| "record is not an object".to_string())?;
                    let timestamp = coerce_timestamp(rec.get(&ts_key))?;
                    let value = coerce_value(rec.get(&value_key))?;
                    Ok(DemandPoint::new(timestamp, value))
                })
                .collect(),
        )
    }
}

/// Records that are `[timestamp, value]` pairs (chart-series style).
#[derive(Debug, Clone, Copy)]
pub struct PairRows;

impl ParseStrategy for PairRows {
    fn name(&self) -> &'static str {
        "pair-rows"
    }

    fn parse(&self, records: &[Value]) -> Option<Vec<RecordOutcome>> {
        let first = records.first()?.as_array()?;
        if first.len() < 2 {
            return None;
        }

        Some(
            records
                .iter()
                .map(|record| {
                    let pair = record.as_array().ok_or_else(|| "record is not a pair".to_string())?;
                    let timestamp = coerce_timestamp(pair.first())?;
                    let value = coerce_value(pair.get(1))?;
                    Ok(DemandPoint::new(timestamp, value))
                })
                .collect(),
        )
    }
}

/// Exact (case-insensitive) key lookup.
fn find_key<'a>(record: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    record
        .keys()
        .find(|k| k.eq_ignore_ascii_case(name))
        .map(String::as_str)
}

/// Find a field by name: exact matches in priority order first, then keys
/// containing a multi-letter name (e.g. `demanda_mw`).
fn find_field<'a>(record: &'a Map<String, Value>, names: &[&str], exclude: &[&str]) -> Option<&'a str> {
    let usable = |k: &&String| !exclude.contains(&k.as_str());

    for name in names {
        if let Some(k) = record.keys().filter(usable).find(|k| k.eq_ignore_ascii_case(name)) {
            return Some(k.as_str());
        }
    }
    for name in names.iter().filter(|n| n.len() > 1) {
        if let Some(k) = record
            .keys()
            .filter(usable)
            .find(|k| k.to_ascii_lowercase().contains(name))
        {
            return Some(k.as_str());
        }
    }
    None
}

fn first_field_where<'a>(
    record: &'a Map<String, Value>,
    pred: fn(&Value) -> bool,
    exclude: &[&str],
) -> Option<&'a str> {
    record
        .iter()
        .find(|(k, v)| !exclude.contains(&k.as_str()) && pred(*v))
        .map(|(k, _)| k.as_str())
}

fn coerce_value(raw: Option<&Value>) -> Result<f64, String> {
    let value = match raw {
        None => return Err("missing value field".to_string()),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| format!("value {n} is not representable as f64"))?,
        Some(Value::String(s)) => parse_number(s)?,
        Some(Value::Null) => return Err("null value".to_string()),
        Some(other) => return Err(format!("value is {}", type_name(other))),
    };
    if value.is_finite() {
        Ok(value)
    } else {
        Err(format!("non-finite value {value}"))
    }
}

fn parse_number(raw: &str) -> Result<f64, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty value".to_string());
    }
    // "35000,5" uses a decimal comma; "35,000.5" uses a thousands separator.
    let cleaned = if trimmed.contains('.') {
        trimmed.replace(',', "")
    } else {
        trimmed.replace(',', ".")
    };
    cleaned
        .parse::<f64>()
        .map_err(|_| format!("non-numeric value '{trimmed}'"))
}

fn coerce_timestamp(raw: Option<&Value>) -> Result<NaiveDateTime, String> {
    match raw {
        None => Err("missing timestamp field".to_string()),
        Some(Value::String(s)) => parse_timestamp(s),
        Some(Value::Number(n)) => {
            let millis = n
                .as_i64()
                .ok_or_else(|| format!("timestamp {n} is not an integer"))?;
            from_epoch_millis(millis)
        }
        Some(Value::Null) => Err("null timestamp".to_string()),
        Some(other) => Err(format!("timestamp is {}", type_name(other))),
    }
}

/// Parse a textual timestamp. Ambiguous dates are read day-first.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, String> {
    let s = raw.trim();

    if let Some(millis) = aspnet_millis(s) {
        return from_epoch_millis(millis);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_local());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ts);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d.and_time(NaiveTime::MIN));
        }
    }
    Err(format!("unrecognized timestamp '{s}'"))
}

/// `/Date(1735689600000)/` or `/Date(1735689600000-0600)/`.
fn aspnet_millis(s: &str) -> Option<i64> {
    let inner = s.strip_prefix("/Date(")?.strip_suffix(")/")?;
    let end = inner
        .char_indices()
        .skip(1)
        .find(|(_, c)| *c == '+' || *c == '-')
        .map_or(inner.len(), |(i, _)| i);
    inner.get(..end)?.parse().ok()
}

fn from_epoch_millis(millis: i64) -> Result<NaiveDateTime, String> {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| format!("epoch millis {millis} out of range"))
}

fn coerce_date(raw: Option<&Value>) -> Result<NaiveDate, String> {
    match raw {
        Some(Value::String(s)) => parse_timestamp(s).map(|ts| ts.date()),
        None => Err("missing date field".to_string()),
        Some(other) => Err(format!("date is {}", type_name(other))),
    }
}

fn coerce_hour(raw: Option<&Value>) -> Result<u32, String> {
    let hour = match raw {
        None => return Err("missing hour field".to_string()),
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| format!("hour {n} is not a whole number"))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("non-numeric hour '{}'", s.trim()))?,
        Some(other) => return Err(format!("hour is {}", type_name(other))),
    };
    match u32::try_from(hour) {
        Ok(h) if (1..=24).contains(&h) => Ok(h),
        _ => Err(format!("hour {hour} outside 1..=24")),
    }
}

fn unparsable(payload: &Value, detail: String) -> FetchError {
    FetchError::UnparsableResponse {
        keys: payload_keys(payload),
        detail,
    }
}

/// Top-level keys of the payload (or of its first record for bare lists).
fn payload_keys(payload: &Value) -> Vec<String> {
    match payload {
        Value::Object(map) => map.keys().cloned().collect(),
        Value::Array(items) => items
            .iter()
            .find_map(Value::as_object)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn resultados_with_one_indexed_hours() {
        let payload = json!({"Resultados": [
            {"fecha": "2025-01-01", "hora": "1", "demanda": "100.0"},
            {"fecha": "2025-01-01", "hora": "24", "demanda": "90.0"},
        ]});
        let out = normalize_response(&payload).unwrap();
        assert_eq!(
            out.points,
            vec![
                DemandPoint::new(at(2025, 1, 1, 0), 100.0),
                DemandPoint::new(at(2025, 1, 1, 23), 90.0),
            ]
        );
        assert_eq!(out.summary.strategy, "split-date-hour");
        assert!(out.summary.skipped.is_empty());
    }

    #[test]
    fn malformed_record_is_skipped_not_fatal() {
        let payload = json!([
            {"timestamp": "2025-01-01 00:00", "value": 10.0},
            {"timestamp": "2025-01-01 01:00", "value": "n/a"},
            {"timestamp": "2025-01-01 02:00", "value": 12.5},
        ]);
        let out = normalize_response(&payload).unwrap();
        assert_eq!(out.points.len(), 2);
        assert_eq!(out.summary.records_seen, 3);
        assert_eq!(out.summary.records_used, 2);
        assert_eq!(out.summary.skipped.len(), 1);
        assert_eq!(out.summary.skipped[0].index, 1);
        assert!(out.summary.skipped[0].reason.contains("n/a"));
    }

    #[test]
    fn string_encoded_d_envelope_reads_day_first() {
        let inner = json!([
            {"FechaHora": "02/01/2025 05:00", "Valor": "35000,5"},
            {"FechaHora": "01/01/2025 23:00", "Valor": 34000},
        ]);
        let payload = json!({"d": inner.to_string()});
        let out = normalize_response(&payload).unwrap();
        assert_eq!(out.summary.strategy, "named-fields");
        assert_eq!(
            out.points,
            vec![
                DemandPoint::new(at(2025, 1, 1, 23), 34000.0),
                DemandPoint::new(at(2025, 1, 2, 5), 35000.5),
            ]
        );
    }

    #[test]
    fn object_d_envelope_is_unwrapped() {
        let payload = json!({"d": {"Resultados": [
            {"FECHA": "2025-03-01", "HORA": 3, "Demanda": 5.0},
        ]}});
        let out = normalize_response(&payload).unwrap();
        assert_eq!(out.points, vec![DemandPoint::new(at(2025, 3, 1, 2), 5.0)]);
    }

    #[test]
    fn bad_d_envelope_is_unparsable() {
        let payload = json!({"d": "<html>error</html>"});
        let err = normalize_response(&payload).unwrap_err();
        assert!(matches!(err, FetchError::UnparsableResponse { ref keys, .. } if keys == &vec!["d".to_string()]));
    }

    #[test]
    fn falls_back_to_first_text_and_numeric_fields() {
        let payload = json!([
            {"zona": 7, "etiqueta": "2025-01-01T04:00:00", "carga": 321.0},
        ]);
        // `zona` is the first numeric field, `etiqueta` the first text field.
        let out = normalize_response(&payload).unwrap();
        assert_eq!(out.points, vec![DemandPoint::new(at(2025, 1, 1, 4), 7.0)]);
    }

    #[test]
    fn field_names_come_from_first_record() {
        let payload = json!([
            {"timestamp": "2025-01-01 00:00", "value": 10.0},
            {"fechahora": "2025-01-01 01:00", "demanda": 11.0},
            {"timestamp": "2025-01-01 02:00", "value": 12.0},
        ]);
        let out = normalize_response(&payload).unwrap();
        assert_eq!(out.summary.strategy, "named-fields");
        assert_eq!(out.points.len(), 2);
        assert_eq!(out.summary.skipped.len(), 1);
        assert_eq!(out.summary.skipped[0].index, 1);

        // A first record without a usable pair makes the shape unrecognized,
        // even when later records would match.
        let payload = json!([
            {"note": true},
            {"timestamp": "2025-01-01 01:00", "value": 11.0},
        ]);
        assert!(matches!(
            normalize_response(&payload),
            Err(FetchError::UnparsableResponse { .. })
        ));
    }

    #[test]
    fn first_list_field_is_used_when_no_envelope() {
        let payload = json!({
            "meta": {"sistema": "SIN"},
            "series": [{"datetime": "2025-01-01 01:00", "demanda_mw": 1.5}],
        });
        let out = normalize_response(&payload).unwrap();
        assert_eq!(out.points, vec![DemandPoint::new(at(2025, 1, 1, 1), 1.5)]);
    }

    #[test]
    fn unrecognized_payload_reports_keys() {
        let payload = json!({"status": "ok", "count": 3});
        let err = normalize_response(&payload).unwrap_err();
        match err {
            FetchError::UnparsableResponse { keys, .. } => {
                assert_eq!(keys, vec!["status".to_string(), "count".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let records = json!([{"ok": true}, {"ok": false}]);
        assert!(matches!(
            normalize_response(&records),
            Err(FetchError::UnparsableResponse { .. })
        ));
    }

    #[test]
    fn empty_resultados_is_an_empty_series() {
        let out = normalize_response(&json!({"Resultados": []})).unwrap();
        assert!(out.points.is_empty());
        let out = normalize_response(&json!({"Resultados": null})).unwrap();
        assert!(out.points.is_empty());
    }

    #[test]
    fn out_of_range_hours_are_skipped() {
        let payload = json!({"Resultados": [
            {"fecha": "2025-01-01", "hora": "0", "demanda": "1"},
            {"fecha": "2025-01-01", "hora": "25", "demanda": "2"},
            {"fecha": "2025-01-01", "hora": "12", "demanda": "3"},
        ]});
        let out = normalize_response(&payload).unwrap();
        assert_eq!(out.points, vec![DemandPoint::new(at(2025, 1, 1, 11), 3.0)]);
        assert_eq!(out.summary.skipped.len(), 2);
    }

    #[test]
    fn output_is_sorted() {
        let payload = json!({"Resultados": [
            {"fecha": "2025-01-02", "hora": 1, "demanda": 3},
            {"fecha": "2025-01-01", "hora": 2, "demanda": 2},
            {"fecha": "2025-01-01", "hora": 1, "demanda": 1},
        ]});
        let out = normalize_response(&payload).unwrap();
        let values: Vec<f64> = out.points.iter().map(|p| p.demand_mw).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn pair_rows_accept_aspnet_dates() {
        let payload = json!({"data": [["/Date(1735689600000)/", 42.0], ["/Date(1735693200000-0600)/", "43"]]});
        let out = normalize_response(&payload).unwrap();
        assert_eq!(out.summary.strategy, "pair-rows");
        assert_eq!(
            out.points,
            vec![
                DemandPoint::new(at(2025, 1, 1, 0), 42.0),
                DemandPoint::new(at(2025, 1, 1, 1), 43.0),
            ]
        );
    }

    #[test]
    fn custom_strategy_list_is_honored() {
        let payload = json!({"Resultados": [{"fecha": "2025-01-01", "hora": "1", "demanda": "1"}]});
        let only_pairs: &[&dyn ParseStrategy] = &[&PairRows];
        assert!(normalize_with(&payload, only_pairs).is_err());
    }

    #[test]
    fn number_parsing_handles_separators() {
        assert_eq!(parse_number(" 35,000.5 ").unwrap(), 35000.5);
        assert_eq!(parse_number("35000,5").unwrap(), 35000.5);
        assert!(parse_number("").is_err());
        assert!(coerce_value(Some(&json!("NaN"))).is_err());
    }
}
