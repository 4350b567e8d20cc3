//! Decoding of raw trace records into counter samples.
//!
//! Two record families carry counters:
//!
//! - `EventCounters` events, emitted by any provider, with the counter fields
//!   nested under a `Payload` object.
//! - Instrument events of the [`METRICS_PROVIDER`] provider, with flat fields
//!   and a `sessionId` that must match the pipeline's session.
//!
//! Everything else is not a counter and yields no samples. Decoding is
//! best-effort: [`extract_samples`] never fails, a malformed record simply
//! contributes nothing.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{trace, warn};

use crate::filter::CounterFilter;
use crate::record::TraceRecord;
use crate::sample::{CounterSample, Quantile, SampleValue, SessionId};

/// Event name of event-counter reports.
pub const EVENT_COUNTERS_EVENT: &str = "EventCounters";

/// Provider publishing instrument measurements.
pub const METRICS_PROVIDER: &str = "System.Diagnostics.Metrics";

const SERIES_INTERVAL_PREFIX: &str = "Interval=";

/// Why a record could not be decoded.
#[derive(Debug, Error, PartialEq)]
pub enum ExtractError {
    #[error("payload is not an object")]
    NotAnObject,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` has an invalid value: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("unknown counter type `{0}`")]
    UnknownCounterType(String),

    #[error("malformed quantile `{0}`")]
    MalformedQuantile(String),
}

type Fields = Map<String, Value>;

/// Decodes `record` into the counter samples selected by `filter`.
///
/// Non-counter records, records of other sessions and malformed records all
/// yield an empty vector.
pub fn extract_samples(
    record: &TraceRecord,
    filter: &CounterFilter,
    session_id: &SessionId,
) -> Vec<CounterSample> {
    match try_extract_samples(record, filter, session_id) {
        Ok(samples) => samples,
        Err(err) => {
            trace!(
                provider = %record.provider_name,
                event = %record.event_name,
                error = %err,
                "dropping malformed record"
            );
            Vec::new()
        }
    }
}

/// Like [`extract_samples`], but reports decoding failures.
pub fn try_extract_samples(
    record: &TraceRecord,
    filter: &CounterFilter,
    session_id: &SessionId,
) -> Result<Vec<CounterSample>, ExtractError> {
    if record.event_name == EVENT_COUNTERS_EVENT {
        return event_counter(record, filter, session_id);
    }

    if record.provider_name == METRICS_PROVIDER {
        return match record.event_name.as_str() {
            "GaugeValuePublished"
            | "CounterRateValuePublished"
            | "UpDownCounterRateValuePublished"
            | "HistogramValuePublished" => instrument_value(record, filter, session_id),
            "TimeSeriesLimitReached"
            | "HistogramLimitReached"
            | "Error"
            | "ObservableInstrumentCallbackError"
            | "MultipleSessionsNotSupportedError" => {
                report_diagnostic(record, session_id)?;
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        };
    }

    Ok(Vec::new())
}

fn event_counter(
    record: &TraceRecord,
    filter: &CounterFilter,
    session_id: &SessionId,
) -> Result<Vec<CounterSample>, ExtractError> {
    let fields = record
        .payload
        .get("Payload")
        .ok_or(ExtractError::MissingField("Payload"))?
        .as_object()
        .ok_or(ExtractError::NotAnObject)?;

    let name = str_field(fields, "Name")?;
    let series = str_field(fields, "Series")?;

    if !filter.is_included_at(&record.provider_name, name, series_interval_ms(series)) {
        return Ok(Vec::new());
    }

    let interval_seconds = f64_field(fields, "IntervalSec")?;
    let mut unit = opt_str_field(fields, "DisplayUnits").to_string();

    let value = match str_field(fields, "CounterType")? {
        "Mean" => SampleValue::Metric(f64_field(fields, "Mean")?),
        "Sum" => {
            if unit.is_empty() {
                unit.push_str("count");
            }
            SampleValue::Rate(f64_field(fields, "Increment")?)
        }
        other => return Err(ExtractError::UnknownCounterType(other.to_string())),
    };

    let mut sample = CounterSample::new(&record.provider_name, name, value, session_id.clone())
        .with_unit(unit)
        .with_metadata(opt_str_field(fields, "Metadata"))
        .with_interval(interval_seconds)
        .with_timestamp(record.timestamp_ms);

    let display_name = opt_str_field(fields, "DisplayName");
    if !display_name.is_empty() {
        sample = sample.with_display_name(display_name);
    }

    Ok(vec![sample])
}

fn instrument_value(
    record: &TraceRecord,
    filter: &CounterFilter,
    session_id: &SessionId,
) -> Result<Vec<CounterSample>, ExtractError> {
    let fields = record
        .payload
        .as_object()
        .ok_or(ExtractError::NotAnObject)?;

    if str_field(fields, "sessionId")? != session_id.as_str() {
        return Ok(Vec::new());
    }

    let meter = str_field(fields, "meterName")?;
    let instrument = str_field(fields, "instrumentName")?;

    if !filter.is_included(meter, instrument) {
        return Ok(Vec::new());
    }

    let value = match record.event_name.as_str() {
        // An observable gauge with no value has stopped reporting.
        "GaugeValuePublished" => fields
            .get("lastValue")
            .and_then(as_f64)
            .map(SampleValue::Gauge)
            .unwrap_or(SampleValue::Ended),
        "CounterRateValuePublished" => SampleValue::Rate(f64_field(fields, "rate")?),
        "UpDownCounterRateValuePublished" => {
            SampleValue::UpDownCounter(f64_field(fields, "value")?)
        }
        _ => SampleValue::Percentiles(parse_quantiles(str_field(fields, "quantiles")?)?),
    };

    let sample = CounterSample::new(meter, instrument, value, session_id.clone())
        .with_unit(opt_str_field(fields, "unit"))
        .with_metadata(opt_str_field(fields, "tags"))
        .with_interval(filter.interval_seconds())
        .with_timestamp(record.timestamp_ms);

    Ok(vec![sample])
}

/// Logs session-level diagnostics published by the metrics provider.
fn report_diagnostic(record: &TraceRecord, session_id: &SessionId) -> Result<(), ExtractError> {
    let fields = record
        .payload
        .as_object()
        .ok_or(ExtractError::NotAnObject)?;

    // Rejections of a second session name the running one, not ours.
    if record.event_name != "MultipleSessionsNotSupportedError"
        && str_field(fields, "sessionId")? != session_id.as_str()
    {
        return Ok(());
    }

    match record.event_name.as_str() {
        "TimeSeriesLimitReached" => warn!(
            session = %session_id,
            "time series limit reached, new time series will not be tracked"
        ),
        "HistogramLimitReached" => warn!(
            session = %session_id,
            "histogram limit reached, new histograms will not be tracked"
        ),
        "MultipleSessionsNotSupportedError" => warn!(
            session = %session_id,
            running = opt_str_field(fields, "runningSessionId"),
            "another metrics session is already running in the target process"
        ),
        _ => warn!(
            session = %session_id,
            error = opt_str_field(fields, "errorMessage"),
            "metrics provider reported an error"
        ),
    }

    Ok(())
}

/// Parses `Interval=<ms>` (prefix case-insensitive). Anything else is 0.
fn series_interval_ms(series: &str) -> i64 {
    let prefix_len = SERIES_INTERVAL_PREFIX.len();
    match series.get(..prefix_len) {
        Some(prefix) if prefix.eq_ignore_ascii_case(SERIES_INTERVAL_PREFIX) => {
            series[prefix_len..].trim().parse().unwrap_or(0)
        }
        _ => 0,
    }
}

/// Parses `0.5=1.2;0.95=3;0.99=4`.
fn parse_quantiles(text: &str) -> Result<Vec<Quantile>, ExtractError> {
    text.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let malformed = || ExtractError::MalformedQuantile(entry.to_string());
            let (percentage, value) = entry.split_once('=').ok_or_else(malformed)?;
            Ok(Quantile {
                percentage: percentage.trim().parse().map_err(|_| malformed())?,
                value: value.trim().parse().map_err(|_| malformed())?,
            })
        })
        .collect()
}

fn str_field<'a>(fields: &'a Fields, name: &'static str) -> Result<&'a str, ExtractError> {
    match fields.get(name) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(ExtractError::InvalidField {
            field: name,
            value: other.to_string(),
        }),
        None => Err(ExtractError::MissingField(name)),
    }
}

fn opt_str_field<'a>(fields: &'a Fields, name: &str) -> &'a str {
    fields.get(name).and_then(Value::as_str).unwrap_or_default()
}

/// Numbers may arrive as JSON numbers or as their textual form.
fn f64_field(fields: &Fields, name: &'static str) -> Result<f64, ExtractError> {
    let value = fields.get(name).ok_or(ExtractError::MissingField(name))?;
    as_f64(value).ok_or_else(|| ExtractError::InvalidField {
        field: name,
        value: value.to_string(),
    })
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
