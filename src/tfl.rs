// https://api.tfl.gov.uk/Line/central/Arrivals/940GZZLUOXC?direction=all
// https://api.tfl.gov.uk/Line/central/Status
//
// Both endpoints answer with a bare JSON array. A bad line or stop id gets an
// error object instead, which is why arrivals parsing tolerates non-arrays.
extern crate anyhow;
extern crate chrono;
extern crate reqwest;
extern crate serde;
extern crate serde_json;

use anyhow::Context;
use crate::result;

pub type FetchFn = fn(&str) -> result::TubeTimesResult<String>;

/// One predicted vehicle arrival, as TfL reports it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ArrivalPrediction {
    pub id: String,
    pub operation_type: i32,
    pub vehicle_id: String,
    pub naptan_id: String,
    pub station_name: String,
    pub line_id: String,
    pub line_name: String,
    pub platform_name: String,
    pub direction: String,
    pub bearing: String,
    pub destination_naptan_id: String,
    pub destination_name: String,
    pub timestamp: String,
    pub time_to_station: i64,
    pub current_location: String,
    pub towards: String,
    pub expected_arrival: chrono::DateTime<chrono::Utc>,
    pub time_to_live: chrono::DateTime<chrono::Utc>,
    pub mode_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TubeStatus {
    Good,
    Warning,
    Severe,
}

impl Default for TubeStatus {
    fn default() -> TubeStatus {
        return TubeStatus::Good;
    }
}

impl TubeStatus {
    // https://api.tfl.gov.uk/Line/Meta/Severity
    pub fn from_severity(severity: i32) -> TubeStatus {
        match severity {
            10 | 18 | 19 => TubeStatus::Good,
            1..=6 | 11 | 16 | 20 => TubeStatus::Severe,
            _ => TubeStatus::Warning,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DisruptionMessage {
    pub text: String,
    pub status_severity: i32,
    pub status_severity_description: String,
    pub category: Option<String>,
    pub category_description: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct LineStatusSnapshot {
    pub status: TubeStatus,
    pub description: Option<String>,
    pub messages: Vec<DisruptionMessage>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TflLine {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    line_statuses: Vec<TflLineStatus>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TflLineStatus {
    status_severity: i32,
    #[serde(default)]
    status_severity_description: String,
    reason: Option<String>,
    disruption: Option<TflDisruption>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TflDisruption {
    category: Option<String>,
    category_description: Option<String>,
    description: Option<String>,
}

pub fn fetch_arrivals(url: &str, fetch_fn: FetchFn) -> result::TubeTimesResult<Option<Vec<ArrivalPrediction>>> {
    let response_body = fetch_fn(url)?;
    return parse_arrivals(&response_body);
}

pub fn fetch_line_status(url: &str, fetch_fn: FetchFn) -> result::TubeTimesResult<LineStatusSnapshot> {
    let response_body = fetch_fn(url)?;
    return parse_line_status(&response_body);
}

/// `Ok(None)` when the body is valid JSON but not a list of arrivals.
pub fn parse_arrivals(response_body: &str) -> result::TubeTimesResult<Option<Vec<ArrivalPrediction>>> {
    let response_json: serde_json::Value = serde_json::from_str(response_body)
        .context("while parsing arrivals json")?;

    let entries = match response_json {
        serde_json::Value::Array(entries) => entries,
        other => {
            warn!("Arrivals response was not a list: {}", other);
            return Ok(None);
        },
    };

    let arrivals = entries.into_iter()
        .filter_map(|entry| {
            match serde_json::from_value::<ArrivalPrediction>(entry) {
                Ok(arrival) => Some(arrival),
                Err(err) => {
                    debug!("Skipping malformed arrival: {}", err);
                    None
                },
            }
        })
        .collect();

    return Ok(Some(arrivals));
}

pub fn parse_line_status(response_body: &str) -> result::TubeTimesResult<LineStatusSnapshot> {
    let lines: Vec<TflLine> = serde_json::from_str(response_body)
        .context("while parsing line status json")?;

    return Ok(standardize(&lines));
}

fn standardize(lines: &[TflLine]) -> LineStatusSnapshot {
    let mut snapshot = LineStatusSnapshot::default();

    for line in lines {
        debug!("Line {} ({}) has {} statuses", line.id, line.name, line.line_statuses.len());
        for status in &line.line_statuses {
            let class = TubeStatus::from_severity(status.status_severity);
            if class == TubeStatus::Good {
                continue;
            }

            if class > snapshot.status {
                snapshot.status = class;
                snapshot.description = Some(status.status_severity_description.clone());
            }

            let text = status.reason.clone()
                .or(status.disruption.as_ref().and_then(|d| d.description.clone()));
            let text = match text {
                Some(text) if !text.trim().is_empty() => text.trim().to_string(),
                _ => continue,
            };

            if snapshot.messages.iter().any(|m| m.text == text) {
                continue;
            }

            snapshot.messages.push(DisruptionMessage{
                text: text,
                status_severity: status.status_severity,
                status_severity_description: status.status_severity_description.clone(),
                category: status.disruption.as_ref().and_then(|d| d.category.clone()),
                category_description: status.disruption.as_ref().and_then(|d| d.category_description.clone()),
            });
        }
    }

    return snapshot;
}

pub fn real_fetch(url: &str) -> result::TubeTimesResult<String> {
    use std::io::Read;

    let client = reqwest::blocking::Client::new();
    let mut response = client.get(url)
        .header(reqwest::header::USER_AGENT, "tubetimes")
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .with_context(|| format!("while fetching url: {}", url))?;
    let mut response_body = String::new();
    response.read_to_string(&mut response_body)?;
    return Ok(response_body);
}
