extern crate anyhow;
extern crate chrono;
extern crate chrono_tz;
extern crate serde;
extern crate serde_json;

use anyhow::Context;
use crate::config;
use crate::helper;
use crate::result;
use crate::tfl;

/// Everything the widget remembers between polls. Survives a restart when loaded from a state file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplayState {
    pub loaded: bool,
    pub result: Option<Vec<tfl::ArrivalPrediction>>,
    pub tube_status: tfl::TubeStatus,
    pub tube_status_description: Option<String>,
    pub combined_messages: Vec<tfl::DisruptionMessage>,
    pub active_message: usize,
}

impl DisplayState {
    pub fn has_valid_data(&self) -> bool {
        return self.result.as_ref().map(|r| !r.is_empty()).unwrap_or(false);
    }
}

/// What the rendering side receives.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DisplayData {
    pub line: String,
    pub journeys: Vec<tfl::ArrivalPrediction>,
    pub loaded: bool,
    pub active_message: usize,
    pub tube_status: tfl::TubeStatus,
    pub tube_status_description: Option<String>,
    pub status_messages: Vec<tfl::DisruptionMessage>,
    #[serde(skip)]
    pub timezone: chrono_tz::Tz,
}

impl DisplayData {
    pub fn active_status_message(&self) -> Option<&tfl::DisruptionMessage> {
        return self.status_messages.get(self.active_message);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The response was for a URL we no longer ask for.
    Stale,
    Stored,
    Refresh,
}

pub struct TubeTimes {
    config: config::Config,
    arrivals_url: String,
    status_url: String,
    state: DisplayState,
}

impl TubeTimes {
    pub fn new(config: config::Config) -> TubeTimes {
        return TubeTimes::with_state(config, DisplayState::default());
    }

    pub fn with_state(config: config::Config, state: DisplayState) -> TubeTimes {
        let mut widget = TubeTimes{
            config: config,
            arrivals_url: String::new(),
            status_url: String::new(),
            state: state,
        };
        widget.start();
        return widget;
    }

    /// Safe to call repeatedly: whatever is already in `state` is kept.
    pub fn start(&mut self) {
        info!("Starting tube times for line '{}' at stop '{}'",
              self.config.line_id, self.config.stop_point_id);

        if !self.state.loaded && self.state.has_valid_data() {
            self.state.loaded = true;
        }

        self.config.coerce_limit();
        self.config.coerce_intervals();
        self.arrivals_url = self.config.arrivals_url();
        self.status_url = self.config.status_url();
    }

    pub fn reconfigure(&mut self, config: config::Config) {
        self.config = config;
        self.start();
    }

    pub fn config(&self) -> &config::Config {
        return &self.config;
    }

    pub fn state(&self) -> &DisplayState {
        return &self.state;
    }

    pub fn arrivals_url(&self) -> &str {
        return &self.arrivals_url;
    }

    pub fn status_url(&self) -> &str {
        return &self.status_url;
    }

    pub fn on_notification(&mut self, notification: helper::Notification) -> Outcome {
        match notification {
            helper::Notification::ArrivalsResult{url, result} => {
                if url != self.arrivals_url {
                    debug!("Dropping stale arrivals for {}", url);
                    return Outcome::Stale;
                }

                self.state.loaded = true;
                self.state.result = result;
                self.advance_message();
                return Outcome::Refresh;
            },
            helper::Notification::LineStatusResult{service_url, snapshot} => {
                if service_url != self.status_url {
                    debug!("Dropping stale line status for {}", service_url);
                    return Outcome::Stale;
                }

                self.state.tube_status = snapshot.status;
                self.state.tube_status_description = snapshot.description;
                self.state.combined_messages = snapshot.messages;

                // Without arrivals on screen the next arrivals result will render this.
                if self.state.loaded && self.state.has_valid_data() {
                    return Outcome::Refresh;
                }
                return Outcome::Stored;
            },
        }
    }

    pub fn advance_message(&mut self) {
        self.state.active_message = next_message_index(
            self.state.active_message, self.state.combined_messages.len());
    }

    pub fn display_data(&self, now: chrono::DateTime<chrono::Utc>) -> DisplayData {
        let message_count = self.state.combined_messages.len();
        let active_message = if self.state.active_message < message_count {
            self.state.active_message
        } else {
            0
        };

        return DisplayData{
            line: self.config.title.clone(),
            journeys: select_display_arrivals(
                self.state.result.as_ref().map(Vec::as_slice),
                self.config.effective_limit(),
                now),
            loaded: self.state.loaded,
            active_message: active_message,
            tube_status: self.state.tube_status,
            tube_status_description: self.state.tube_status_description.clone(),
            status_messages: self.state.combined_messages.clone(),
            timezone: self.config.timezone,
        };
    }
}

pub fn next_message_index(current: usize, message_count: usize) -> usize {
    if current + 1 >= message_count {
        return 0;
    }
    return current + 1;
}

/// Arrivals that are neither due in the past nor expired, soonest first, at most `limit` of them.
pub fn select_display_arrivals(
    arrivals: Option<&[tfl::ArrivalPrediction]>,
    limit: usize,
    now: chrono::DateTime<chrono::Utc>) -> Vec<tfl::ArrivalPrediction> {
    let arrivals = match arrivals {
        Some(arrivals) => arrivals,
        None => return vec![],
    };

    let mut upcoming: Vec<tfl::ArrivalPrediction> = arrivals.iter()
        .filter(|a| a.expected_arrival >= now && a.time_to_live >= now)
        .cloned()
        .collect();
    upcoming.sort_by_key(|a| a.expected_arrival);
    upcoming.truncate(limit);
    return upcoming;
}

/// `Ok(None)` when there is no state file yet.
pub fn load_state<P: AsRef<std::path::Path>>(path: P) -> result::TubeTimesResult<Option<DisplayState>> {
    let debug_path = path.as_ref().to_str().map(|x| x.to_string());
    if !path.as_ref().exists() {
        return Ok(None);
    }

    let file = std::fs::File::open(path)
        .with_context(|| format!("Opening state from '{:?}'", debug_path))?;
    let reader = std::io::BufReader::new(file);
    let state: DisplayState = serde_json::from_reader(reader)
        .with_context(|| format!("while parsing state"))?;
    return Ok(Some(state));
}

/// Writes a sibling ".tmp" file and renames it over `path`, so a failed save leaves the previous state intact.
pub fn save_state<P: AsRef<std::path::Path>>(path: P, state: &DisplayState) -> result::TubeTimesResult<()> {
    use std::io::Write;

    let path = path.as_ref();
    let mut tmp_name = path.file_name()
        .ok_or_else(|| result::make_error(&format!("State file '{:?}' has no file name", path)))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let file = std::fs::File::create(&tmp_path)
        .with_context(|| format!("Creating state file '{:?}'", tmp_path))?;
    let mut writer = std::io::BufWriter::new(file);
    let written = serde_json::to_writer(&mut writer, state)
        .map_err(anyhow::Error::from)
        .and_then(|_| writer.flush().map_err(anyhow::Error::from));
    if let Err(err) = written {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(err.context("while writing state"));
    }

    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Replacing state file '{:?}'", path))?;
    return Ok(());
}

#[cfg(test)]
mod tests {
    extern crate chrono;

    use chrono::TimeZone;

    use super::{DisplayState, Outcome, TubeTimes};
    use crate::config;
    use crate::helper::Notification;
    use crate::tfl;

    fn now() -> chrono::DateTime<chrono::Utc> {
        return chrono::Utc.with_ymd_and_hms(2024, 3, 14, 8, 0, 0).unwrap();
    }

    fn arrival(id: &str, arrives_in_s: i64, lives_for_s: i64) -> tfl::ArrivalPrediction {
        let mut arrival = tfl::ArrivalPrediction::default();
        arrival.id = id.to_string();
        arrival.destination_name = format!("{} Underground Station", id);
        arrival.expected_arrival = now() + chrono::Duration::seconds(arrives_in_s);
        arrival.time_to_live = now() + chrono::Duration::seconds(lives_for_s);
        return arrival;
    }

    fn message(text: &str) -> tfl::DisruptionMessage {
        return tfl::DisruptionMessage{
            text: text.to_string(),
            status_severity: 9,
            status_severity_description: "Minor Delays".to_string(),
            category: None,
            category_description: None,
        };
    }

    fn snapshot(messages: Vec<tfl::DisruptionMessage>) -> tfl::LineStatusSnapshot {
        return tfl::LineStatusSnapshot{
            status: tfl::TubeStatus::Warning,
            description: Some("Minor Delays".to_string()),
            messages: messages,
        };
    }

    fn ids(arrivals: &[tfl::ArrivalPrediction]) -> Vec<String> {
        return arrivals.iter().map(|a| a.id.clone()).collect();
    }

    #[test]
    fn select_nothing() {
        assert!(super::select_display_arrivals(None, 8, now()).is_empty());
        assert!(super::select_display_arrivals(Some(&[][..]), 8, now()).is_empty());
    }

    #[test]
    fn select_drops_past_and_expired() {
        let arrivals = vec![
            arrival("past", -10, 60),
            arrival("expired", 120, -1),
            arrival("now", 0, 0),
            arrival("later", 300, 330),
        ];

        let selected = super::select_display_arrivals(Some(arrivals.as_slice()), 8, now());
        assert_eq!(vec!["now", "later"], ids(&selected));
        for a in &selected {
            assert!(a.expected_arrival >= now());
            assert!(a.time_to_live >= now());
        }
    }

    #[test]
    fn select_sorts_and_limits() {
        let arrivals = vec![
            arrival("c", 600, 630),
            arrival("a", 60, 90),
            arrival("d", 900, 930),
            arrival("b", 300, 330),
        ];

        let selected = super::select_display_arrivals(Some(arrivals.as_slice()), 3, now());
        assert_eq!(vec!["a", "b", "c"], ids(&selected));

        // Input is left alone.
        assert_eq!(vec!["c", "a", "d", "b"], ids(&arrivals));
    }

    #[test]
    fn rotator_wraps() {
        assert_eq!(0, super::next_message_index(2, 3));
        assert_eq!(2, super::next_message_index(1, 3));
        assert_eq!(0, super::next_message_index(0, 1));
        assert_eq!(0, super::next_message_index(0, 0));
    }

    #[test]
    fn cold_start_is_not_loaded() {
        let widget = TubeTimes::new(config::Config::default());
        assert!(!widget.state().loaded);
        assert_eq!(None, widget.state().result);
        assert_eq!(tfl::TubeStatus::Good, widget.state().tube_status);
        assert_eq!(0, widget.state().active_message);
        assert_eq!(config::Config::default().arrivals_url(), widget.arrivals_url());
    }

    #[test]
    fn start_coerces_limit() {
        let mut config = config::Config::default();
        config.limit = Some(0);
        let widget = TubeTimes::new(config);
        assert_eq!(Some(8), widget.config().limit);
    }

    #[test]
    fn restart_keeps_loaded_and_data() {
        let mut state = DisplayState::default();
        state.loaded = true;
        state.result = Some(vec![arrival("a", 60, 90)]);
        state.active_message = 1;
        state.combined_messages = vec![message("one"), message("two")];

        let mut widget = TubeTimes::with_state(config::Config::default(), state.clone());
        widget.start();
        assert_eq!(&state, widget.state());
    }

    #[test]
    fn restart_with_data_becomes_loaded() {
        let mut state = DisplayState::default();
        state.result = Some(vec![arrival("a", 60, 90)]);

        let widget = TubeTimes::with_state(config::Config::default(), state);
        assert!(widget.state().loaded);
    }

    #[test]
    fn restart_with_empty_data_stays_unloaded() {
        let mut state = DisplayState::default();
        state.result = Some(vec![]);

        let widget = TubeTimes::with_state(config::Config::default(), state);
        assert!(!widget.state().loaded);
    }

    #[test]
    fn arrivals_result_is_applied() {
        let mut widget = TubeTimes::new(config::Config::default());
        let url = widget.arrivals_url().to_string();

        let outcome = widget.on_notification(Notification::ArrivalsResult{
            url: url,
            result: Some(vec![arrival("a", 60, 90)]),
        });

        assert_eq!(Outcome::Refresh, outcome);
        assert!(widget.state().loaded);
        assert_eq!(1, widget.state().result.as_ref().unwrap().len());
    }

    #[test]
    fn null_arrivals_result_still_loads() {
        let mut widget = TubeTimes::new(config::Config::default());
        let url = widget.arrivals_url().to_string();

        assert_eq!(Outcome::Refresh, widget.on_notification(Notification::ArrivalsResult{
            url: url,
            result: None,
        }));
        assert!(widget.state().loaded);
        assert!(widget.display_data(now()).journeys.is_empty());
    }

    #[test]
    fn stale_arrivals_result_is_dropped() {
        let mut widget = TubeTimes::new(config::Config::default());

        let outcome = widget.on_notification(Notification::ArrivalsResult{
            url: "https://api.tfl.gov.uk/Line/victoria/Arrivals/940GZZLUOXC?direction=all".to_string(),
            result: Some(vec![arrival("a", 60, 90)]),
        });

        assert_eq!(Outcome::Stale, outcome);
        assert!(!widget.state().loaded);
        assert_eq!(None, widget.state().result);
    }

    #[test]
    fn reconfigure_drops_in_flight_results() {
        let mut widget = TubeTimes::new(config::Config::default());
        let old_url = widget.arrivals_url().to_string();
        let old_status_url = widget.status_url().to_string();

        let mut config = config::Config::default();
        config.line_id = "victoria".to_string();
        widget.reconfigure(config);

        assert_eq!(Outcome::Stale, widget.on_notification(Notification::ArrivalsResult{
            url: old_url,
            result: Some(vec![arrival("a", 60, 90)]),
        }));
        assert_eq!(Outcome::Stale, widget.on_notification(Notification::LineStatusResult{
            service_url: old_status_url,
            snapshot: snapshot(vec![message("one")]),
        }));
        assert_eq!("https://api.tfl.gov.uk/Line/victoria/Status", widget.status_url());
    }

    #[test]
    fn arrivals_rotate_messages() {
        let mut widget = TubeTimes::new(config::Config::default());
        let status_url = widget.status_url().to_string();
        widget.on_notification(Notification::LineStatusResult{
            service_url: status_url,
            snapshot: snapshot(vec![message("one"), message("two"), message("three")]),
        });

        let url = widget.arrivals_url().to_string();
        let mut seen = vec![];
        for _ in 0..4 {
            widget.on_notification(Notification::ArrivalsResult{
                url: url.clone(),
                result: Some(vec![arrival("a", 60, 90)]),
            });
            seen.push(widget.state().active_message);
        }
        assert_eq!(vec![1, 2, 0, 1], seen);
    }

    #[test]
    fn status_before_arrivals_does_not_refresh() {
        let mut widget = TubeTimes::new(config::Config::default());
        let status_url = widget.status_url().to_string();

        let outcome = widget.on_notification(Notification::LineStatusResult{
            service_url: status_url.clone(),
            snapshot: snapshot(vec![message("one")]),
        });
        assert_eq!(Outcome::Stored, outcome);
        assert_eq!(tfl::TubeStatus::Warning, widget.state().tube_status);
        assert_eq!(1, widget.state().combined_messages.len());

        let url = widget.arrivals_url().to_string();
        widget.on_notification(Notification::ArrivalsResult{url: url, result: Some(vec![arrival("a", 60, 90)])});

        let outcome = widget.on_notification(Notification::LineStatusResult{
            service_url: status_url,
            snapshot: tfl::LineStatusSnapshot::default(),
        });
        assert_eq!(Outcome::Refresh, outcome);
        assert_eq!(tfl::TubeStatus::Good, widget.state().tube_status);
        assert!(widget.state().combined_messages.is_empty());
    }

    #[test]
    fn status_with_empty_arrivals_does_not_refresh() {
        let mut widget = TubeTimes::new(config::Config::default());
        let url = widget.arrivals_url().to_string();
        widget.on_notification(Notification::ArrivalsResult{url: url, result: Some(vec![])});

        let status_url = widget.status_url().to_string();
        assert_eq!(Outcome::Stored, widget.on_notification(Notification::LineStatusResult{
            service_url: status_url,
            snapshot: snapshot(vec![message("one")]),
        }));
    }

    #[test]
    fn display_data_filters_and_clamps_message() {
        let mut state = DisplayState::default();
        state.result = Some(vec![arrival("late", 600, 630), arrival("gone", -5, 10), arrival("soon", 60, 90)]);
        state.combined_messages = vec![message("only")];
        state.active_message = 2;

        let mut config = config::Config::default();
        config.title = "Oxford Circus".to_string();
        let widget = TubeTimes::with_state(config, state);

        let data = widget.display_data(now());
        assert_eq!("Oxford Circus", data.line);
        assert!(data.loaded);
        assert_eq!(vec!["soon", "late"], ids(&data.journeys));
        assert_eq!(0, data.active_message);
        assert_eq!(Some("only"), data.active_status_message().map(|m| m.text.as_str()));
    }

    #[test]
    fn display_data_json_shape() {
        let widget = TubeTimes::new(config::Config::default());
        let json = serde_json::to_value(widget.display_data(now())).expect("to_value");

        assert_eq!("Tube Times", json["line"]);
        assert_eq!(false, json["loaded"]);
        assert_eq!("good", json["tubeStatus"]);
        assert!(json["tubeStatusDescription"].is_null());
        assert!(json["statusMessages"].as_array().unwrap().is_empty());
        assert!(json.get("timezone").is_none());
    }

    #[test]
    fn state_file_round_trip_keeps_loaded() {
        let path = std::env::temp_dir().join(format!("tubetimes-state-{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);

        assert_eq!(None, super::load_state(&path).expect("load missing state"));

        let mut widget = TubeTimes::new(config::Config::default());
        let url = widget.arrivals_url().to_string();
        widget.on_notification(Notification::ArrivalsResult{url: url, result: Some(vec![arrival("a", 60, 90)])});
        super::save_state(&path, widget.state()).expect("save_state");

        let restored = super::load_state(&path).expect("load_state").expect("state present");
        let restarted = TubeTimes::with_state(config::Config::default(), restored);
        assert!(restarted.state().loaded);
        assert_eq!(widget.state(), restarted.state());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn failed_save_keeps_previous_state() {
        let dir = std::env::temp_dir().join(format!("tubetimes-failed-save-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create_dir_all");
        let path = dir.join("state.json");

        let mut previous = DisplayState::default();
        previous.loaded = true;
        previous.result = Some(vec![arrival("a", 60, 90)]);
        super::save_state(&path, &previous).expect("save_state");
        assert!(!dir.join("state.json.tmp").exists());

        // A directory where the temp file should go makes the next save fail before the rename.
        std::fs::create_dir(dir.join("state.json.tmp")).expect("create_dir");
        assert!(super::save_state(&path, &DisplayState::default()).is_err());

        let restored = super::load_state(&path).expect("load_state").expect("state present");
        assert_eq!(previous, restored);
        assert!(TubeTimes::with_state(config::Config::default(), restored).state().loaded);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn start_coerces_zero_intervals() {
        let mut config = config::Config::default();
        config.update_interval = std::time::Duration::from_millis(0);
        let widget = TubeTimes::new(config);
        assert_eq!(std::time::Duration::from_secs(20), widget.config().update_interval);
    }

    #[test]
    fn corrupt_state_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("tubetimes-corrupt-{}.json", std::process::id()));
        std::fs::write(&path, "{not json").expect("write");

        assert!(super::load_state(&path).is_err());

        let _ = std::fs::remove_file(&path);
    }
}
