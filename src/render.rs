extern crate chrono;
extern crate std;

use crate::format;
use crate::result;
use crate::tfl;
use crate::widget;

pub trait Renderer {
    fn render(&mut self, data: &widget::DisplayData) -> result::TubeTimesResult<()>;
}

pub struct ConsoleRenderer {}

impl Renderer for ConsoleRenderer {
    fn render(&mut self, data: &widget::DisplayData) -> result::TubeTimesResult<()> {
        for line in render_text(data, chrono::Utc::now()) {
            println!("{}", line);
        }
        println!();
        return Ok(());
    }
}

/// Keeps the most recent view around for the debug server.
#[derive(Clone, Default)]
pub struct SharedView {
    latest: std::sync::Arc<std::sync::Mutex<Option<widget::DisplayData>>>,
}

impl SharedView {
    pub fn latest(&self) -> Option<widget::DisplayData> {
        return self.latest.lock().ok().and_then(|latest| latest.clone());
    }
}

impl Renderer for SharedView {
    fn render(&mut self, data: &widget::DisplayData) -> result::TubeTimesResult<()> {
        let mut latest = self.latest.lock()
            .map_err(|_| result::make_error("shared view lock poisoned"))?;
        *latest = Some(data.clone());
        return Ok(());
    }
}

pub struct FanOut {
    renderers: Vec<Box<dyn Renderer>>,
}

impl FanOut {
    pub fn new(renderers: Vec<Box<dyn Renderer>>) -> FanOut {
        return FanOut{renderers: renderers};
    }
}

impl Renderer for FanOut {
    fn render(&mut self, data: &widget::DisplayData) -> result::TubeTimesResult<()> {
        let mut first_err = None;
        for renderer in self.renderers.iter_mut() {
            if let Err(err) = renderer.render(data) {
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }

        match first_err {
            Some(err) => return Err(err),
            None => return Ok(()),
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct Row {
    pub countdown: String,
    pub clock: String,
    pub destination: String,
    pub platform: String,
}

pub fn rows(data: &widget::DisplayData, now: chrono::DateTime<chrono::Utc>) -> Vec<Row> {
    return data.journeys.iter().map(|journey| {
        let destination = if journey.destination_name.is_empty() {
            &journey.towards
        } else {
            &journey.destination_name
        };

        Row{
            countdown: format::minutes_to_arrival(now, journey.expected_arrival),
            clock: format::format_time(journey.expected_arrival, data.timezone),
            destination: format::capitalize_first(&format::remove_station_suffix(destination)),
            platform: journey.platform_name.clone(),
        }
    }).collect();
}

/// Footer text. With no disruption messages it falls back to the overall line status.
pub fn status_line(data: &widget::DisplayData) -> String {
    match data.active_status_message() {
        None => {
            match data.tube_status {
                tfl::TubeStatus::Good => return "Good service".to_string(),
                _ => return format::capitalize_first(
                    data.tube_status_description.as_ref().map(String::as_str).unwrap_or("Service disruption")),
            }
        },
        Some(message) => {
            let mut line = format!("{}: {}",
                                   format::capitalize_first(&message.status_severity_description),
                                   format::truncate_at_sentence(&message.text, format::DEFAULT_TRUNCATE_LENGTH));
            if data.status_messages.len() > 1 {
                line.push_str(&format!(" ({}/{})", data.active_message + 1, data.status_messages.len()));
            }
            return line;
        },
    }
}

pub fn render_text(data: &widget::DisplayData, now: chrono::DateTime<chrono::Utc>) -> Vec<String> {
    let mut lines = vec![data.line.clone()];

    if !data.loaded {
        lines.push("Loading...".to_string());
        return lines;
    }

    let rows = rows(data, now);
    if rows.is_empty() {
        lines.push("No upcoming trains".to_string());
    }
    for row in rows {
        lines.push(format!("{:>10}  {}  {:<24} {}", row.countdown, row.clock, row.destination, row.platform));
    }

    lines.push(status_line(data));
    return lines;
}

pub fn render_html(data: &widget::DisplayData, now: chrono::DateTime<chrono::Utc>) -> String {
    let status_class = match data.tube_status {
        tfl::TubeStatus::Good => "good",
        tfl::TubeStatus::Warning => "warning",
        tfl::TubeStatus::Severe => "severe",
    };

    let mut body = format!("<div class='tubetimes'><h2>{}</h2>", escape_html(&data.line));

    if !data.loaded {
        body.push_str("<div class='loading'>Loading...</div></div>");
        return body;
    }

    let rows = rows(data, now);
    if rows.is_empty() {
        body.push_str("<div class='empty'>No upcoming trains</div>");
    } else {
        body.push_str("<table>");
        for row in rows {
            body.push_str(&format!(
                "<tr><td class='countdown'>{}</td><td class='clock'>{}</td><td>{}</td><td class='platform'>{}</td></tr>",
                escape_html(&row.countdown),
                escape_html(&row.clock),
                escape_html(&row.destination),
                escape_html(&row.platform)));
        }
        body.push_str("</table>");
    }

    body.push_str(&format!("<div class='status {}'>{}</div></div>", status_class, escape_html(&status_line(data))));
    return body;
}

fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    return escaped;
}
