extern crate chrono;
extern crate chrono_tz;

const STATION_SUFFIXES: [&str; 2] = ["Rail Station", "Underground Station"];

pub const DEFAULT_TRUNCATE_LENGTH: usize = 200;

const ELLIPSIS: &str = "...";

/// Relative countdown shown next to each arrival: "Due", "1 min", "in N mins" or "H hr M min".
pub fn minutes_to_arrival(now: chrono::DateTime<chrono::Utc>, target: chrono::DateTime<chrono::Utc>) -> String {
    let diff_ms = (target - now).num_milliseconds();
    let minutes = diff_ms.div_euclid(1000 * 60);

    if minutes <= 1 {
        let seconds = diff_ms.div_euclid(1000);
        if seconds <= 30 {
            return "Due".to_string();
        }
        return "1 min".to_string();
    }

    if minutes < 60 {
        return format!("in {} mins", minutes);
    }

    return format!("{} hr {} min", minutes / 60, minutes % 60);
}

pub fn format_time(time: chrono::DateTime<chrono::Utc>, tz: chrono_tz::Tz) -> String {
    return time.with_timezone(&tz).format("%H:%M").to_string();
}

pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => return String::new(),
        Some(first) => return first.to_uppercase().chain(chars).collect(),
    }
}

pub fn remove_station_suffix(s: &str) -> String {
    let mut stripped = s.to_string();
    for suffix in STATION_SUFFIXES.iter() {
        stripped = stripped.replace(suffix, "");
    }
    return stripped.trim().to_string();
}

// Lengths and positions are counted in chars, so multi-byte text never splits mid-character.
pub fn truncate_at_sentence(text: &str, max_length: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_length {
        return text.to_string();
    }

    let search_start = std::cmp::min(100, max_length / 2);
    let first_period = chars.iter()
        .skip(search_start)
        .position(|c| *c == '.')
        .map(|offset| offset + search_start);

    match first_period {
        Some(period_index) if period_index <= max_length => {
            let mut truncated: String = chars[..period_index + 1].iter().collect();
            truncated.push_str(ELLIPSIS);
            return truncated;
        },
        _ => {
            let mut truncated: String = chars[..max_length].iter().collect();
            truncated.push_str(ELLIPSIS);
            return truncated;
        },
    }
}
