//! Mapping of raw tool output lines to overall progress.
//!
//! The fetch phase owns the lower half of the scale (0-50), the transcode phase
//! the upper half (50-99). 100 is only reached when the orchestrator finalizes
//! a task. Both functions are pure: a line that does not carry a usable value
//! yields `None` and the caller leaves progress untouched.

use std::time::Duration;

/// Assumed total media length used to estimate transcode progress.
///
/// This is a heuristic: the real duration is never probed.
pub const ASSUMED_MEDIA_DURATION: Duration = Duration::from_secs(2 * 3600);

/// Marker preceding the elapsed timestamp in transcoder output.
const TIME_MARKER: &str = "time=";

/// Width of an `HH:MM:SS.ff` timestamp.
const TIMESTAMP_LEN: usize = 11;

/// Highest value the transcode phase may report before the tool exits.
pub const TRANSCODE_CEILING: u8 = 99;

/// Extracts the fetch-phase contribution (0-50) from a fetcher output line.
///
/// Takes the text before the first `%`, keeps what follows the last space and
/// parses it as a percentage, e.g. `"Vid 1280x720 | 45.20% 3.1MBps"` gives 22.
pub fn fetch_progress(line: &str) -> Option<u8> {
    let (before, _) = line.split_once('%')?;
    let before = before.trim();
    let token = match before.rfind(char::is_whitespace) {
        Some(idx) => before[idx..].trim(),
        None => before,
    };

    let percent: f64 = token.parse().ok()?;
    if !(0.0..=100.0).contains(&percent) {
        return None;
    }
    Some((percent * 0.5).floor() as u8)
}

/// Extracts the transcode-phase contribution (50-99) from a transcoder output
/// line, estimating against `assumed_total`.
pub fn transcode_progress(line: &str, assumed_total: Duration) -> Option<u8> {
    let elapsed = parse_elapsed(line)?;
    let total = assumed_total.as_secs_f64();
    if total <= 0.0 {
        return None;
    }

    let share = (elapsed.as_secs_f64() / total * 100.0).floor();
    let share = share.min(f64::from(TRANSCODE_CEILING - 50)) as u8;
    Some(50 + share)
}

/// Parses the `HH:MM:SS.ff` timestamp following `time=`.
pub fn parse_elapsed(line: &str) -> Option<Duration> {
    let start = line.find(TIME_MARKER)? + TIME_MARKER.len();
    let stamp = line.get(start..start + TIMESTAMP_LEN)?.trim();

    let mut parts = stamp.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }

    let whole = hours * 3600 + minutes * 60;
    Some(Duration::from_secs(whole) + Duration::from_secs_f64(seconds))
}
