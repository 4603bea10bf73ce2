//! Text wire format shared by the server and the client.
//!
//! Requests are a single `\n`-terminated line. Responses are a status line
//! (`ok` or `error`), an optional body of `<name> <value> <timestamp>` lines,
//! and an empty line:
//!
//! ```text
//! ok\n\n
//! ok\ncpu 0.5 1000\ncpu 0.7 1010\n\n
//! error\nwrong command\n\n
//! ```

use std::collections::BTreeMap;

use crate::command::Reply;
use crate::store::Snapshot;

pub const TERMINATOR: char = '\n';

/// Marks the end of every response.
pub const RESPONSE_END: &str = "\n\n";

pub const STATUS_OK: &str = "ok";

pub const ERROR_RESPONSE: &str = "error\nwrong command\n\n";

/// Client-side view of a `get` result: samples per metric, oldest first.
pub type Samples = BTreeMap<String, Vec<(i64, f64)>>;

pub fn encode_reply(reply: &Reply) -> String {
    match reply {
        Reply::Stored => format!("{STATUS_OK}{RESPONSE_END}"),
        Reply::Samples(snapshot) => encode_snapshot(snapshot),
    }
}

fn encode_snapshot(snapshot: &Snapshot) -> String {
    let mut response = String::from(STATUS_OK);
    for (name, series) in snapshot {
        for (timestamp, value) in series {
            response.push(TERMINATOR);
            response.push_str(&format!("{name} {} {timestamp}", format_value(*value)));
        }
    }
    response.push_str(RESPONSE_END);
    response
}

/// Shortest round-trip form; integral values keep a `.0` suffix.
///
/// Very large or small magnitudes use Rust's exponent form without a sign or
/// zero padding (`1e20`, `1e-7`), not `1e+20` / `1e-07`. Both parse as floats.
pub fn format_value(value: f64) -> String {
    format!("{value:?}")
}

pub fn put_request(name: &str, value: f64, timestamp: i64) -> String {
    format!("put {name} {} {timestamp}{TERMINATOR}", format_value(value))
}

pub fn get_request(name: &str) -> String {
    format!("get {name}{TERMINATOR}")
}

/// Collects the sample lines that follow the status line.
///
/// Lines that are not `<name> <value> <timestamp>` with a float value and an
/// integer timestamp are skipped.
pub fn parse_samples<'a>(lines: impl IntoIterator<Item = &'a str>) -> Samples {
    let mut samples = Samples::new();
    for line in lines {
        if let Some((name, timestamp, value)) = parse_sample_line(line) {
            samples
                .entry(name.to_string())
                .or_default()
                .push((timestamp, value));
        }
    }

    for series in samples.values_mut() {
        series.sort_by_key(|(timestamp, _)| *timestamp);
    }
    samples
}

fn parse_sample_line(line: &str) -> Option<(&str, i64, f64)> {
    let mut parts = line.split_whitespace();
    let (name, value, timestamp) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    Some((name, timestamp.parse().ok()?, value.parse().ok()?))
}
