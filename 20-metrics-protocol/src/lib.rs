//! In-memory time-series metrics over a line-oriented TCP protocol.
//!
//! A server stores `(timestamp, value)` samples per metric name and answers
//! point and wildcard queries; a blocking client speaks the same protocol.
//!
//! - [`store`] holds the shared metric table.
//! - [`command`] parses `put` / `get` request lines and applies them.
//! - [`framing`] turns a byte stream into one request per read cycle.
//! - [`protocol`] encodes responses and decodes them on the client side.
//! - [`connection`] runs the request loop for a single connection.
//! - [`server`] accepts connections and shares one store between them.
//! - [`client`] is the blocking client.
//! - [`cli`] parses the command line for the `metrics_protocol` binary.

pub mod cli;
pub mod client;
pub mod command;
pub mod connection;
pub mod framing;
pub mod protocol;
pub mod server;
pub mod store;
