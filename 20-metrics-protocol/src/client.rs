//! Blocking client for the metrics protocol.
//!
//! Each call writes one request and blocks until the `\n\n` response
//! terminator arrives. The configured timeout applies to connecting and to
//! every individual socket read or write.
//!
//! ```no_run
//! use metrics_protocol::client::{ClientConfig, MetricsClient};
//!
//! # fn main() -> Result<(), metrics_protocol::client::ClientError> {
//! let samples = MetricsClient::scoped(&ClientConfig::new("127.0.0.1:8888"), |client| {
//!     client.put("cpu", 0.5, Some(1000))?;
//!     client.get("cpu")
//! })?;
//! assert_eq!(samples["cpu"], vec![(1000, 0.5)]);
//! # Ok(())
//! # }
//! ```

use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use thiserror::Error;
use tracing::debug;

use crate::protocol::{self, RESPONSE_END, STATUS_OK, Samples};

const READ_CHUNK: usize = 4 * 1024;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("server rejected command: {0}")]
    ServerRejected(String),
    #[error("server error: {0}")]
    ServerError(String),
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("server closed the connection before the response was complete")]
    Disconnected,
    #[error("client connection is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub addr: String,
    /// Applied to connect and to every read and write; `None` blocks forever.
    /// A zero timeout is rejected by [`MetricsClient::connect`].
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug)]
pub struct MetricsClient {
    stream: Option<TcpStream>,
}

impl MetricsClient {
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        if config.timeout == Some(Duration::ZERO) {
            return Err(ClientError::InvalidArgument(
                "timeout must be greater than zero".to_string(),
            ));
        }

        let stream = open_stream(config).map_err(|source| ClientError::Connection {
            addr: config.addr.clone(),
            source,
        })?;
        debug!(addr = %config.addr, "connected to metrics server");

        Ok(Self {
            stream: Some(stream),
        })
    }

    /// Connects, runs `f`, and closes the connection whether `f` succeeds or not.
    pub fn scoped<T, F>(config: &ClientConfig, f: F) -> Result<T>
    where
        F: FnOnce(&mut MetricsClient) -> Result<T>,
    {
        let mut client = Self::connect(config)?;
        let result = f(&mut client);
        client.close();
        result
    }

    /// Stores one sample. A missing timestamp means the current Unix time.
    pub fn put(&mut self, metric: &str, value: f64, timestamp: Option<i64>) -> Result<()> {
        validate_metric(metric)?;
        if !value.is_finite() {
            return Err(ClientError::InvalidArgument(format!(
                "value must be a finite number, got {value}"
            )));
        }

        let timestamp = timestamp.unwrap_or_else(unix_now);
        let response = self.request(&protocol::put_request(metric, value, timestamp))?;

        if response.lines().next() != Some(STATUS_OK) {
            return Err(ClientError::ServerRejected(response));
        }
        Ok(())
    }

    /// Fetches one metric, or every metric with `*`.
    pub fn get(&mut self, metric: &str) -> Result<Samples> {
        validate_metric(metric)?;
        let response = self.request(&protocol::get_request(metric))?;

        let mut lines = response.lines();
        match lines.next() {
            Some(status) if status.starts_with(STATUS_OK) => Ok(protocol::parse_samples(lines)),
            _ => Err(ClientError::ServerError(response)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Releases the connection. Safe to call any number of times.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.shutdown(Shutdown::Both) {
                debug!(error = ?err, "failed to shut down client connection");
            }
        }
    }

    /// Sends one request and returns the response with surrounding
    /// whitespace trimmed.
    fn request(&mut self, request: &str) -> Result<String> {
        let stream = self.stream.as_mut().ok_or(ClientError::Closed)?;
        stream.write_all(request.as_bytes())?;
        stream.flush()?;

        let mut response = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        while !response.ends_with(RESPONSE_END.as_bytes()) {
            let read = stream.read(&mut chunk)?;
            if read == 0 {
                return Err(ClientError::Disconnected);
            }
            response.extend_from_slice(&chunk[..read]);
        }

        let response = String::from_utf8(response)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        Ok(response.trim().to_string())
    }
}

impl Drop for MetricsClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_stream(config: &ClientConfig) -> io::Result<TcpStream> {
    let stream = match config.timeout {
        None => TcpStream::connect(config.addr.as_str())?,
        Some(timeout) => connect_with_timeout(&config.addr, timeout)?,
    };
    stream.set_read_timeout(config.timeout)?;
    stream.set_write_timeout(config.timeout)?;
    Ok(stream)
}

fn connect_with_timeout(addr: &str, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
    }))
}

/// A metric name must be one non-empty token, or it would break the request line.
fn validate_metric(metric: &str) -> Result<()> {
    if metric.is_empty() || metric.chars().any(char::is_whitespace) {
        return Err(ClientError::InvalidArgument(format!(
            "metric name must be a non-empty token without whitespace, got {metric:?}"
        )));
    }
    Ok(())
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}
