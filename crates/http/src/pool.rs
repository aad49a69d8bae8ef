//! Keep-alive connection pooling.
//!
//! Idle TCP connections are parked per origin and reused by later fragment
//! requests to the same origin. The pool is shared by all in-flight page
//! compositions, so access is guarded by a plain mutex; the critical sections
//! only move streams in and out of a map.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tokio::net::TcpStream;
use tracing::trace;

/// Connection partition key. Only plain HTTP origins are pooled, so the
/// scheme is not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    host: String,
    port: u16,
}

impl Origin {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// A pool of idle keep-alive connections, keyed by origin.
#[derive(Debug)]
pub struct ConnectionPool {
    max_idle_per_origin: usize,
    idle: Mutex<HashMap<Origin, VecDeque<TcpStream>>>,
}

impl ConnectionPool {
    pub fn new(max_idle_per_origin: usize) -> Self {
        Self { max_idle_per_origin, idle: Mutex::new(HashMap::new()) }
    }

    /// Takes an idle connection for `origin`, if one is parked.
    pub fn checkout(&self, origin: &Origin) -> Option<TcpStream> {
        let mut idle = self.idle.lock().expect("connection pool lock poisoned");
        let stream = idle.get_mut(origin).and_then(VecDeque::pop_front);
        if stream.is_some() {
            trace!(host = origin.host(), port = origin.port(), "reusing pooled connection");
        }
        stream
    }

    /// Parks a connection for reuse, dropping it when the origin is full.
    pub fn checkin(&self, origin: Origin, stream: TcpStream) {
        let mut idle = self.idle.lock().expect("connection pool lock poisoned");
        let parked = idle.entry(origin).or_default();
        if parked.len() < self.max_idle_per_origin {
            parked.push_back(stream);
        }
    }
}
