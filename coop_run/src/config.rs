use std::net::SocketAddr;
use std::time::Duration;

/// Runtime settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity of the reactor's event buffer per poll.
    pub event_capacity: usize,
    /// How long one reactor poll may block; `None` waits until an event or shutdown.
    pub reactor_timeout: Option<Duration>,
    /// Name of the reactor thread.
    pub thread_name: String,
    /// Serve Prometheus metrics on this address when set.
    pub metrics_listener: Option<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            event_capacity: 1024,
            reactor_timeout: None,
            thread_name: "coop-reactor".to_string(),
            metrics_listener: None,
        }
    }
}
