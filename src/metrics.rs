//! Per-client Prometheus metrics

use prometheus::{IntCounter, IntGauge, Opts, Registry};

use crate::error::Result;

/// Counters and gauges describing one client
///
/// Created unregistered; call [`register`](Self::register) to expose them.
#[derive(Debug, Clone)]
pub struct ClientMetrics {
    pub frames_sent: IntCounter,
    pub frames_received: IntCounter,
    pub connect_attempts: IntCounter,
    pub connect_failures: IntCounter,
    pub requests_timed_out: IntCounter,
    pub pushes_dropped: IntCounter,
    pub pending_requests: IntGauge,
    pub queued_requests: IntGauge,
    pub connection_open: IntGauge,
}

impl ClientMetrics {
    pub fn new() -> Result<Self> {
        Ok(Self {
            frames_sent: counter("quote_stream_frames_sent_total", "Frames written to the transport")?,
            frames_received: counter(
                "quote_stream_frames_received_total",
                "Frames read from the transport",
            )?,
            connect_attempts: counter(
                "quote_stream_connect_attempts_total",
                "Connect attempts started",
            )?,
            connect_failures: counter(
                "quote_stream_connect_failures_total",
                "Connect attempts that did not reach open",
            )?,
            requests_timed_out: counter(
                "quote_stream_requests_timed_out_total",
                "Correlated requests that got no reply in time",
            )?,
            pushes_dropped: counter(
                "quote_stream_pushes_dropped_total",
                "Pushed frames with no subscriber",
            )?,
            pending_requests: gauge(
                "quote_stream_pending_requests",
                "Requests awaiting a correlated reply",
            )?,
            queued_requests: gauge(
                "quote_stream_queued_requests",
                "Requests waiting for the connection to open",
            )?,
            connection_open: gauge("quote_stream_connection_open", "1 while the connection is open")?,
        })
    }

    /// Register every metric into `registry`
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.frames_sent.clone()))?;
        registry.register(Box::new(self.frames_received.clone()))?;
        registry.register(Box::new(self.connect_attempts.clone()))?;
        registry.register(Box::new(self.connect_failures.clone()))?;
        registry.register(Box::new(self.requests_timed_out.clone()))?;
        registry.register(Box::new(self.pushes_dropped.clone()))?;
        registry.register(Box::new(self.pending_requests.clone()))?;
        registry.register(Box::new(self.queued_requests.clone()))?;
        registry.register(Box::new(self.connection_open.clone()))?;
        Ok(())
    }
}

fn counter(name: &str, help: &str) -> Result<IntCounter> {
    Ok(IntCounter::with_opts(Opts::new(name, help))?)
}

fn gauge(name: &str, help: &str) -> Result<IntGauge> {
    Ok(IntGauge::with_opts(Opts::new(name, help))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_exposes_metrics() {
        let metrics = ClientMetrics::new().unwrap();
        let registry = Registry::new();
        metrics.register(&registry).unwrap();

        metrics.frames_sent.inc();
        metrics.connection_open.set(1);

        let families = registry.gather();
        assert_eq!(families.len(), 9);
        let sent = families
            .iter()
            .find(|f| f.get_name() == "quote_stream_frames_sent_total")
            .unwrap();
        assert_eq!(sent.get_metric()[0].get_counter().get_value(), 1.0);
    }

    #[test]
    fn test_double_registration_fails() {
        let metrics = ClientMetrics::new().unwrap();
        let registry = Registry::new();
        metrics.register(&registry).unwrap();
        assert!(metrics.register(&registry).is_err());
    }
}
