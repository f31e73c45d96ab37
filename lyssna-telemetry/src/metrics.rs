//! Prometheus counters for the event-ingest path.

use prometheus::{Counter, Histogram, HistogramOpts, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub processed_events: Counter,
    pub dropped_events: Counter,
    pub connections_tracked: Counter,
    pub dispatch_latency: Histogram,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let registry = Registry::new();
        let processed_events =
            Counter::new("lyssna_events_total", "Total processed remote events").unwrap();
        let dropped_events = Counter::new(
            "lyssna_events_dropped_total",
            "Remote events dropped on decode, lookup or schema failure",
        )
        .unwrap();
        let connections_tracked = Counter::new(
            "lyssna_connections_created_total",
            "Connections created from remote new-connection events",
        )
        .unwrap();

        let dispatch_latency = Histogram::with_opts(
            HistogramOpts::new(
                "lyssna_dispatch_latency_us",
                "Per-event correlation processing time",
            )
            .buckets(vec![1.0, 10.0, 100.0, 1_000.0, 10_000.0]),
        )
        .unwrap();

        registry
            .register(Box::new(processed_events.clone()))
            .unwrap();
        registry.register(Box::new(dropped_events.clone())).unwrap();
        registry
            .register(Box::new(connections_tracked.clone()))
            .unwrap();
        registry
            .register(Box::new(dispatch_latency.clone()))
            .unwrap();

        Self {
            registry,
            processed_events,
            dropped_events,
            connections_tracked,
            dispatch_latency,
        }
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap())
    }

    pub fn inc_processed_events(&self) {
        self.processed_events.inc();
    }

    pub fn inc_dropped_events(&self) {
        self.dropped_events.inc();
    }

    pub fn inc_connections_tracked(&self) {
        self.connections_tracked.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_gathered_text() {
        let metrics = MetricsRecorder::new();
        metrics.inc_processed_events();
        metrics.inc_dropped_events();
        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("lyssna_events_total 1"));
        assert!(text.contains("lyssna_events_dropped_total 1"));
        assert!(text.contains("lyssna_connections_created_total 0"));
    }
}
