use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::protocol::MessageKind;

/// Counters for the A2A surface, registered once per registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    messages_received: IntCounterVec,
    requests: IntCounterVec,
    pending_requests: IntGauge,
}

impl Metrics {
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let messages_received = IntCounterVec::new(
            Opts::new("a2a_messages_received_total", "Inbound A2A messages"),
            &["kind", "transport"],
        )?;
        let requests = IntCounterVec::new(
            Opts::new("a2a_requests_total", "Outbound requests by outcome"),
            &["outcome"],
        )?;
        let pending_requests = IntGauge::new(
            "a2a_pending_requests",
            "Requests currently awaiting a reply",
        )?;

        registry.register(Box::new(messages_received.clone()))?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(pending_requests.clone()))?;

        Ok(Self {
            registry: registry.clone(),
            messages_received,
            requests,
            pending_requests,
        })
    }

    pub fn message_received(&self, kind: MessageKind, transport: &str) {
        self.messages_received
            .with_label_values(&[kind.as_str(), transport])
            .inc();
    }

    pub fn request_finished(&self, outcome: &str) {
        self.requests.with_label_values(&[outcome]).inc();
    }

    /// Text exposition of every metric in the registry.
    pub fn render(&self, pending: usize) -> Result<(String, String), prometheus::Error> {
        self.pending_requests.set(pending as i64);

        let encoder = TextEncoder::new();
        let mut buffer = vec![];
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((
            String::from_utf8_lossy(&buffer).into_owned(),
            encoder.format_type().to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_counters() {
        let metrics = Metrics::register(&Registry::new()).unwrap();
        metrics.message_received(MessageKind::Request, "ws");
        metrics.request_finished("timed_out");

        let (text, content_type) = metrics.render(2).unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains(r#"a2a_messages_received_total{kind="request",transport="ws"} 1"#));
        assert!(text.contains(r#"a2a_requests_total{outcome="timed_out"} 1"#));
        assert!(text.contains("a2a_pending_requests 2"));
    }

    #[test]
    fn double_registration_fails() {
        let registry = Registry::new();
        Metrics::register(&registry).unwrap();
        assert!(Metrics::register(&registry).is_err());
    }
}
