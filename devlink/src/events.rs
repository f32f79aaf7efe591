//! Link events and the sinks that receive them.
//!
//! Every connection attempt and every I/O failure is reported as a
//! [`LinkEvent`] to the [`EventSink`] injected into the link. Programs use
//! [`TracingSink`] to turn events into log lines; tests use [`RecordingSink`]
//! to assert on the exact sequence.

use crate::link::{FailureKind, LinkHealth};
use crate::tracing::prelude::*;
use parking_lot::Mutex;

/// Something that happened on a device link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A connection attempt (discovery scan or open) is starting.
    Attempt { attempt: u32, max_retries: u32 },

    /// A port was opened.
    Connected {
        port: String,
        description: Option<String>,
    },

    /// A connection attempt did not produce an open port.
    AttemptFailed { attempt: u32, reason: String },

    /// Discovery found no matching port in any scan.
    DeviceNotFound { pattern: String, max_retries: u32 },

    /// The configured port could not be opened in any attempt.
    OpenExhausted { port: String, max_retries: u32 },

    SendFailed { kind: FailureKind, reason: String },

    ReceiveFailed { kind: FailureKind, reason: String },

    HealthChanged { from: LinkHealth, to: LinkHealth },

    /// The transport is being dropped and the port reopened.
    Reconnecting { failures: u32 },
}

/// Receiver of link events.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &LinkEvent);
}

/// Sink that emits every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &LinkEvent) {
        match event {
            LinkEvent::Attempt {
                attempt,
                max_retries,
            } => {
                info!(attempt, max_retries, "Attempt {attempt} of {max_retries} to connect.");
            }
            LinkEvent::Connected { port, description } => match description {
                Some(description) => info!(port = %port, "{description} connected."),
                None => info!(port = %port, "Serial device connected."),
            },
            LinkEvent::AttemptFailed { attempt, reason } => {
                info!(attempt, reason = %reason, "Attempt {attempt} failed.");
            }
            LinkEvent::DeviceNotFound {
                pattern,
                max_retries,
            } => {
                warn!(
                    pattern = %pattern,
                    max_retries,
                    "No port matching {pattern:?} found, max retries reached. Configure the port explicitly."
                );
            }
            LinkEvent::OpenExhausted { port, max_retries } => {
                warn!(port = %port, max_retries, "Serial device not connected, max retries reached.");
            }
            LinkEvent::SendFailed { kind, reason } => {
                debug!(kind = %kind, reason = %reason, "Send failed.");
            }
            LinkEvent::ReceiveFailed { kind, reason } => {
                error!(kind = %kind, reason = %reason, "Receive failed.");
            }
            LinkEvent::HealthChanged { from, to } => {
                info!(from = %from, to = %to, "Link health changed.");
            }
            LinkEvent::Reconnecting { failures } => {
                warn!(failures, "Reconnecting after repeated transport failures.");
            }
        }
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<LinkEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events matching `pred`.
    pub fn count(&self, pred: impl Fn(&LinkEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: &LinkEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;
    use test_case::test_case;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.record(&LinkEvent::Attempt {
            attempt: 1,
            max_retries: 2,
        });
        sink.record(&LinkEvent::AttemptFailed {
            attempt: 1,
            reason: "busy".to_string(),
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], LinkEvent::Attempt { attempt: 1, .. }));
        assert!(matches!(events[1], LinkEvent::AttemptFailed { attempt: 1, .. }));
        assert_eq!(
            sink.count(|e| matches!(e, LinkEvent::AttemptFailed { .. })),
            1
        );

        sink.clear();
        assert!(sink.events().is_empty());
    }

    /// Writer handing formatted log output to a shared buffer.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    // Render one event through TracingSink and return the log line.
    fn render(event: &LinkEvent) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(::tracing::Level::TRACE)
            .with_ansi(false)
            .without_time()
            .with_target(false)
            .with_writer(move || writer.clone())
            .finish();

        ::tracing::subscriber::with_default(subscriber, || TracingSink.record(event));

        let bytes = captured.0.lock().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test_case(LinkEvent::Attempt { attempt: 2, max_retries: 5 }, "INFO", "Attempt 2 of 5 to connect."; "attempt")]
    #[test_case(LinkEvent::Connected { port: "COM3".into(), description: Some("Arduino Uno".into()) }, "INFO", "Arduino Uno connected."; "connected")]
    #[test_case(LinkEvent::AttemptFailed { attempt: 1, reason: "busy".into() }, "INFO", "Attempt 1 failed."; "attempt failed")]
    #[test_case(LinkEvent::DeviceNotFound { pattern: "Arduino".into(), max_retries: 5 }, "WARN", "max retries reached"; "discovery exhausted")]
    #[test_case(LinkEvent::OpenExhausted { port: "COM3".into(), max_retries: 3 }, "WARN", "max retries reached"; "open exhausted")]
    #[test_case(LinkEvent::SendFailed { kind: FailureKind::Transport, reason: "gone".into() }, "DEBUG", "kind=transport"; "send failed")]
    #[test_case(LinkEvent::ReceiveFailed { kind: FailureKind::Decode, reason: "bad".into() }, "ERROR", "kind=decode"; "receive failed")]
    #[test_case(LinkEvent::HealthChanged { from: LinkHealth::Connected, to: LinkHealth::Degraded }, "INFO", "to=degraded"; "health changed")]
    #[test_case(LinkEvent::Reconnecting { failures: 3 }, "WARN", "failures=3"; "reconnecting")]
    fn test_tracing_sink_levels(event: LinkEvent, level: &str, text: &str) {
        let line = render(&event);
        assert!(line.trim_start().starts_with(level), "{:?}", line);
        assert!(line.contains(text), "{:?}", line);
    }
}
