//! Device link: connection management and framed send/receive.
//!
//! A [`DeviceLink`] is created by [`DeviceLink::connect`], which either opens
//! the configured port or discovers one by description. Connecting never
//! fails: when no port can be opened the link is returned unconnected and
//! the caller checks [`DeviceLink::is_connected`].
//!
//! I/O comes in two flavors. [`DeviceLink::send_frame`] and
//! [`DeviceLink::receive_frame`] return a [`LinkError`] describing what went
//! wrong. [`DeviceLink::send`] and [`DeviceLink::receive`] collapse every
//! failure to `false` or `None` for loops that simply try again next cycle.
//! Both flavors report failures to the event sink and update
//! [`LinkHealth`].

use crate::config::{LinkConfig, ReconnectPolicy};
use crate::events::{EventSink, LinkEvent, TracingSink};
use crate::frame::{FrameCodec, FrameError};
use crate::transport::{PortInfo, PortOpener, SerialOpener};
use futures::SinkExt;
use std::{io, str, sync::Arc, time::Duration};
use strum::Display;
use thiserror::Error;
use tokio::time;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;

/// Connection state as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LinkHealth {
    /// No transport is open.
    Unconnected,
    /// The transport is open and the last operation on it succeeded.
    Connected,
    /// The transport is open but the last transport operation failed.
    Degraded,
}

/// Coarse classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Decode,
    Other,
}

/// Errors from link operations.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("link is not connected")]
    NotConnected,

    #[error("value {value} does not fit in {digits} digits")]
    Overflow { value: i64, digits: usize },

    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    #[error("inbound line is not valid UTF-8: {0}")]
    Decode(#[source] str::Utf8Error),

    #[error("inbound line longer than {max_length} bytes")]
    LineTooLong { max_length: usize },

    #[error("serial stream closed")]
    Closed,

    #[error("no line received within {0:?}")]
    Timeout(Duration),
}

impl LinkError {
    pub fn kind(&self) -> FailureKind {
        match self {
            LinkError::Transport(_) => FailureKind::Transport,
            LinkError::Decode(_) | LinkError::LineTooLong { .. } => FailureKind::Decode,
            LinkError::NotConnected
            | LinkError::Overflow { .. }
            | LinkError::Closed
            | LinkError::Timeout(_) => FailureKind::Other,
        }
    }

    /// Whether this failure says something about the transport itself.
    fn degrades_link(&self) -> bool {
        matches!(
            self,
            LinkError::Transport(_) | LinkError::Closed | LinkError::Timeout(_)
        )
    }
}

impl From<FrameError> for LinkError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Overflow { value, digits } => LinkError::Overflow { value, digits },
            FrameError::Decode(e) => LinkError::Decode(e),
            FrameError::LineTooLong { max_length } => LinkError::LineTooLong { max_length },
            FrameError::Io(e) => LinkError::Transport(e),
        }
    }
}

/// Framed link to one serial device.
pub struct DeviceLink<O: PortOpener = SerialOpener> {
    opener: O,
    config: LinkConfig,
    sink: Arc<dyn EventSink>,
    framed: Option<Framed<O::Port, FrameCodec>>,
    port_name: Option<String>,
    health: LinkHealth,
    failures: u32,
}

impl DeviceLink<SerialOpener> {
    /// Connect to a host serial port, logging through `tracing`.
    pub async fn connect(config: LinkConfig) -> Self {
        Self::connect_with(SerialOpener, config, Arc::new(TracingSink)).await
    }
}

impl<O: PortOpener> DeviceLink<O> {
    /// Connect through `opener`, reporting progress to `sink`.
    pub async fn connect_with(opener: O, config: LinkConfig, sink: Arc<dyn EventSink>) -> Self {
        let mut link = Self {
            opener,
            config,
            sink,
            framed: None,
            port_name: None,
            health: LinkHealth::Unconnected,
            failures: 0,
        };
        link.establish().await;
        link
    }

    pub fn health(&self) -> LinkHealth {
        self.health
    }

    /// Whether a transport is open, even if degraded.
    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Name of the open port.
    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Failures counted toward the reconnect policy since the last successful
    /// operation or reconnect.
    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// Send `values` as one frame. Returns `false` on any failure.
    pub async fn send(&mut self, values: &[i64]) -> bool {
        self.send_frame(values).await.is_ok()
    }

    /// Receive one frame's fields. Returns `None` on any failure.
    pub async fn receive(&mut self) -> Option<Vec<String>> {
        self.receive_frame().await.ok()
    }

    /// Send `values` as one frame.
    ///
    /// A value wider than the configured digits rejects the whole frame and
    /// nothing is written.
    pub async fn send_frame(&mut self, values: &[i64]) -> Result<(), LinkError> {
        let result = match self.framed.as_mut() {
            Some(framed) => framed.send(values).await.map_err(LinkError::from),
            None => Err(LinkError::NotConnected),
        };

        if let Err(e) = &result {
            self.sink.record(&LinkEvent::SendFailed {
                kind: e.kind(),
                reason: e.to_string(),
            });
        }
        self.settle(&result).await;
        result
    }

    /// Receive one line and split it into fields.
    pub async fn receive_frame(&mut self) -> Result<Vec<String>, LinkError> {
        let result = self.read_line().await;

        if let Err(e) = &result {
            self.sink.record(&LinkEvent::ReceiveFailed {
                kind: e.kind(),
                reason: e.to_string(),
            });
        }
        self.settle(&result).await;
        result
    }

    /// Drop the transport, if any, and run the connection procedure again.
    ///
    /// Returns whether a port was opened.
    pub async fn reconnect(&mut self) -> bool {
        self.sink.record(&LinkEvent::Reconnecting {
            failures: self.failures,
        });
        self.framed = None;
        self.port_name = None;
        self.failures = 0;
        self.set_health(LinkHealth::Unconnected);
        self.establish().await
    }

    async fn read_line(&mut self) -> Result<Vec<String>, LinkError> {
        let timeout = self.config.read_timeout();
        let framed = self.framed.as_mut().ok_or(LinkError::NotConnected)?;

        let next = match timeout {
            Some(limit) => time::timeout(limit, framed.next())
                .await
                .map_err(|_| LinkError::Timeout(limit))?,
            None => framed.next().await,
        };

        match next {
            Some(Ok(line)) => Ok(line.fields()?),
            Some(Err(e)) => Err(e.into()),
            None => Err(LinkError::Closed),
        }
    }

    // Track health after an operation and apply the reconnect policy.
    async fn settle<T>(&mut self, result: &Result<T, LinkError>) {
        match result {
            Ok(_) => {
                self.failures = 0;
                self.set_health(LinkHealth::Connected);
            }
            Err(e) if e.degrades_link() => {
                self.failures += 1;
                self.set_health(LinkHealth::Degraded);
                if self.reconnect_due() {
                    self.reconnect().await;
                }
            }
            // A link left unconnected by a failed reconnect keeps retrying
            // under the same policy, one round per `limit` calls.
            Err(LinkError::NotConnected) if self.health == LinkHealth::Unconnected => {
                self.failures += 1;
                if self.reconnect_due() {
                    let delay = self.config.retry_delay();
                    if !delay.is_zero() {
                        time::sleep(delay).await;
                    }
                    self.reconnect().await;
                }
            }
            Err(_) => {}
        }
    }

    fn reconnect_due(&self) -> bool {
        match self.config.reconnect {
            ReconnectPolicy::AfterFailures(limit) => self.failures >= limit,
            ReconnectPolicy::Never => false,
        }
    }

    fn set_health(&mut self, to: LinkHealth) {
        if self.health != to {
            self.sink.record(&LinkEvent::HealthChanged {
                from: self.health,
                to,
            });
            self.health = to;
        }
    }

    async fn establish(&mut self) -> bool {
        let opened = match self.config.port.clone() {
            Some(name) => self.open_named(&name).await,
            None => self.discover().await,
        };

        match opened {
            Some((name, port)) => {
                let codec =
                    FrameCodec::with_max_length(self.config.digits, self.config.max_line_length);
                self.framed = Some(Framed::new(port, codec));
                self.port_name = Some(name);
                self.failures = 0;
                self.set_health(LinkHealth::Connected);
                true
            }
            None => false,
        }
    }

    async fn open_named(&self, name: &str) -> Option<(String, O::Port)> {
        let max_retries = self.config.max_retries;

        for attempt in 1..=max_retries {
            self.sink.record(&LinkEvent::Attempt {
                attempt,
                max_retries,
            });

            match self.opener.open(name, self.config.baud_rate) {
                Ok(port) => {
                    self.sink.record(&LinkEvent::Connected {
                        port: name.to_string(),
                        description: None,
                    });
                    return Some((name.to_string(), port));
                }
                Err(e) => self.sink.record(&LinkEvent::AttemptFailed {
                    attempt,
                    reason: e.to_string(),
                }),
            }
            self.pause_after(attempt).await;
        }

        self.sink.record(&LinkEvent::OpenExhausted {
            port: name.to_string(),
            max_retries,
        });
        None
    }

    async fn discover(&self) -> Option<(String, O::Port)> {
        let max_retries = self.config.max_retries;
        let pattern = &self.config.match_description;

        for attempt in 1..=max_retries {
            self.sink.record(&LinkEvent::Attempt {
                attempt,
                max_retries,
            });

            match self.scan() {
                Ok(Some((info, port))) => {
                    self.sink.record(&LinkEvent::Connected {
                        port: info.name.clone(),
                        description: Some(info.description),
                    });
                    return Some((info.name, port));
                }
                Ok(None) => self.sink.record(&LinkEvent::AttemptFailed {
                    attempt,
                    reason: format!("no port description contains {:?}", pattern),
                }),
                Err(e) => self.sink.record(&LinkEvent::AttemptFailed {
                    attempt,
                    reason: e.to_string(),
                }),
            }
            self.pause_after(attempt).await;
        }

        self.sink.record(&LinkEvent::DeviceNotFound {
            pattern: pattern.clone(),
            max_retries,
        });
        None
    }

    // One discovery scan: the first port whose description matches is opened.
    fn scan(&self) -> crate::error::Result<Option<(PortInfo, O::Port)>> {
        let pattern = &self.config.match_description;
        let found = self
            .opener
            .available_ports()?
            .into_iter()
            .find(|p| p.description.contains(pattern.as_str()));

        match found {
            Some(info) => {
                let port = self.opener.open(&info.name, self.config.baud_rate)?;
                Ok(Some((info, port)))
            }
            None => Ok(None),
        }
    }

    async fn pause_after(&self, attempt: u32) {
        let delay = self.config.retry_delay();
        if attempt < self.config.max_retries && !delay.is_zero() {
            time::sleep(delay).await;
        }
    }
}
