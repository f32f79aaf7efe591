//! Framed text link to microcontroller-class peers over serial ports.
//!
//! A [`link::DeviceLink`] finds or opens a serial port, then exchanges small
//! delimited text frames with the device on the other end: outbound frames
//! are `$` followed by fixed-width integers, inbound frames are lines of
//! `#`-separated fields.

pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod link;
pub mod rate;
pub mod tracing;
pub mod transport;
