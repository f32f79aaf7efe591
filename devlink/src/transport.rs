//! Physical serial transport.
//!
//! Enumerates OS-visible serial ports and opens them as async byte streams.
//! No framing or protocol knowledge lives here; see [`crate::frame`].

use crate::error::Result;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{SerialPortBuilderExt, SerialPortType, SerialStream};

/// One serial port as seen by the operating system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Device identifier used to open the port (`/dev/ttyACM0`, `COM3`).
    pub name: String,
    /// Human-readable description, matched during discovery.
    pub description: String,
}

impl PortInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Source of serial ports.
///
/// The link only talks to ports through this trait, so tests can substitute
/// in-memory streams for real hardware.
pub trait PortOpener: Send + Sync {
    type Port: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// List the ports currently visible.
    fn available_ports(&self) -> Result<Vec<PortInfo>>;

    /// Open `name` at `baud_rate`.
    fn open(&self, name: &str, baud_rate: u32) -> Result<Self::Port>;
}

/// Serial ports of the host, through tokio-serial.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialOpener;

impl PortOpener for SerialOpener {
    type Port = SerialStream;

    fn available_ports(&self) -> Result<Vec<PortInfo>> {
        let ports = tokio_serial::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|p| PortInfo {
                description: describe(&p.port_type),
                name: p.port_name,
            })
            .collect())
    }

    fn open(&self, name: &str, baud_rate: u32) -> Result<Self::Port> {
        Ok(tokio_serial::new(name, baud_rate).open_native_async()?)
    }
}

/// Build the description string for a port type.
///
/// USB ports are described by their manufacturer and product strings, which
/// is where boards such as "Arduino Uno" identify themselves.
pub fn describe(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            let parts: Vec<&str> = [usb.manufacturer.as_deref(), usb.product.as_deref()]
                .into_iter()
                .flatten()
                .filter(|s| !s.is_empty())
                .collect();
            if parts.is_empty() {
                format!("USB serial device {:04x}:{:04x}", usb.vid, usb.pid)
            } else {
                parts.join(" ")
            }
        }
        SerialPortType::PciPort => "PCI serial port".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth serial port".to_string(),
        SerialPortType::Unknown => "n/a".to_string(),
    }
}
