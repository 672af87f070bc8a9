//! Device discovery and connection utilities.
//!
//! This module provides serial-port discovery primitives plus the
//! [`Connector`] contract through which the flasher obtains its transport.
//! The flasher itself never learns how a device was found or how it got
//! into bootloader mode.

use crate::error::Result;
use crate::port::Port;

#[cfg(feature = "native")]
use crate::error::Error;
#[cfg(feature = "native")]
use log::{debug, info, trace};
#[cfg(feature = "native")]
use std::time::Duration;

/// Known USB device kinds commonly attached to flight controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Flight controller enumerating over its native USB port.
    Autopilot,
    /// CH340/CH341 USB-to-Serial converter.
    Ch340,
    /// Silicon Labs CP210x USB-to-Serial converter.
    Cp210x,
    /// FTDI FT232/FT2232/FT4232 USB-to-Serial converter.
    Ftdi,
    /// Prolific PL2303 USB-to-Serial converter.
    Prolific,
    /// Unknown device.
    Unknown,
}

/// Known USB VID/PID pairs. An empty PID list matches any product id.
const KNOWN_USB_DEVICES: &[(u16, &[u16], DeviceKind)] = &[
    (0x26AC, &[], DeviceKind::Autopilot),
    (0x2DAE, &[], DeviceKind::Autopilot),
    (0x3162, &[], DeviceKind::Autopilot),
    (
        0x1A86,
        &[0x7523, 0x7522, 0x5523, 0x5512, 0x55D4],
        DeviceKind::Ch340,
    ),
    (0x10C4, &[0xEA60, 0xEA70, 0xEA71, 0xEA63], DeviceKind::Cp210x),
    (
        0x0403,
        &[0x6001, 0x6010, 0x6011, 0x6014, 0x6015],
        DeviceKind::Ftdi,
    ),
    (0x067B, &[0x2303, 0x23A3, 0x23C3, 0x23D3], DeviceKind::Prolific),
];

impl DeviceKind {
    /// Classify a VID/PID combination.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        for (known_vid, pids, device) in KNOWN_USB_DEVICES {
            if vid == *known_vid && (pids.is_empty() || pids.contains(&pid)) {
                return *device;
            }
        }
        Self::Unknown
    }

    /// Get a human-readable name for the device kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Autopilot => "Autopilot USB",
            Self::Ch340 => "CH340/CH341",
            Self::Cp210x => "CP210x",
            Self::Ftdi => "FTDI",
            Self::Prolific => "PL2303",
            Self::Unknown => "Unknown",
        }
    }

    /// Check if this is a known/expected device kind.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Discovered serial endpoint information.
#[derive(Debug, Clone)]
pub struct DetectedPort {
    /// Endpoint name/path (e.g., "/dev/ttyACM0" or "COM3").
    pub name: String,
    /// Classified device kind.
    pub device: DeviceKind,
    /// USB Vendor ID (if available).
    pub vid: Option<u16>,
    /// USB Product ID (if available).
    pub pid: Option<u16>,
    /// Device product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial: Option<String>,
}

/// Detect all available serial endpoints with metadata.
#[cfg(feature = "native")]
pub fn detect_ports() -> Vec<DetectedPort> {
    let mut result = Vec::new();

    match serialport::available_ports() {
        Ok(ports) => {
            for port_info in ports {
                let mut detected = DetectedPort {
                    name: port_info.port_name.clone(),
                    device: DeviceKind::Unknown,
                    vid: None,
                    pid: None,
                    product: None,
                    serial: None,
                };

                if let serialport::SerialPortType::UsbPort(usb_info) = port_info.port_type {
                    detected.vid = Some(usb_info.vid);
                    detected.pid = Some(usb_info.pid);
                    detected.product = usb_info.product;
                    detected.serial = usb_info.serial_number;
                    detected.device = DeviceKind::from_vid_pid(usb_info.vid, usb_info.pid);

                    trace!(
                        "Found USB port: {} (VID: {:04X}, PID: {:04X}, Device: {:?})",
                        port_info.port_name, usb_info.vid, usb_info.pid, detected.device
                    );
                }

                result.push(detected);
            }
        },
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
        },
    }

    result
}

/// Auto-detect the best serial endpoint candidate.
#[cfg(feature = "native")]
pub fn auto_detect_port() -> Result<DetectedPort> {
    let ports = detect_ports();

    if let Some(port) = ports.iter().find(|p| p.device == DeviceKind::Autopilot) {
        info!("Auto-detected autopilot USB device: {}", port.name);
        return Ok(port.clone());
    }

    if let Some(port) = ports.iter().find(|p| p.device.is_known()) {
        info!(
            "Auto-detected {} USB-UART bridge: {}",
            port.device.name(),
            port.name
        );
        return Ok(port.clone());
    }

    if let Some(port) = ports.into_iter().next() {
        info!("Using first available port: {}", port.name);
        return Ok(port);
    }

    Err(Error::DeviceNotFound)
}

/// Find an endpoint by name pattern.
#[cfg(feature = "native")]
pub fn find_port_by_pattern(pattern: &str) -> Result<DetectedPort> {
    detect_ports()
        .into_iter()
        .find(|p| p.name.contains(pattern))
        .ok_or(Error::DeviceNotFound)
}

/// Format a list of detected endpoints for display.
pub fn format_port_list(ports: &[DetectedPort]) -> Vec<String> {
    let mut result = Vec::new();

    for port in ports {
        let device_info = if port.device.is_known() {
            format!(" [{}]", port.device.name())
        } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" [VID:{vid:04X} PID:{pid:04X}]")
        } else {
            String::new()
        };

        let product_info = port
            .product
            .as_ref()
            .map(|p| format!(" - {p}"))
            .unwrap_or_default();

        result.push(format!("{}{}{}", port.name, device_info, product_info));
    }

    result
}

/// Strategy for handing the flasher a transport connected to a device that
/// is already sitting in its bootloader.
///
/// How the device got there is outside this crate: production setups reboot
/// a running flight controller into the bootloader over the vehicle
/// telemetry link before flashing, bench setups power-cycle the board into
/// the bootloader's startup window. Implementations encapsulate whichever
/// dance applies and hand back a ready transport.
pub trait Connector {
    /// Transport type this connector produces.
    type Port: Port;

    /// Open a transport to the named device.
    fn connect(&mut self, port_name: &str) -> Result<Self::Port>;
}

/// Connector that opens the named serial port directly.
///
/// Assumes the device is already in bootloader mode.
#[cfg(feature = "native")]
#[derive(Debug, Clone)]
pub struct SerialConnector {
    /// Baud rate to open the port at.
    pub baud_rate: u32,
    /// Per-read timeout.
    pub timeout: Duration,
}

#[cfg(feature = "native")]
impl Default for SerialConnector {
    fn default() -> Self {
        Self {
            baud_rate: crate::protocol::bootloader::BOOTLOADER_BAUD,
            timeout: crate::protocol::bootloader::REPLY_TIMEOUT,
        }
    }
}

#[cfg(feature = "native")]
impl Connector for SerialConnector {
    type Port = crate::port::NativePort;

    fn connect(&mut self, port_name: &str) -> Result<Self::Port> {
        let config = crate::port::SerialConfig::new(port_name, self.baud_rate)
            .with_timeout(self.timeout);
        crate::port::NativePort::open(&config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_kind_from_vid_pid() {
        assert_eq!(DeviceKind::from_vid_pid(0x26AC, 0x0011), DeviceKind::Autopilot);
        assert_eq!(DeviceKind::from_vid_pid(0x2DAE, 0x1016), DeviceKind::Autopilot);
        assert_eq!(DeviceKind::from_vid_pid(0x1A86, 0x7523), DeviceKind::Ch340);
        assert_eq!(DeviceKind::from_vid_pid(0x10C4, 0xEA60), DeviceKind::Cp210x);
        assert_eq!(DeviceKind::from_vid_pid(0x0403, 0x6001), DeviceKind::Ftdi);
        assert_eq!(DeviceKind::from_vid_pid(0x067B, 0x2303), DeviceKind::Prolific);
        assert_eq!(DeviceKind::from_vid_pid(0x1234, 0x5678), DeviceKind::Unknown);
    }

    #[test]
    fn test_device_kind_is_known() {
        assert!(DeviceKind::Autopilot.is_known());
        assert!(DeviceKind::Ftdi.is_known());
        assert!(!DeviceKind::Unknown.is_known());
    }

    #[test]
    fn test_format_port_list() {
        let ports = vec![
            DetectedPort {
                name: "/dev/ttyACM0".to_string(),
                device: DeviceKind::Autopilot,
                vid: Some(0x26AC),
                pid: Some(0x0011),
                product: Some("PX4 BL FMU v2.x".to_string()),
                serial: None,
            },
            DetectedPort {
                name: "/dev/ttyUSB0".to_string(),
                device: DeviceKind::Unknown,
                vid: None,
                pid: None,
                product: None,
                serial: None,
            },
        ];

        let formatted = format_port_list(&ports);
        assert_eq!(formatted.len(), 2);
        assert!(formatted[0].contains("/dev/ttyACM0"));
        assert!(formatted[0].contains("Autopilot USB"));
        assert!(formatted[1].contains("/dev/ttyUSB0"));
    }
}
