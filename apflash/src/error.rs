//! Error types for apflash.

use std::io;
use thiserror::Error;

/// Result type for apflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for apflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A status reply did not follow the sync/status framing.
    #[error("Protocol desync: expected sync indicator, got {got:#04x}")]
    ProtocolDesync {
        /// The unexpected byte read from the wire.
        got: u8,
    },

    /// Device explicitly reported it could not complete the operation.
    #[error("Bootloader reports the operation failed")]
    DeviceFailed,

    /// Device reported the command as invalid.
    #[error("Bootloader does not implement this command")]
    UnsupportedCommand,

    /// Fewer bytes than expected arrived before the read timed out.
    #[error("Short read: expected {expected} bytes, got {got}")]
    ShortRead {
        /// Bytes the command's reply shape requires.
        expected: usize,
        /// Bytes actually received.
        got: usize,
    },

    /// A response payload failed to parse.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// No reply to the chip-erase command within the deadline.
    #[error("No response from the board after erasing the chip")]
    EraseTimeout,

    /// Firmware image targets a different board than the connected device.
    #[error("Firmware is built for board id {image}, but the device reports board id {device}")]
    BoardMismatch {
        /// Board id declared by the firmware container.
        image: u32,
        /// Board id reported by the device.
        device: u32,
    },

    /// Firmware image does not fit in the device's flash.
    #[error("Firmware image ({image_size} bytes) exceeds the flash size ({flash_size} bytes)")]
    ImageTooLarge {
        /// Size declared by the firmware container.
        image_size: u32,
        /// Flash size reported by the device.
        flash_size: u32,
    },

    /// Post-write checksum does not match the device-reported checksum.
    #[error("Verification failed: expected CRC {expected:#010x}, device reports {device:#010x}")]
    VerificationFailed {
        /// Checksum computed from the image.
        expected: u32,
        /// Checksum the device computed over its flash.
        device: u32,
    },

    /// Invalid firmware container file.
    #[error("Invalid firmware file: {0}")]
    InvalidFirmware(String),

    /// Device not found during discovery.
    #[error("Device not found")]
    DeviceNotFound,
}
