//! # apflash
//!
//! A library for flashing autopilot flight controllers over the vendor
//! serial bootloader protocol.
//!
//! This crate provides the core functionality for talking to a flight
//! controller that is sitting in its bootloader, including:
//!
//! - The bootloader command protocol (sync, device info, erase, program,
//!   CRC query, reboot)
//! - Firmware container decoding (zlib-compressed, base64-embedded images)
//! - Flash checksum computation byte-for-byte matching the bootloader's own
//!   CRC32
//! - Upload orchestration with step-wise progress reporting
//!
//! ## Supported Platforms
//!
//! - **Native** (default): Linux, macOS, Windows via the `serialport` crate
//!
//! ## Features
//!
//! - `native` (default): Native serial port support
//!
//! ## Example
//!
//! ```rust,no_run
//! use apflash::FirmwareImage;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Decode the firmware container
//!     let image = FirmwareImage::from_file("firmware.apfw")?;
//!
//!     // Connect and flash (native only)
//!     #[cfg(feature = "native")]
//!     {
//!         let mut flasher = apflash::Flasher::open("/dev/ttyACM0")?;
//!
//!         let info = flasher.board_info()?;
//!         println!("board {} ({} bytes of flash)", info.board_id, info.flash_size);
//!
//!         flasher.upload_with(&image, |progress| {
//!             println!("erase: {}, verify: {}", progress.erase, progress.verify);
//!         })?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod boards;
pub mod device;
pub mod error;
pub mod flasher;
pub mod image;
pub mod port;
pub mod protocol;

// Re-exports for convenience
// Native-specific re-exports
#[cfg(feature = "native")]
pub use device::SerialConnector;
#[cfg(feature = "native")]
pub use port::NativePort;
pub use {
    boards::board_name,
    device::{Connector, DetectedPort, DeviceKind},
    error::{Error, Result},
    flasher::{BoardInfo, Flasher, StageStatus, Upload, UploadProgress},
    image::FirmwareImage,
    port::{Port, SerialConfig},
    protocol::bootloader::{BootloaderClient, InfoItem, Opcode, ReplyStatus, ReservedOpcode},
    protocol::crc::{Crc32, expected_flash_crc},
};
