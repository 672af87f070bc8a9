//! Firmware image container handling.
//!
//! Firmware ships as a JSON document carrying the target metadata next to
//! the image itself, which is zlib-compressed and base64-encoded so it can
//! be embedded as text:
//!
//! ```json
//! {
//!     "board_id": 9,
//!     "image_size": 2048,
//!     "image": "eJzT09P..."
//! }
//! ```
//!
//! The upload path only ever sees the decoded [`FirmwareImage`]; the board
//! and size checks run against the *declared* values, which is what makes a
//! mislabelled container fail before anything destructive happens.

use crate::error::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::read::ZlibDecoder;
use log::warn;
use serde::Deserialize;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Container document as it appears on disk.
#[derive(Debug, Deserialize)]
struct ContainerDoc {
    board_id: u32,
    image_size: u32,
    image: String,
}

/// A firmware image decoded from its container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    /// Board identifier the image was built for.
    pub board_id: u32,
    /// Declared size of the decompressed image in bytes.
    pub image_size: u32,
    /// Decompressed program image.
    pub image: Vec<u8>,
}

impl FirmwareImage {
    /// Construct from already-decoded parts.
    pub fn new(board_id: u32, image_size: u32, image: Vec<u8>) -> Self {
        Self {
            board_id,
            image_size,
            image,
        }
    }

    /// Load and decode a firmware container file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read(path)?;
        Self::from_json_slice(&data)
    }

    /// Decode a firmware container document.
    pub fn from_json_slice(data: &[u8]) -> Result<Self> {
        let doc: ContainerDoc = serde_json::from_slice(data)
            .map_err(|e| Error::InvalidFirmware(format!("bad container metadata: {e}")))?;

        let compressed = BASE64
            .decode(doc.image.as_bytes())
            .map_err(|e| Error::InvalidFirmware(format!("image payload is not valid base64: {e}")))?;

        let mut image = Vec::with_capacity(doc.image_size as usize);
        ZlibDecoder::new(compressed.as_slice())
            .read_to_end(&mut image)
            .map_err(|e| {
                Error::InvalidFirmware(format!("image payload failed to decompress: {e}"))
            })?;

        if image.is_empty() {
            return Err(Error::InvalidFirmware("container holds an empty image".into()));
        }
        if image.len() != doc.image_size as usize {
            warn!(
                "container declares {} bytes but the image decompressed to {}",
                doc.image_size,
                image.len()
            );
        }

        Ok(Self {
            board_id: doc.board_id,
            image_size: doc.image_size,
            image,
        })
    }

    /// Check the image targets the connected board.
    pub fn check_board(&self, device_board_id: u32) -> Result<()> {
        if self.board_id != device_board_id {
            return Err(Error::BoardMismatch {
                image: self.board_id,
                device: device_board_id,
            });
        }
        Ok(())
    }

    /// Check the declared size fits the device's flash.
    pub fn check_size(&self, flash_size: u32) -> Result<()> {
        if self.image_size > flash_size {
            return Err(Error::ImageTooLarge {
                image_size: self.image_size,
                flash_size,
            });
        }
        Ok(())
    }
}
