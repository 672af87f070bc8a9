//! Upload orchestration and board identification.
//!
//! [`Flasher`] wraps a [`BootloaderClient`] and sequences its commands into
//! the two operations callers actually want: a [`BoardInfo`] snapshot and a
//! firmware upload. The upload is exposed as an explicit step machine,
//! [`Upload`], because every step is a real, side-effecting hardware
//! operation: the sequence is single-pass, cannot be replayed, and stopping
//! half way leaves the device in whatever state the last step reached
//! (possibly erased but unprogrammed).
//!
//! ## Upload lifecycle
//!
//! ```text
//! sync -> identify -> validate -> erase -> program -> verify -> reboot
//! ```
//!
//! Strictly ordered, no skipping, no retries: the first error aborts the
//! whole sequence and nothing is rolled back.

use crate::error::{Error, Result};
use crate::image::FirmwareImage;
use crate::port::Port;
use crate::protocol::bootloader::{BootloaderClient, InfoItem, PROGRAM_CHUNK_MAX};
use crate::protocol::crc::expected_flash_crc;
use log::{debug, info};
use std::fmt;

#[cfg(feature = "native")]
use crate::port::{NativePort, SerialConfig};
#[cfg(feature = "native")]
use crate::protocol::bootloader::BOOTLOADER_BAUD;

/// Chunk interval between programming progress snapshots.
const PROGRESS_INTERVAL: usize = 100;

/// Progression of one named upload stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Stage has not been reached yet.
    NotStarted,
    /// Stage is currently executing on the device.
    InProgress,
    /// Stage finished successfully.
    Completed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::InProgress => write!(f, "in progress"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

/// Snapshot of upload progress.
///
/// Every field only ever advances within one upload; a later snapshot never
/// regresses an earlier one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadProgress {
    /// Name of the port the upload runs on.
    pub port: String,
    /// Chip erase stage.
    pub erase: StageStatus,
    /// Percentage of program chunks sent, once programming has started.
    pub program_percent: Option<u8>,
    /// Checksum verification stage.
    pub verify: StageStatus,
}

/// Device identity snapshot assembled from the bootloader info queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardInfo {
    /// Bootloader protocol revision.
    pub bootloader_revision: u32,
    /// Board hardware identifier.
    pub board_id: u32,
    /// Board hardware revision.
    pub board_revision: u32,
    /// Usable program flash size in bytes.
    pub flash_size: u32,
    /// 24-character lowercase hex serial number.
    pub serial_number: String,
    /// Chip description, e.g. "STM32F42x revision 3".
    pub chip_description: String,
}

/// Pad an image with 0xFF up to the flash's 4-byte write granularity.
///
/// Appends the minimum fill (0 to 3 bytes) and never alters existing bytes.
pub fn pad_image(image: &[u8]) -> Vec<u8> {
    let mut padded = image.to_vec();
    while padded.len() % 4 != 0 {
        padded.push(0xFF);
    }
    padded
}

#[allow(clippy::cast_possible_truncation)] // result never exceeds 100
fn percent(sent: usize, total: usize) -> u8 {
    ((sent * 100 + total / 2) / total) as u8
}

/// High-level flashing interface over one exclusively-owned transport.
pub struct Flasher<P: Port> {
    client: BootloaderClient<P>,
}

impl<P: Port> Flasher<P> {
    /// Create a flasher over an opened transport.
    ///
    /// The transport must already be connected to a device sitting in its
    /// bootloader; see [`crate::device::Connector`].
    pub fn new(port: P) -> Self {
        Self {
            client: BootloaderClient::new(port),
        }
    }

    /// Create a flasher from a pre-configured protocol client.
    pub fn from_client(client: BootloaderClient<P>) -> Self {
        Self { client }
    }

    /// Get a reference to the protocol client.
    pub fn client(&self) -> &BootloaderClient<P> {
        &self.client
    }

    /// Consume the flasher and return the transport.
    pub fn into_port(self) -> P {
        self.client.into_port()
    }

    /// Query the device identity.
    ///
    /// Syncs first; beyond that the individual queries have no ordering
    /// dependency between them.
    pub fn board_info(&mut self) -> Result<BoardInfo> {
        self.client.sync()?;

        let bootloader_revision = self.client.device_info(InfoItem::BootloaderRevision)?;
        let board_id = self.client.device_info(InfoItem::BoardId)?;
        let board_revision = self.client.device_info(InfoItem::BoardRevision)?;
        let flash_size = self.client.device_info(InfoItem::FlashSize)?;
        let serial_number = self.client.serial_number()?;
        let chip_description = self.client.chip_description()?;

        Ok(BoardInfo {
            bootloader_revision,
            board_id,
            board_revision,
            flash_size,
            serial_number,
            chip_description,
        })
    }

    /// Begin uploading `image`.
    ///
    /// Returns the upload step machine; drive it with [`Upload::step`] until
    /// it yields `None`.
    pub fn upload<'a>(&'a mut self, image: &'a FirmwareImage) -> Upload<'a, P> {
        Upload::new(&mut self.client, image)
    }

    /// Upload `image` to completion, feeding every progress snapshot to
    /// `observe`.
    pub fn upload_with<F>(&mut self, image: &FirmwareImage, mut observe: F) -> Result<()>
    where
        F: FnMut(&UploadProgress),
    {
        let mut upload = self.upload(image);
        while let Some(snapshot) = upload.step()? {
            observe(&snapshot);
        }
        Ok(())
    }
}

#[cfg(feature = "native")]
impl Flasher<NativePort> {
    /// Open `port_name` with the bootloader's fixed link settings.
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_config(&SerialConfig::new(port_name, BOOTLOADER_BAUD))
    }

    /// Open a port with explicit serial settings.
    pub fn open_with_config(config: &SerialConfig) -> Result<Self> {
        Ok(Self::new(NativePort::open(config)?))
    }
}

enum UploadState {
    Identify,
    Erase,
    Program,
    AnnounceVerify,
    Verify,
    Reboot,
    Done,
}

/// Single-pass upload operation.
///
/// Each [`step`](Self::step) call performs the next device operation and
/// returns the resulting progress snapshot, or `None` once the reboot
/// command has been written. Errors are final: the sequence cannot be
/// resumed, and the caller decides whether to start a fresh upload.
pub struct Upload<'a, P: Port> {
    client: &'a mut BootloaderClient<P>,
    image: &'a FirmwareImage,
    state: UploadState,
    progress: UploadProgress,
    padded: Vec<u8>,
    chunks_sent: usize,
    chunk_count: usize,
    flash_size: u32,
}

impl<'a, P: Port> Upload<'a, P> {
    fn new(client: &'a mut BootloaderClient<P>, image: &'a FirmwareImage) -> Self {
        let port = client.port().name().to_string();
        Self {
            client,
            image,
            state: UploadState::Identify,
            progress: UploadProgress {
                port,
                erase: StageStatus::NotStarted,
                program_percent: None,
                verify: StageStatus::NotStarted,
            },
            padded: Vec::new(),
            chunks_sent: 0,
            chunk_count: 0,
            flash_size: 0,
        }
    }

    /// Perform the next upload step.
    ///
    /// Returns the progress snapshot the step produced, or `None` once the
    /// upload has completed (including the reboot command).
    pub fn step(&mut self) -> Result<Option<UploadProgress>> {
        match self.state {
            UploadState::Identify => {
                self.identify()?;
                self.progress.erase = StageStatus::InProgress;
                self.state = UploadState::Erase;
                Ok(Some(self.progress.clone()))
            },
            UploadState::Erase => {
                self.client.erase()?;
                info!("program area erased");
                self.progress.erase = StageStatus::Completed;
                self.progress.program_percent = Some(0);
                self.state = UploadState::Program;
                Ok(Some(self.progress.clone()))
            },
            UploadState::Program => {
                self.program_batch()?;
                if self.chunks_sent == self.chunk_count {
                    self.state = UploadState::AnnounceVerify;
                }
                Ok(Some(self.progress.clone()))
            },
            UploadState::AnnounceVerify => {
                self.progress.verify = StageStatus::InProgress;
                self.state = UploadState::Verify;
                Ok(Some(self.progress.clone()))
            },
            UploadState::Verify => {
                self.verify()?;
                self.progress.verify = StageStatus::Completed;
                self.state = UploadState::Reboot;
                Ok(Some(self.progress.clone()))
            },
            UploadState::Reboot => {
                self.client.reboot()?;
                info!("upload complete, device rebooting");
                self.state = UploadState::Done;
                Ok(None)
            },
            UploadState::Done => Ok(None),
        }
    }

    /// Sync, read the device identity, and validate the image against it.
    ///
    /// Both validation checks run before anything destructive. The erase
    /// command is refused by the device until the sync probe and device-info
    /// queries have been exchanged, which this step also satisfies; one
    /// query alone does not reliably unlock it, so all three are issued.
    fn identify(&mut self) -> Result<()> {
        self.client.sync()?;
        self.client.device_info(InfoItem::BootloaderRevision)?;
        let board_id = self.client.device_info(InfoItem::BoardId)?;
        let flash_size = self.client.device_info(InfoItem::FlashSize)?;

        self.image.check_board(board_id)?;
        self.image.check_size(flash_size)?;
        if self.image.image.is_empty() {
            return Err(Error::InvalidFirmware("image is empty".into()));
        }

        self.flash_size = flash_size;
        self.padded = pad_image(&self.image.image);
        self.chunk_count = self.padded.len().div_ceil(PROGRAM_CHUNK_MAX);
        debug!(
            "uploading {} bytes ({} chunks) to board {board_id}",
            self.padded.len(),
            self.chunk_count
        );
        Ok(())
    }

    /// Send the next batch of chunks, up to the snapshot interval.
    ///
    /// Each chunk's status reply must be OK before the next chunk goes out;
    /// there is no pipelining. The final batch always lands exactly on the
    /// last chunk, so the progress stream terminates on 100%.
    fn program_batch(&mut self) -> Result<()> {
        let batch_end = (self.chunks_sent + PROGRESS_INTERVAL).min(self.chunk_count);
        while self.chunks_sent < batch_end {
            let start = self.chunks_sent * PROGRAM_CHUNK_MAX;
            let end = (start + PROGRAM_CHUNK_MAX).min(self.padded.len());
            self.client.program_chunk(&self.padded[start..end])?;
            self.chunks_sent += 1;
        }
        self.progress.program_percent = Some(percent(self.chunks_sent, self.chunk_count));
        Ok(())
    }

    /// Compare the locally computed checksum with the device's.
    fn verify(&mut self) -> Result<()> {
        let expected = expected_flash_crc(&self.image.image, self.flash_size);
        let device = self.client.flash_crc()?;
        if expected != device {
            return Err(Error::VerificationFailed { expected, device });
        }
        debug!("flash CRC verified: {expected:#010x}");
        Ok(())
    }
}
