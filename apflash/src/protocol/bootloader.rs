//! Serial bootloader command protocol.
//!
//! The bootloader speaks a binary command/response protocol over the serial
//! link. Every command is one opcode byte, an optional fixed-layout payload,
//! and a terminator byte:
//!
//! ```text
//! +--------+-------------+------------+
//! | Opcode |   Payload   | Terminator |
//! +--------+-------------+------------+
//! | 1 byte |  variable   |    0x20    |
//! +--------+-------------+------------+
//! ```
//!
//! Replies are a two-byte status pair, optionally preceded by a payload
//! whose shape is fixed per command:
//!
//! ```text
//! +-------------+--------+--------+
//! |   Payload   |  Sync  | Status |
//! +-------------+--------+--------+
//! |  variable   |  0x12  | 1 byte |
//! +-------------+--------+--------+
//! ```
//!
//! A successful exchange always ends in the sync indicator followed by OK;
//! everything else maps to a specific error, uniformly for every command.

use crate::error::{Error, Result};
use crate::port::Port;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};
use std::io;
use std::time::{Duration, Instant};

/// End-of-command terminator byte.
pub const EOC: u8 = 0x20;

/// Marker byte that prefixes every status reply.
pub const IN_SYNC: u8 = 0x12;

/// Baud rate of the bootloader link.
pub const BOOTLOADER_BAUD: u32 = 115200;

/// Per-call read timeout for ordinary command replies.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Overall deadline for the chip-erase reply. Erasing is a slow physical
/// operation with no intermediate protocol signal.
pub const ERASE_TIMEOUT: Duration = Duration::from_secs(20);

/// Largest chunk the programming command accepts.
///
/// The length field is a single byte and the device writes flash in 4-byte
/// units, so 252 is the largest usable multiple of 4.
pub const PROGRAM_CHUNK_MAX: usize = 252;

/// Longest chip description the bootloader firmware can return.
const MAX_DESCRIPTION_LEN: usize = 20;

/// Command opcodes issued by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Probe that the device is in bootloader mode and responding.
    GetSync = 0x21,
    /// Query one device-info item (see [`InfoItem`]).
    GetDevice = 0x22,
    /// Erase the program area.
    ChipErase = 0x23,
    /// Program a length-prefixed chunk at the current flash position.
    ProgramMulti = 0x27,
    /// Ask the device for its self-computed flash CRC32.
    GetCrc = 0x29,
    /// Read one 4-byte word of the serial number area.
    GetSerialWord = 0x2b,
    /// Read the chip description string.
    GetChipDescription = 0x2e,
    /// Reboot into the programmed application. No reply.
    Reboot = 0x30,
}

/// Device-info items for [`Opcode::GetDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InfoItem {
    /// Bootloader protocol revision.
    BootloaderRevision = 0x01,
    /// Board hardware identifier.
    BoardId = 0x02,
    /// Board hardware revision.
    BoardRevision = 0x03,
    /// Usable program flash size in bytes.
    FlashSize = 0x04,
}

/// Opcodes later bootloader revisions define but this client never issues.
///
/// Carried so the wire values stay documented next to the live command set.
/// Issuing one of these requires implementing its reply shape first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReservedOpcode {
    /// Guaranteed to be discarded by the bootloader.
    Nop = 0x00,
    /// Whole-flash verify (protocol revision 2 only).
    ChipVerify = 0x24,
    /// Read back programmed bytes (protocol revision 2 only).
    ReadMulti = 0x28,
    /// Read one word of the OTP area (revision 4+).
    GetOtp = 0x2a,
    /// Read the silicon version word (revision 5+).
    GetChipVersion = 0x2c,
    /// Configure the application boot delay (revision 5+).
    SetBootDelay = 0x2d,
    /// Switch the link baud rate.
    SetBaud = 0x33,
    /// Erase sectors of the external flash.
    ExtFlashErase = 0x34,
    /// Program bytes at the external flash write position.
    ExtFlashProgram = 0x35,
    /// Read bytes back from the external flash.
    ExtFlashRead = 0x36,
    /// CRC32 over a region of the external flash.
    ExtFlashCrc = 0x37,
    /// Erase all of flash, including the bootloader sectors.
    ChipFullErase = 0x40,
}

impl ReservedOpcode {
    /// All reserved opcodes, in wire-value order.
    pub const ALL: [Self; 12] = [
        Self::Nop,
        Self::ChipVerify,
        Self::ReadMulti,
        Self::GetOtp,
        Self::GetChipVersion,
        Self::SetBootDelay,
        Self::SetBaud,
        Self::ExtFlashErase,
        Self::ExtFlashProgram,
        Self::ExtFlashRead,
        Self::ExtFlashCrc,
        Self::ChipFullErase,
    ];
}

/// Status bytes the bootloader can put in the second reply position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyByte {
    /// Command completed.
    Ok = 0x10,
    /// Device could not complete the operation.
    Failed = 0x11,
    /// Device does not implement the command.
    Invalid = 0x13,
}

impl ReplyByte {
    /// Decode a wire byte into a known status, if it is one.
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x10 => Some(Self::Ok),
            0x11 => Some(Self::Failed),
            0x13 => Some(Self::Invalid),
            _ => None,
        }
    }
}

/// Outcome of classifying a two-byte status reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    /// Sync indicator followed by OK.
    Success,
    /// Device explicitly rejected or could not complete the operation.
    DeviceFailed,
    /// Device does not implement the command.
    Unsupported,
    /// The reply did not follow the sync/status framing.
    Desync {
        /// The byte that broke the framing.
        got: u8,
    },
}

/// Classify a two-byte status reply.
///
/// The first byte must be the sync indicator regardless of the second; the
/// second byte then selects the outcome. Applied identically for every
/// command in the set.
pub fn classify_reply(sync: u8, status: u8) -> ReplyStatus {
    if sync != IN_SYNC {
        return ReplyStatus::Desync { got: sync };
    }
    match ReplyByte::from_wire(status) {
        Some(ReplyByte::Ok) => ReplyStatus::Success,
        Some(ReplyByte::Failed) => ReplyStatus::DeviceFailed,
        Some(ReplyByte::Invalid) => ReplyStatus::Unsupported,
        None => ReplyStatus::Desync { got: status },
    }
}

impl ReplyStatus {
    /// Turn a classification into a command outcome.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Success => Ok(()),
            Self::DeviceFailed => Err(Error::DeviceFailed),
            Self::Unsupported => Err(Error::UnsupportedCommand),
            Self::Desync { got } => Err(Error::ProtocolDesync { got }),
        }
    }
}

/// Bootloader protocol client.
///
/// Owns its transport exclusively for the duration of an operation. Commands
/// are strictly request/response with no pipelining; a failed exchange
/// poisons nothing here, but the caller must not continue an upload after an
/// error.
pub struct BootloaderClient<P: Port> {
    port: P,
    erase_timeout: Duration,
}

impl<P: Port> BootloaderClient<P> {
    /// Create a client over an opened transport.
    pub fn new(port: P) -> Self {
        Self {
            port,
            erase_timeout: ERASE_TIMEOUT,
        }
    }

    /// Override the chip-erase reply deadline.
    #[must_use]
    pub fn with_erase_timeout(mut self, timeout: Duration) -> Self {
        self.erase_timeout = timeout;
        self
    }

    /// Get a reference to the underlying transport.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Consume the client and return the transport.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Send one command frame.
    ///
    /// The input buffer is reset first so stale bytes from a prior failed
    /// exchange cannot shift the reply framing.
    fn command(&mut self, opcode: Opcode, payload: &[u8]) -> Result<()> {
        self.port.clear_input_buffer()?;

        let mut frame = Vec::with_capacity(payload.len() + 2);
        frame.push(opcode as u8);
        frame.extend_from_slice(payload);
        frame.push(EOC);

        trace!("> {:?} ({} bytes)", opcode, frame.len());
        self.port.write_all(&frame)?;
        self.port.flush()?;
        Ok(())
    }

    /// Fill `buf` from the transport, treating a timeout as end of data.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }

        if filled < buf.len() {
            return Err(Error::ShortRead {
                expected: buf.len(),
                got: filled,
            });
        }
        Ok(())
    }

    /// Read and classify the trailing status pair of an exchange.
    fn read_reply_status(&mut self) -> Result<()> {
        let mut pair = [0u8; 2];
        self.read_exact(&mut pair)?;
        trace!("< sync {:#04x} status {:#04x}", pair[0], pair[1]);
        classify_reply(pair[0], pair[1]).into_result()
    }

    /// Probe that the device is in bootloader mode and in sync.
    pub fn sync(&mut self) -> Result<()> {
        self.command(Opcode::GetSync, &[])?;
        self.read_reply_status()
    }

    /// Query one device-info item.
    pub fn device_info(&mut self, item: InfoItem) -> Result<u32> {
        self.command(Opcode::GetDevice, &[item as u8])?;

        let mut word = [0u8; 4];
        self.read_exact(&mut word)?;
        self.read_reply_status()?;

        let value = LittleEndian::read_u32(&word);
        debug!("{item:?} = {value}");
        Ok(value)
    }

    /// Read the device serial number.
    ///
    /// Three 4-byte words at fixed offsets; each word arrives least
    /// significant byte first and is reversed before concatenation, so the
    /// result renders most significant byte first, as printed on the board.
    pub fn serial_number(&mut self) -> Result<String> {
        let mut raw = Vec::with_capacity(12);
        for offset in [0u32, 4, 8] {
            let mut payload = [0u8; 4];
            LittleEndian::write_u32(&mut payload, offset);
            self.command(Opcode::GetSerialWord, &payload)?;

            let mut word = [0u8; 4];
            self.read_exact(&mut word)?;
            self.read_reply_status()?;

            word.reverse();
            raw.extend_from_slice(&word);
        }

        Ok(raw.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Read the chip description, e.g. "STM32F42x revision 3".
    pub fn chip_description(&mut self) -> Result<String> {
        self.command(Opcode::GetChipDescription, &[])?;

        let mut len_buf = [0u8; 4];
        self.read_exact(&mut len_buf)?;
        let len = LittleEndian::read_u32(&len_buf) as usize;
        if len > MAX_DESCRIPTION_LEN {
            return Err(Error::MalformedPayload(format!(
                "chip description length {len} is outside the protocol limit"
            )));
        }

        let mut text = vec![0u8; len];
        self.read_exact(&mut text)?;
        self.read_reply_status()?;

        let text = String::from_utf8(text)
            .map_err(|_| Error::MalformedPayload("chip description is not valid UTF-8".into()))?;
        let (chip, revision) = text.split_once(',').ok_or_else(|| {
            Error::MalformedPayload(format!("chip description {text:?} has no revision separator"))
        })?;

        Ok(format!("{chip} revision {revision}"))
    }

    /// Erase the program area.
    ///
    /// The bootloader refuses to erase until a sync probe and device-info
    /// queries have been exchanged on this connection; that ordering is the
    /// caller's duty. The reply can take many seconds, so the status pair is
    /// polled against a coarse overall deadline rather than the per-read
    /// timeout. An empty read is a continuation signal, not a failure.
    pub fn erase(&mut self) -> Result<()> {
        self.command(Opcode::ChipErase, &[])?;
        debug!("chip erase sent, polling up to {:?}", self.erase_timeout);

        let deadline = Instant::now() + self.erase_timeout;
        let mut pair = [0u8; 2];
        let mut filled = 0;
        while filled < pair.len() {
            if Instant::now() >= deadline {
                return Err(Error::EraseTimeout);
            }
            match self.port.read(&mut pair[filled..]) {
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {},
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }

        classify_reply(pair[0], pair[1]).into_result()
    }

    /// Program one chunk of the image.
    ///
    /// Chunks must be non-empty, at most [`PROGRAM_CHUNK_MAX`] bytes, and a
    /// multiple of the 4-byte flash write unit; the orchestrator's padding
    /// and chunking guarantee this.
    #[allow(clippy::cast_possible_truncation)] // chunk length is bounded by PROGRAM_CHUNK_MAX
    pub fn program_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        debug_assert!(!chunk.is_empty() && chunk.len() <= PROGRAM_CHUNK_MAX);

        let mut payload = Vec::with_capacity(chunk.len() + 1);
        payload.push(chunk.len() as u8);
        payload.extend_from_slice(chunk);
        self.command(Opcode::ProgramMulti, &payload)?;
        self.read_reply_status()
    }

    /// Ask the device for the CRC32 it computes over its program flash.
    pub fn flash_crc(&mut self) -> Result<u32> {
        self.command(Opcode::GetCrc, &[])?;

        let mut word = [0u8; 4];
        self.read_exact(&mut word)?;
        self.read_reply_status()?;

        Ok(LittleEndian::read_u32(&word))
    }

    /// Reboot into the programmed application.
    ///
    /// Fire and forget: the device drops the link while rebooting, so no
    /// reply is read and the input buffer is left alone.
    pub fn reboot(&mut self) -> Result<()> {
        debug!("sending reboot");
        self.port.write_all(&[Opcode::Reboot as u8, EOC])?;
        self.port.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Mock serial port with separate read/write buffers.
    ///
    /// Reads drain a scripted reply buffer and time out once it is empty,
    /// mirroring how a real port behaves between device replies.
    struct MockPort {
        read_buf: VecDeque<u8>,
        written: Vec<u8>,
        timeout: Duration,
        clears: usize,
    }

    impl MockPort {
        fn new(script: &[u8]) -> Self {
            Self {
                read_buf: script.iter().copied().collect(),
                written: Vec::new(),
                timeout: REPLY_TIMEOUT,
                clears: 0,
            }
        }
    }

    impl std::io::Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.read_buf.is_empty() {
                return Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "no data"));
            }
            let n = buf.len().min(self.read_buf.len());
            for b in buf.iter_mut().take(n) {
                *b = self.read_buf.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl std::io::Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Port for MockPort {
        fn set_timeout(&mut self, timeout: Duration) -> crate::Result<()> {
            self.timeout = timeout;
            Ok(())
        }
        fn timeout(&self) -> Duration {
            self.timeout
        }
        fn clear_input_buffer(&mut self) -> crate::Result<()> {
            // The scripted buffer stands in for future device replies, so it
            // is not discarded here; only the call is recorded.
            self.clears += 1;
            Ok(())
        }
        fn name(&self) -> &str {
            "mock"
        }
    }

    const STATUS_OK: [u8; 2] = [IN_SYNC, ReplyByte::Ok as u8];

    #[test]
    fn test_classify_reply_truth_table() {
        assert_eq!(classify_reply(0x12, 0x10), ReplyStatus::Success);
        assert_eq!(classify_reply(0x12, 0x11), ReplyStatus::DeviceFailed);
        assert_eq!(classify_reply(0x12, 0x13), ReplyStatus::Unsupported);
        assert_eq!(classify_reply(0x12, 0x14), ReplyStatus::Desync { got: 0x14 });
        assert_eq!(classify_reply(0x12, 0x00), ReplyStatus::Desync { got: 0x00 });

        // First byte other than the sync indicator wins regardless of the second.
        for second in [0x10, 0x11, 0x13, 0xFF] {
            assert_eq!(
                classify_reply(0x00, second),
                ReplyStatus::Desync { got: 0x00 }
            );
            assert_eq!(
                classify_reply(0x13, second),
                ReplyStatus::Desync { got: 0x13 }
            );
        }
    }

    #[test]
    fn test_classify_into_result() {
        assert!(classify_reply(0x12, 0x10).into_result().is_ok());
        assert!(matches!(
            classify_reply(0x12, 0x11).into_result(),
            Err(Error::DeviceFailed)
        ));
        assert!(matches!(
            classify_reply(0x12, 0x13).into_result(),
            Err(Error::UnsupportedCommand)
        ));
        assert!(matches!(
            classify_reply(0x42, 0x10).into_result(),
            Err(Error::ProtocolDesync { got: 0x42 })
        ));
    }

    #[test]
    fn test_sync_frame_and_reply() {
        let mut client = BootloaderClient::new(MockPort::new(&STATUS_OK));
        client.sync().unwrap();

        let port = client.into_port();
        assert_eq!(port.written, vec![0x21, 0x20]);
        assert_eq!(port.clears, 1);
    }

    #[test]
    fn test_device_info_reads_word_then_status() {
        let mut script = vec![0x00, 0x00, 0x10, 0x00]; // 1 MiB little-endian
        script.extend_from_slice(&STATUS_OK);

        let mut client = BootloaderClient::new(MockPort::new(&script));
        let value = client.device_info(InfoItem::FlashSize).unwrap();
        assert_eq!(value, 1_048_576);

        assert_eq!(client.into_port().written, vec![0x22, 0x04, 0x20]);
    }

    #[test]
    fn test_device_info_short_read() {
        // Two payload bytes arrive, then the line goes quiet.
        let mut client = BootloaderClient::new(MockPort::new(&[0xAB, 0xCD]));
        let err = client.device_info(InfoItem::BoardId).unwrap_err();
        assert!(matches!(err, Error::ShortRead { expected: 4, got: 2 }));
    }

    #[test]
    fn test_device_failed_reply() {
        let mut client = BootloaderClient::new(MockPort::new(&[IN_SYNC, 0x11]));
        assert!(matches!(client.sync().unwrap_err(), Error::DeviceFailed));
    }

    #[test]
    fn test_desync_reply() {
        let mut client = BootloaderClient::new(MockPort::new(&[0x55, 0x10]));
        assert!(matches!(
            client.sync().unwrap_err(),
            Error::ProtocolDesync { got: 0x55 }
        ));
    }

    #[test]
    fn test_serial_number_assembly() {
        let mut script = Vec::new();
        for word in [
            [0x12u8, 0x34, 0x56, 0x78],
            [0x9A, 0xBC, 0xDE, 0xF0],
            [0x00, 0x11, 0x22, 0x33],
        ] {
            script.extend_from_slice(&word);
            script.extend_from_slice(&STATUS_OK);
        }

        let mut client = BootloaderClient::new(MockPort::new(&script));
        let serial = client.serial_number().unwrap();
        assert_eq!(serial, "78563412f0debc9a33221100");
        assert_eq!(serial.len(), 24);

        // One request per word, at offsets 0, 4, 8.
        let written = client.into_port().written;
        assert_eq!(
            written,
            vec![
                0x2b, 0x00, 0x00, 0x00, 0x00, 0x20, //
                0x2b, 0x04, 0x00, 0x00, 0x00, 0x20, //
                0x2b, 0x08, 0x00, 0x00, 0x00, 0x20,
            ]
        );
    }

    #[test]
    fn test_serial_number_checks_status_per_word() {
        let mut script = Vec::new();
        script.extend_from_slice(&[0x01, 0x02, 0x03, 0x04]);
        script.extend_from_slice(&STATUS_OK);
        script.extend_from_slice(&[0x05, 0x06, 0x07, 0x08]);
        script.extend_from_slice(&[IN_SYNC, 0x11]); // second word fails

        let mut client = BootloaderClient::new(MockPort::new(&script));
        assert!(matches!(
            client.serial_number().unwrap_err(),
            Error::DeviceFailed
        ));
    }

    #[test]
    fn test_chip_description_parsing() {
        let text = b"STM32F42x,3";
        let mut script = vec![text.len() as u8, 0x00, 0x00, 0x00];
        script.extend_from_slice(text);
        script.extend_from_slice(&STATUS_OK);

        let mut client = BootloaderClient::new(MockPort::new(&script));
        let description = client.chip_description().unwrap();
        assert_eq!(description, "STM32F42x revision 3");
    }

    #[test]
    fn test_chip_description_without_separator() {
        let text = b"STM32F42x";
        let mut script = vec![text.len() as u8, 0x00, 0x00, 0x00];
        script.extend_from_slice(text);
        script.extend_from_slice(&STATUS_OK);

        let mut client = BootloaderClient::new(MockPort::new(&script));
        assert!(matches!(
            client.chip_description().unwrap_err(),
            Error::MalformedPayload(_)
        ));
    }

    #[test]
    fn test_chip_description_absurd_length() {
        // A garbage length word means the reply framing is gone.
        let script = [0xE8, 0x03, 0x00, 0x00]; // 1000
        let mut client = BootloaderClient::new(MockPort::new(&script));
        assert!(matches!(
            client.chip_description().unwrap_err(),
            Error::MalformedPayload(_)
        ));
    }

    #[test]
    fn test_erase_immediate_reply() {
        let mut client = BootloaderClient::new(MockPort::new(&STATUS_OK));
        client.erase().unwrap();
        assert_eq!(client.into_port().written, vec![0x23, 0x20]);
    }

    #[test]
    fn test_erase_timeout() {
        let mut client = BootloaderClient::new(MockPort::new(&[]))
            .with_erase_timeout(Duration::from_millis(25));
        assert!(matches!(client.erase().unwrap_err(), Error::EraseTimeout));
    }

    #[test]
    fn test_erase_reply_split_across_reads() {
        // The status pair may dribble in one byte at a time.
        struct OneByteAtATime(MockPort);
        impl std::io::Read for OneByteAtATime {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                let n = 1.min(buf.len());
                self.0.read(&mut buf[..n])
            }
        }
        impl std::io::Write for OneByteAtATime {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.write(buf)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                self.0.flush()
            }
        }
        impl Port for OneByteAtATime {
            fn set_timeout(&mut self, timeout: Duration) -> crate::Result<()> {
                self.0.set_timeout(timeout)
            }
            fn timeout(&self) -> Duration {
                self.0.timeout()
            }
            fn clear_input_buffer(&mut self) -> crate::Result<()> {
                self.0.clear_input_buffer()
            }
            fn name(&self) -> &str {
                self.0.name()
            }
        }

        let mut client = BootloaderClient::new(OneByteAtATime(MockPort::new(&STATUS_OK)));
        client.erase().unwrap();
    }

    #[test]
    fn test_program_chunk_frame() {
        let mut client = BootloaderClient::new(MockPort::new(&STATUS_OK));
        client.program_chunk(&[0xAA, 0xBB, 0xCC, 0xDD]).unwrap();

        assert_eq!(
            client.into_port().written,
            vec![0x27, 0x04, 0xAA, 0xBB, 0xCC, 0xDD, 0x20]
        );
    }

    #[test]
    fn test_flash_crc_reads_word() {
        let mut script = vec![0x78, 0x56, 0x34, 0x12];
        script.extend_from_slice(&STATUS_OK);

        let mut client = BootloaderClient::new(MockPort::new(&script));
        assert_eq!(client.flash_crc().unwrap(), 0x12345678);
        assert_eq!(client.into_port().written, vec![0x29, 0x20]);
    }

    #[test]
    fn test_reboot_is_fire_and_forget() {
        let mut client = BootloaderClient::new(MockPort::new(&[]));
        client.reboot().unwrap();

        let port = client.into_port();
        assert_eq!(port.written, vec![0x30, 0x20]);
        // Reboot is the one command that must not touch the input buffer.
        assert_eq!(port.clears, 0);
    }

    #[test]
    fn test_reserved_opcodes_do_not_shadow_live_ones() {
        let live = [
            Opcode::GetSync as u8,
            Opcode::GetDevice as u8,
            Opcode::ChipErase as u8,
            Opcode::ProgramMulti as u8,
            Opcode::GetCrc as u8,
            Opcode::GetSerialWord as u8,
            Opcode::GetChipDescription as u8,
            Opcode::Reboot as u8,
        ];
        for reserved in ReservedOpcode::ALL {
            assert!(!live.contains(&(reserved as u8)), "{reserved:?}");
        }
    }
}
