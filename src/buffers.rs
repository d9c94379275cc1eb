//! Opaque build-time payloads streamed to the sensor during boot.
//!
//! None of these blobs is ever parsed by the driver; they are written
//! verbatim and the firmware interprets them. The binary resources under
//! `src/data/` hold the vendor images.

/// Ranging firmware image, streamed to the sensor MCU in three
/// page-selected chunks during [`init`](crate::Vl53l5cx::init).
pub(crate) static FIRMWARE: &[u8; 88_064] = include_bytes!("data/vl53l5cx_firmware.bin");

/// Page boundary between the first and second firmware download chunks.
pub(crate) const FIRMWARE_PAGE_SIZE: usize = 0x8000;

/// Default firmware configuration blob, pushed right after the firmware
/// has booted.
pub(crate) static DEFAULT_CONFIGURATION: &[u8; 972] = include_bytes!("data/default_configuration.bin");

/// Default crosstalk calibration shape, used until the caller provides a
/// device-specific calibration.
pub(crate) static DEFAULT_XTALK: &[u8; 776] = include_bytes!("data/default_xtalk.bin");

/// Scripted mailbox command requesting the factory NVM block.
pub(crate) static NVM_READ_SCRIPT: [u8; 40] = [
    0x00, 0x02, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xEC,
];
