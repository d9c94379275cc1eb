//! # VL53L5CX Multizone Time-of-Flight Ranging Sensor Driver
//!
//! This crate provides a `no_std` driver for ST-Microelectronics' VL53L5CX
//! multizone time-of-flight ranging sensor. The sensor ranges a 4x4 or 8x8
//! zone grid with up to four targets per zone, and is driven over I2C
//! through a firmware command mailbox (the DCI interface).
//!
//! The driver owns the full boot sequence, including the firmware image
//! download, and exposes typed configuration accessors plus a ranging-frame
//! decoder. It is generic over any [`embedded_hal::i2c::I2c`] bus and
//! [`embedded_hal::delay::DelayNs`] timer; enabling the `async` feature
//! swaps both for their `embedded-hal-async` counterparts.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use vl53l5cx::{Resolution, Vl53l5cx};
//!
//! let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
//! let delay = embedded_hal_mock::eh1::delay::NoopDelay;
//! let mut sensor = Vl53l5cx::new(i2c, delay);
//!
//! sensor.init().unwrap();
//! sensor.set_resolution(Resolution::Res8x8).unwrap();
//! sensor.start_ranging().unwrap();
//!
//! loop {
//!     if sensor.check_data_ready().unwrap() {
//!         let results = sensor.get_ranging_data().unwrap();
//!         if let Some(distance_mm) = results.distance_mm {
//!             // Zone 27 is near the middle of the 8x8 grid.
//!             let _ = distance_mm[27];
//!         }
//!         break;
//!     }
//! }
//! sensor.stop_ranging().unwrap();
//! ```
//!
//! ## Concurrency
//!
//! Every operation runs to completion (or to its internal poll budget) on
//! the caller. The driver holds a scratch buffer sized for the worst-case
//! ranging frame, so one instance must not be shared between contexts
//! without external serialization.
#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]

mod fmt; // <-- must be first module!

mod accessors;
mod buffers;
mod calibration;
mod consts;
mod dci;
mod ranging;
mod utils;

pub use consts::{
    PowerMode, RangingMode, Resolution, TargetOrder, DEFAULT_I2C_ADDRESS, MAX_TARGETS_PER_ZONE,
    MAX_TARGET_RESULTS, MAX_ZONES,
};
pub use ranging::{MotionIndicator, RangingOutputs, ResultsData};

use buffers::{DEFAULT_CONFIGURATION, DEFAULT_XTALK, FIRMWARE, FIRMWARE_PAGE_SIZE, NVM_READ_SCRIPT};
use consts::{
    DCI_FW_NB_TARGET, DCI_PIPE_CONTROL, DCI_SINGLE_RANGE, DEFAULT_CONFIG_ADDRESS, DEVICE_ID,
    I2C_CHUNK_SIZE, NVM_CMD_ADDRESS, NVM_DATA_SIZE, OFFSET_BUFFER_SIZE, REG_PAGE_SELECT,
    REVISION_ID, SCRATCH_BUFFER_SIZE, UI_CMD_START, UI_CMD_STATUS, XTALK_BUFFER_SIZE,
};

#[cfg(not(feature = "async"))]
use embedded_hal::{delay::DelayNs, i2c::I2c};
#[cfg(feature = "async")]
use embedded_hal_async::{delay::DelayNs, i2c::I2c};

/// VL53L5CX multizone time-of-flight ranging sensor driver.
///
/// One instance owns one sensor: the bus handle, the delay provider, the
/// negotiated frame size, both calibration blobs and the scratch buffer
/// every operation reuses. Multiple sensors are independent instances on
/// independent I2C addresses.
///
/// The driver is generic over the I2C and delay implementations, allowing
/// it to work with any embedded-hal compatible hardware.
pub struct Vl53l5cx<I2C, D> {
    /// I2C interface for communication with the sensor.
    i2c: I2C,
    /// Current 7-bit I2C address of the sensor.
    address: u8,
    /// Delay implementation for timing operations.
    delay: D,
    /// Rolling frame sequence counter, updated from every frame read.
    pub(crate) streamcount: u8,
    /// Size of one ranging frame as negotiated by `start_ranging`. Zero
    /// until a ranging session has been configured.
    pub(crate) data_read_size: u32,
    /// Targets reported per zone (1..=4), fixed before `init`.
    pub(crate) targets_per_zone: u8,
    /// Telemetry blocks requested from the firmware.
    pub(crate) outputs: ranging::RangingOutputs,
    /// Factory offset calibration, captured from NVM at boot.
    pub(crate) offset_data: [u8; OFFSET_BUFFER_SIZE],
    /// Crosstalk calibration, defaulted at boot.
    pub(crate) xtalk_data: [u8; XTALK_BUFFER_SIZE],
    /// Single-owner workspace reused by every operation.
    pub(crate) temp_buffer: [u8; SCRATCH_BUFFER_SIZE],
}

#[maybe_async_cfg::maybe(
    sync(cfg(not(feature = "async")), keep_self),
    async(feature = "async", keep_self)
)]
impl<I2C, E, D> Vl53l5cx<I2C, D>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
    D: DelayNs,
{
    /// Creates a new driver instance with the default I2C address.
    ///
    /// The sensor is not yet usable: call [`init`](Self::init) to run the
    /// boot sequence and download the ranging firmware. All telemetry
    /// outputs are enabled and one target per zone is reported by default;
    /// adjust with [`set_enabled_outputs`](Self::set_enabled_outputs) and
    /// [`set_targets_per_zone`](Self::set_targets_per_zone) before `init`.
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self {
            i2c,
            address: DEFAULT_I2C_ADDRESS,
            delay,
            streamcount: 0,
            data_read_size: 0,
            targets_per_zone: 1,
            outputs: ranging::RangingOutputs::all(),
            offset_data: [0; OFFSET_BUFFER_SIZE],
            xtalk_data: [0; XTALK_BUFFER_SIZE],
            temp_buffer: [0; SCRATCH_BUFFER_SIZE],
        }
    }

    /// Releases the bus and delay handles.
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    /// Size in bytes of one ranging frame, as negotiated by
    /// [`start_ranging`](Self::start_ranging). Zero while no ranging
    /// session is configured.
    #[must_use]
    pub fn data_read_size(&self) -> u32 {
        self.data_read_size
    }

    /// Sequence number of the last frame read, used to detect duplicate
    /// frames.
    #[must_use]
    pub fn streamcount(&self) -> u8 {
        self.streamcount
    }

    /// Currently requested telemetry outputs.
    #[must_use]
    pub fn enabled_outputs(&self) -> ranging::RangingOutputs {
        self.outputs
    }

    /// Selects which telemetry blocks the firmware publishes per frame.
    ///
    /// Takes effect on the next [`start_ranging`](Self::start_ranging);
    /// must not be called while ranging is active.
    pub fn set_enabled_outputs(&mut self, outputs: ranging::RangingOutputs) {
        self.outputs = outputs;
    }

    /// Number of targets reported per zone.
    #[must_use]
    pub fn targets_per_zone(&self) -> u8 {
        self.targets_per_zone
    }

    /// Sets the number of targets reported per zone.
    ///
    /// Must be called before [`init`](Self::init): the value is pushed to
    /// the firmware pipe control during the boot sequence.
    ///
    /// # Errors
    ///
    /// * `Err(Error::InvalidArgument)` - if `targets` is outside `1..=4`
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use vl53l5cx::Vl53l5cx;
    ///
    /// let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
    /// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
    /// let mut sensor = Vl53l5cx::new(i2c, delay);
    ///
    /// // Report up to two targets in each zone.
    /// sensor.set_targets_per_zone(2).unwrap();
    /// sensor.init().unwrap();
    /// ```
    pub fn set_targets_per_zone(&mut self, targets: u8) -> Result<(), Error<E>> {
        if !(1..=MAX_TARGETS_PER_ZONE as u8).contains(&targets) {
            return Err(Error::InvalidArgument);
        }
        self.targets_per_zone = targets;
        Ok(())
    }

    /// Sets the I2C address of the sensor and switches the driver to it.
    ///
    /// The change applies immediately on the device side; every subsequent
    /// transaction uses the new address.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn set_i2c_address(&mut self, address: u8) -> Result<(), Error<E>> {
        self.write_byte(REG_PAGE_SELECT, 0x00).await?;
        self.write_byte(0x4u16, address << 1).await?;
        self.address = address;
        self.write_byte(REG_PAGE_SELECT, 0x02).await?;
        info!("i2c address changed to {:#x}", address);
        Ok(())
    }

    /// Checks that the sensor answers on the bus with the expected device
    /// and revision identification bytes.
    ///
    /// # Errors
    ///
    /// * `Err(Error::CorruptedFrame)` - if the identification bytes do not match
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn is_alive(&mut self) -> Result<(), Error<E>> {
        self.write_byte(REG_PAGE_SELECT, 0x00).await?;
        let device_id = self.read_byte(0u16).await?;
        let revision_id = self.read_byte(1u16).await?;
        self.write_byte(REG_PAGE_SELECT, 0x02).await?;
        if device_id != DEVICE_ID || revision_id != REVISION_ID {
            warn!(
                "unexpected identification: device {:#x} revision {:#x}",
                device_id, revision_id
            );
            return Err(Error::CorruptedFrame);
        }
        Ok(())
    }

    /// Initializes the sensor: reboots the internal MCU, downloads the
    /// ranging firmware, loads factory calibration from NVM and pushes the
    /// default configuration.
    ///
    /// Must be called once after power-on, before any ranging or
    /// configuration access. Takes a few hundred milliseconds on real
    /// hardware, dominated by the ~86 KiB firmware download.
    ///
    /// The sequence is not retried internally; on a bus glitch the caller
    /// should pulse the reset line and call `init` again.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Timeout)` - a boot or command poll exhausted its budget
    /// * `Err(Error::Mcu)` - the firmware flagged a command failure
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn init(&mut self) -> Result<(), Error<E>> {
        info!("requesting MCU reboot");
        self.write_byte(REG_PAGE_SELECT, 0x00).await?;
        self.write_byte(0x0009u16, 0x04).await?;
        self.write_byte(0x000Fu16, 0x40).await?;
        self.write_byte(0x000Au16, 0x03).await?;
        self.read_byte(REG_PAGE_SELECT).await?;
        self.write_byte(0x000Cu16, 0x01).await?;

        self.write_byte(0x0101u16, 0x00).await?;
        self.write_byte(0x0102u16, 0x00).await?;
        self.write_byte(0x010Au16, 0x01).await?;
        self.write_byte(0x4002u16, 0x01).await?;
        self.write_byte(0x4002u16, 0x00).await?;
        self.write_byte(0x010Au16, 0x03).await?;
        self.write_byte(0x0103u16, 0x01).await?;
        self.write_byte(0x000Cu16, 0x00).await?;
        self.write_byte(0x000Fu16, 0x43).await?;
        self.delay.delay_ms(1).await;

        self.write_byte(0x000Fu16, 0x40).await?;
        self.write_byte(0x000Au16, 0x01).await?;
        self.delay.delay_ms(100).await;

        // Wait for the sensor to report booted.
        debug!("waiting for boot status");
        self.write_byte(REG_PAGE_SELECT, 0x00).await?;
        self.poll_for_answer(1, 0, 0x06, 0xFF, 0x01).await?;

        self.write_byte(0x000Eu16, 0x01).await?;
        self.write_byte(REG_PAGE_SELECT, 0x02).await?;

        // Enable firmware access.
        self.write_byte(REG_PAGE_SELECT, 0x01).await?;
        self.write_byte(0x06u16, 0x01).await?;
        self.poll_for_answer(1, 0, 0x21, 0xFF, 0x04).await?;

        self.write_byte(REG_PAGE_SELECT, 0x00).await?;

        // Enable host access to GO1.
        self.read_byte(REG_PAGE_SELECT).await?;
        self.write_byte(0x0Cu16, 0x01).await?;

        // Power-on status.
        self.write_byte(REG_PAGE_SELECT, 0x00).await?;
        self.write_byte(0x101u16, 0x00).await?;
        self.write_byte(0x102u16, 0x00).await?;
        self.write_byte(0x010Au16, 0x01).await?;
        self.write_byte(0x4002u16, 0x01).await?;
        self.write_byte(0x4002u16, 0x00).await?;
        self.write_byte(0x010Au16, 0x03).await?;
        self.write_byte(0x103u16, 0x01).await?;
        self.write_byte(0x400Fu16, 0x00).await?;
        self.write_byte(0x21Au16, 0x43).await?;
        self.write_byte(0x21Au16, 0x03).await?;
        self.write_byte(0x21Au16, 0x01).await?;
        self.write_byte(0x21Au16, 0x00).await?;
        self.write_byte(0x219u16, 0x00).await?;
        self.write_byte(0x21Bu16, 0x00).await?;

        // Wake up the MCU.
        self.write_byte(REG_PAGE_SELECT, 0x00).await?;
        self.read_byte(REG_PAGE_SELECT).await?;
        self.write_byte(REG_PAGE_SELECT, 0x01).await?;
        self.write_byte(0x20u16, 0x07).await?;
        self.write_byte(0x20u16, 0x06).await?;

        // Stream the firmware image through the three download pages.
        info!("downloading ranging firmware ({} bytes)", FIRMWARE.len());
        self.write_byte(REG_PAGE_SELECT, 0x09).await?;
        self.write_multi(0, &FIRMWARE[..FIRMWARE_PAGE_SIZE]).await?;
        self.write_byte(REG_PAGE_SELECT, 0x0A).await?;
        self.write_multi(0, &FIRMWARE[FIRMWARE_PAGE_SIZE..2 * FIRMWARE_PAGE_SIZE])
            .await?;
        self.write_byte(REG_PAGE_SELECT, 0x0B).await?;
        self.write_multi(0, &FIRMWARE[2 * FIRMWARE_PAGE_SIZE..])
            .await?;
        self.write_byte(REG_PAGE_SELECT, 0x01).await?;

        // Check the download landed.
        self.write_byte(REG_PAGE_SELECT, 0x01).await?;
        self.write_byte(0x06u16, 0x03).await?;
        self.delay.delay_ms(5).await;
        self.poll_for_answer(1, 0, 0x21, 0x10, 0x10).await?;
        self.write_byte(REG_PAGE_SELECT, 0x00).await?;
        self.read_byte(REG_PAGE_SELECT).await?;
        self.write_byte(0x0Cu16, 0x01).await?;

        // Reset the MCU and wait for it to come back on the new firmware.
        debug!("resetting MCU");
        self.write_byte(REG_PAGE_SELECT, 0x00).await?;
        self.write_byte(0x114u16, 0x00).await?;
        self.write_byte(0x115u16, 0x00).await?;
        self.write_byte(0x116u16, 0x42).await?;
        self.write_byte(0x117u16, 0x00).await?;
        self.write_byte(0x0Bu16, 0x00).await?;
        self.read_byte(REG_PAGE_SELECT).await?;
        self.write_byte(0x0Cu16, 0x00).await?;
        self.write_byte(0x0Bu16, 0x01).await?;

        self.poll_for_mcu_boot().await?;

        self.write_byte(REG_PAGE_SELECT, 0x02).await?;

        // Read the factory NVM block and keep its offset sub-region.
        debug!("reading factory NVM calibration");
        self.write_multi(NVM_CMD_ADDRESS, &NVM_READ_SCRIPT).await?;
        self.poll_for_answer(4, 0, UI_CMD_STATUS, 0xFF, 0x02).await?;
        self.read_to_temp(UI_CMD_START, NVM_DATA_SIZE).await?;
        self.offset_data
            .copy_from_slice(&self.temp_buffer[..OFFSET_BUFFER_SIZE]);
        self.send_offset_data(Resolution::Res4x4).await?;

        // Push the default crosstalk shape.
        self.xtalk_data.copy_from_slice(DEFAULT_XTALK);
        self.send_xtalk_data(Resolution::Res4x4).await?;

        // Push the default firmware configuration.
        debug!("sending default configuration");
        self.write_multi(DEFAULT_CONFIG_ADDRESS, DEFAULT_CONFIGURATION)
            .await?;
        self.poll_for_answer(4, 1, UI_CMD_STATUS, 0xFF, 0x03).await?;

        // Per-zone target count ("pipe control") and single-range flag.
        let pipe_control = [self.targets_per_zone, 0x00, 0x01, 0x00];
        self.temp_buffer[..4].copy_from_slice(&pipe_control);
        self.dci_write_from_temp(DCI_PIPE_CONTROL, 4).await?;

        if self.targets_per_zone != 1 {
            let targets = [self.targets_per_zone];
            self.dci_replace_data(DCI_FW_NB_TARGET, 16, &targets, 0x0C)
                .await?;
        }

        self.temp_buffer[..4].copy_from_slice(&1u32.to_le_bytes());
        self.dci_write_from_temp(DCI_SINGLE_RANGE, 4).await?;

        info!("sensor initialized");
        Ok(())
    }

    /// Writes a single byte to a sensor register.
    ///
    /// This is a low-level escape hatch; most applications should use the
    /// higher-level configuration functions instead.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn write_byte<R>(&mut self, register_address: R, value: u8) -> Result<(), Error<E>>
    where
        R: Into<u16>,
    {
        let reg: u16 = register_address.into();
        let buffer = [(reg >> 8) as u8, (reg & 0xFF) as u8, value];
        self.i2c.write(self.address, &buffer).await?;
        Ok(())
    }

    /// Reads a single byte from a sensor register.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn read_byte<R>(&mut self, register_address: R) -> Result<u8, Error<E>>
    where
        R: Into<u16>,
    {
        let reg: u16 = register_address.into();
        let mut buffer = [0u8; 1];
        self.i2c
            .write_read(self.address, &reg.to_be_bytes(), &mut buffer)
            .await?;
        Ok(buffer[0])
    }

    /// Burst-reads `size` bytes starting at `reg` into the scratch buffer,
    /// splitting into chunk-sized transactions.
    pub(crate) async fn read_to_temp(&mut self, reg: u16, size: usize) -> Result<(), Error<E>> {
        for start in (0..size).step_by(I2C_CHUNK_SIZE) {
            let len = I2C_CHUNK_SIZE.min(size - start);
            let chunk_reg = reg + start as u16;
            self.i2c
                .write_read(
                    self.address,
                    &chunk_reg.to_be_bytes(),
                    &mut self.temp_buffer[start..start + len],
                )
                .await?;
        }
        Ok(())
    }

    /// Burst-writes a byte slice starting at `reg`, splitting into
    /// chunk-sized transactions. Each chunk carries its own address prefix.
    pub(crate) async fn write_multi(&mut self, reg: u16, data: &[u8]) -> Result<(), Error<E>> {
        let mut frame = [0u8; I2C_CHUNK_SIZE];
        for start in (0..data.len()).step_by(I2C_CHUNK_SIZE - 2) {
            let len = (I2C_CHUNK_SIZE - 2).min(data.len() - start);
            let chunk_reg = reg + start as u16;
            frame[..2].copy_from_slice(&chunk_reg.to_be_bytes());
            frame[2..2 + len].copy_from_slice(&data[start..start + len]);
            self.i2c.write(self.address, &frame[..2 + len]).await?;
        }
        Ok(())
    }

    /// Burst-writes the first `size` bytes of the scratch buffer at `reg`.
    pub(crate) async fn write_from_temp(&mut self, reg: u16, size: usize) -> Result<(), Error<E>> {
        let mut frame = [0u8; I2C_CHUNK_SIZE];
        for start in (0..size).step_by(I2C_CHUNK_SIZE - 2) {
            let len = (I2C_CHUNK_SIZE - 2).min(size - start);
            let chunk_reg = reg + start as u16;
            frame[..2].copy_from_slice(&chunk_reg.to_be_bytes());
            frame[2..2 + len].copy_from_slice(&self.temp_buffer[start..start + len]);
            self.i2c.write(self.address, &frame[..2 + len]).await?;
        }
        Ok(())
    }
}

/// Error type for VL53L5CX sensor operations.
///
/// Multi-step sequences (boot, resolution change, mode change) propagate
/// the first failing step instead of folding step statuses into one opaque
/// code, so the variant identifies what went wrong.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E: core::fmt::Debug> {
    /// I2C communication error from the underlying hardware.
    I2cError(E),
    /// A poll exhausted its budget without seeing the expected status.
    Timeout,
    /// The firmware reported a command failure through the mailbox status.
    Mcu,
    /// Invalid parameter value; rejected before any bus traffic.
    InvalidArgument,
    /// A DCI request exceeds the scratch buffer; rejected before any bus
    /// traffic.
    BufferTooSmall,
    /// The frame size negotiated by the firmware disagrees with the
    /// locally computed output-list total.
    FrameSizeMismatch,
    /// The device returned a frame or payload that does not decode.
    CorruptedFrame,
}

impl<E: core::fmt::Debug> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl<E: core::fmt::Debug> From<E> for Error<E> {
    fn from(error: E) -> Self {
        Error::I2cError(error)
    }
}
