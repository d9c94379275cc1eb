//! Typed configuration accessors.
//!
//! Each getter/setter pair wraps one DCI parameter. Setters validate
//! their argument before touching the bus; getters surface values the
//! firmware should never produce as [`Error::CorruptedFrame`].

use crate::consts::{
    DCI_DSS_CONFIG, DCI_FREQ_HZ, DCI_INT_TIME, DCI_RANGING_MODE, DCI_SHARPENER, DCI_SINGLE_RANGE,
    DCI_TARGET_ORDER, DCI_ZONE_CONFIG, REG_PAGE_SELECT,
};
use crate::{Error, PowerMode, RangingMode, Resolution, TargetOrder, Vl53l5cx};

#[cfg(not(feature = "async"))]
use embedded_hal::{delay::DelayNs, i2c::I2c};
#[cfg(feature = "async")]
use embedded_hal_async::{delay::DelayNs, i2c::I2c};

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
    /// Returns the current ranging grid resolution.
    ///
    /// # Errors
    ///
    /// * `Err(Error::CorruptedFrame)` - the firmware reported a zone count
    ///   that is neither 16 nor 64
    /// * `Err(Error::Timeout)` / `Err(Error::Mcu)` - the mailbox poll failed
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn get_resolution(&mut self) -> Result<Resolution, Error<E>> {
        self.dci_read_to_temp(DCI_ZONE_CONFIG, 8).await?;
        let zones = u16::from(self.temp_buffer[0]) * u16::from(self.temp_buffer[1]);
        Resolution::from_zone_count(zones).ok_or(Error::CorruptedFrame)
    }

    /// Sets the ranging grid resolution.
    ///
    /// Patches the zone grid and SPAD sampling parameters, then restages
    /// both calibration blocks for the new grid. Must not be called while
    /// ranging is active.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Timeout)` / `Err(Error::Mcu)` - the mailbox poll failed
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use vl53l5cx::{Resolution, Vl53l5cx};
    ///
    /// let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
    /// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
    /// let mut sensor = Vl53l5cx::new(i2c, delay);
    ///
    /// sensor.init().unwrap();
    /// sensor.set_resolution(Resolution::Res8x8).unwrap();
    /// assert_eq!(sensor.get_resolution().unwrap(), Resolution::Res8x8);
    /// ```
    pub async fn set_resolution(&mut self, resolution: Resolution) -> Result<(), Error<E>> {
        match resolution {
            Resolution::Res4x4 => {
                self.dci_read_to_temp(DCI_DSS_CONFIG, 16).await?;
                self.temp_buffer[0x04] = 64;
                self.temp_buffer[0x06] = 64;
                self.temp_buffer[0x09] = 4;
                self.dci_write_from_temp(DCI_DSS_CONFIG, 16).await?;

                self.dci_read_to_temp(DCI_ZONE_CONFIG, 8).await?;
                self.temp_buffer[0x00] = 4;
                self.temp_buffer[0x01] = 4;
                self.temp_buffer[0x04] = 8;
                self.temp_buffer[0x05] = 8;
                self.dci_write_from_temp(DCI_ZONE_CONFIG, 8).await?;
            }
            Resolution::Res8x8 => {
                self.dci_read_to_temp(DCI_DSS_CONFIG, 16).await?;
                self.temp_buffer[0x04] = 16;
                self.temp_buffer[0x06] = 16;
                self.temp_buffer[0x09] = 1;
                self.dci_write_from_temp(DCI_DSS_CONFIG, 16).await?;

                self.dci_read_to_temp(DCI_ZONE_CONFIG, 8).await?;
                self.temp_buffer[0x00] = 8;
                self.temp_buffer[0x01] = 8;
                self.temp_buffer[0x04] = 4;
                self.temp_buffer[0x05] = 4;
                self.dci_write_from_temp(DCI_ZONE_CONFIG, 8).await?;
            }
        }
        self.send_offset_data(resolution).await?;
        self.send_xtalk_data(resolution).await?;
        info!("resolution set to {} zones", resolution.zone_count());
        Ok(())
    }

    /// Returns the ranging frequency in Hz.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Timeout)` / `Err(Error::Mcu)` - the mailbox poll failed
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn get_ranging_frequency_hz(&mut self) -> Result<u8, Error<E>> {
        self.dci_read_to_temp(DCI_FREQ_HZ, 4).await?;
        Ok(self.temp_buffer[1])
    }

    /// Sets the ranging frequency in Hz.
    ///
    /// The device supports 1..=60 Hz at 4x4 and 1..=15 Hz at 8x8; only the
    /// outer bound is checked here, the firmware clips per-resolution.
    ///
    /// # Errors
    ///
    /// * `Err(Error::InvalidArgument)` - `frequency_hz` is outside `1..=60`
    /// * `Err(Error::Timeout)` / `Err(Error::Mcu)` - the mailbox poll failed
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn set_ranging_frequency_hz(&mut self, frequency_hz: u8) -> Result<(), Error<E>> {
        if !(1..=60).contains(&frequency_hz) {
            return Err(Error::InvalidArgument);
        }
        self.dci_replace_data(DCI_FREQ_HZ, 4, &[frequency_hz], 1)
            .await
    }

    /// Returns the integration time in milliseconds.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Timeout)` / `Err(Error::Mcu)` - the mailbox poll failed
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn get_integration_time_ms(&mut self) -> Result<u32, Error<E>> {
        self.dci_read_to_temp(DCI_INT_TIME, 20).await?;
        let time_us = u32::from_le_bytes([
            self.temp_buffer[0],
            self.temp_buffer[1],
            self.temp_buffer[2],
            self.temp_buffer[3],
        ]);
        Ok(time_us / 1000)
    }

    /// Sets the integration time in milliseconds (2..=1000).
    ///
    /// Only applies in [`RangingMode::Autonomous`]; in continuous mode the
    /// firmware ignores it.
    ///
    /// # Errors
    ///
    /// * `Err(Error::InvalidArgument)` - `time_ms` is outside `2..=1000`
    /// * `Err(Error::Timeout)` / `Err(Error::Mcu)` - the mailbox poll failed
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn set_integration_time_ms(&mut self, time_ms: u32) -> Result<(), Error<E>> {
        if !(2..=1000).contains(&time_ms) {
            return Err(Error::InvalidArgument);
        }
        let time_us = (time_ms * 1000).to_le_bytes();
        self.dci_replace_data(DCI_INT_TIME, 20, &time_us, 0).await
    }

    /// Returns the sharpener strength in percent (0..=99).
    ///
    /// # Errors
    ///
    /// * `Err(Error::Timeout)` / `Err(Error::Mcu)` - the mailbox poll failed
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn get_sharpener_percent(&mut self) -> Result<u8, Error<E>> {
        self.dci_read_to_temp(DCI_SHARPENER, 16).await?;
        Ok((u16::from(self.temp_buffer[0xD]) * 100 / 255) as u8)
    }

    /// Sets the sharpener strength in percent (0..=99). Zero disables the
    /// sharpener.
    ///
    /// # Errors
    ///
    /// * `Err(Error::InvalidArgument)` - `percent` is 100 or more
    /// * `Err(Error::Timeout)` / `Err(Error::Mcu)` - the mailbox poll failed
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn set_sharpener_percent(&mut self, percent: u8) -> Result<(), Error<E>> {
        if percent >= 100 {
            return Err(Error::InvalidArgument);
        }
        let raw = (u16::from(percent) * 255 / 100) as u8;
        self.dci_replace_data(DCI_SHARPENER, 16, &[raw], 0xD).await
    }

    /// Returns the order in which targets within a zone are reported.
    ///
    /// # Errors
    ///
    /// * `Err(Error::CorruptedFrame)` - the firmware reported an unknown
    ///   order code
    /// * `Err(Error::Timeout)` / `Err(Error::Mcu)` - the mailbox poll failed
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn get_target_order(&mut self) -> Result<TargetOrder, Error<E>> {
        self.dci_read_to_temp(DCI_TARGET_ORDER, 4).await?;
        TargetOrder::from_raw(self.temp_buffer[0]).ok_or(Error::CorruptedFrame)
    }

    /// Sets the order in which targets within a zone are reported.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Timeout)` / `Err(Error::Mcu)` - the mailbox poll failed
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn set_target_order(&mut self, order: TargetOrder) -> Result<(), Error<E>> {
        self.dci_replace_data(DCI_TARGET_ORDER, 4, &[order.into()], 0)
            .await
    }

    /// Returns the ranging scheduling mode.
    ///
    /// # Errors
    ///
    /// * `Err(Error::CorruptedFrame)` - the firmware reported an unknown
    ///   mode code
    /// * `Err(Error::Timeout)` / `Err(Error::Mcu)` - the mailbox poll failed
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn get_ranging_mode(&mut self) -> Result<RangingMode, Error<E>> {
        self.dci_read_to_temp(DCI_RANGING_MODE, 8).await?;
        match self.temp_buffer[1] {
            0x1 => Ok(RangingMode::Continuous),
            0x3 => Ok(RangingMode::Autonomous),
            _ => Err(Error::CorruptedFrame),
        }
    }

    /// Sets the ranging scheduling mode.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Timeout)` / `Err(Error::Mcu)` - the mailbox poll failed
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn set_ranging_mode(&mut self, mode: RangingMode) -> Result<(), Error<E>> {
        self.dci_read_to_temp(DCI_RANGING_MODE, 8).await?;
        let single_range: u32 = match mode {
            RangingMode::Continuous => {
                self.temp_buffer[1] = 0x1;
                self.temp_buffer[3] = 0x3;
                0x0
            }
            RangingMode::Autonomous => {
                self.temp_buffer[1] = 0x3;
                self.temp_buffer[3] = 0x2;
                0x1
            }
        };
        self.dci_write_from_temp(DCI_RANGING_MODE, 8).await?;
        self.temp_buffer[..4].copy_from_slice(&single_range.to_le_bytes());
        self.dci_write_from_temp(DCI_SINGLE_RANGE, 4).await
    }

    /// Returns the device power state.
    ///
    /// # Errors
    ///
    /// * `Err(Error::CorruptedFrame)` - the power register holds an unknown
    ///   value
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn get_power_mode(&mut self) -> Result<PowerMode, Error<E>> {
        self.write_byte(REG_PAGE_SELECT, 0x00).await?;
        let raw = self.read_byte(0x009u16).await?;
        self.write_byte(REG_PAGE_SELECT, 0x02).await?;
        match raw {
            0x4 => Ok(PowerMode::Wakeup),
            0x2 => Ok(PowerMode::Sleep),
            _ => Err(Error::CorruptedFrame),
        }
    }

    /// Sets the device power state.
    ///
    /// In [`PowerMode::Sleep`] the firmware and configuration are
    /// retained but ranging is unavailable until the next
    /// [`PowerMode::Wakeup`].
    ///
    /// # Errors
    ///
    /// * `Err(Error::Timeout)` - the device did not confirm the wake-up
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn set_power_mode(&mut self, mode: PowerMode) -> Result<(), Error<E>> {
        let current = self.get_power_mode().await?;
        if current == mode {
            return Ok(());
        }
        self.write_byte(REG_PAGE_SELECT, 0x00).await?;
        match mode {
            PowerMode::Wakeup => {
                self.write_byte(0x009u16, 0x04).await?;
                self.poll_for_answer(1, 0, 0x06, 0x01, 0x01).await?;
            }
            PowerMode::Sleep => {
                self.write_byte(0x009u16, 0x02).await?;
            }
        }
        self.write_byte(REG_PAGE_SELECT, 0x02).await?;
        Ok(())
    }
}
