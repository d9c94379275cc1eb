//! Ranging session control and frame decoding.
//!
//! A ranging frame is a sequence of self-describing blocks, each led by a
//! 32-bit block header packing the element width, the payload size and the
//! parameter index. [`Vl53l5cx::start_ranging`] builds the output list for
//! the enabled telemetry, negotiates the frame size with the firmware and
//! stores it; [`Vl53l5cx::get_ranging_data`] walks the headers of a
//! captured frame and scatters each recognized block into [`ResultsData`].

use bitflags::bitflags;

use crate::consts::{
    BlockIndexes, BLOCK_IDX_MULTI_TARGET, BLOCK_IDX_SINGLE_TARGET, DCI_OUTPUT_CONFIG,
    DCI_OUTPUT_ENABLES, DCI_OUTPUT_LIST, DCI_UI_RANGE_DATA, MAX_TARGET_RESULTS, MAX_ZONES,
    METADATA_IDX, OUTPUT_TEMPLATES_MULTI_TARGET, OUTPUT_TEMPLATES_SINGLE_TARGET,
    PER_ZONE_IDX_FIRST, PER_ZONE_IDX_SPAN, REG_PAGE_SELECT, UI_CMD_END, UI_CMD_STATUS,
};
use crate::utils::{from_u32_to_u8, from_u8_to_i16, from_u8_to_u16, from_u8_to_u32, swap_words};
use crate::{Error, Vl53l5cx};

#[cfg(not(feature = "async"))]
use embedded_hal::{delay::DelayNs, i2c::I2c};
#[cfg(feature = "async")]
use embedded_hal_async::{delay::DelayNs, i2c::I2c};

bitflags! {
    /// Telemetry blocks the firmware can publish per ranging frame.
    ///
    /// Fewer enabled outputs means smaller frames and less bus traffic.
    /// The frame's fixed metadata (stream counter, silicon temperature)
    /// is always present. Bit positions match the firmware's output-list
    /// slots, so the raw bits go to the device unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct RangingOutputs: u32 {
        /// Ambient light level per zone.
        const AMBIENT_PER_SPAD = 1 << 3;
        /// Number of SPADs enabled per zone.
        const NB_SPADS_ENABLED = 1 << 4;
        /// Number of targets detected per zone.
        const NB_TARGET_DETECTED = 1 << 5;
        /// Signal return rate per target.
        const SIGNAL_PER_SPAD = 1 << 6;
        /// Distance measurement standard deviation per target.
        const RANGE_SIGMA_MM = 1 << 7;
        /// Distance to target in millimetres.
        const DISTANCE_MM = 1 << 8;
        /// Estimated target reflectance per target.
        const REFLECTANCE = 1 << 9;
        /// Measurement validity classification per target.
        const TARGET_STATUS = 1 << 10;
        /// Motion detection block.
        const MOTION_INDICATOR = 1 << 11;
    }
}

/// Block header: element type in bits 0..4, payload size in bits 4..16,
/// parameter index in bits 16..32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockHeader(pub u32);

impl BlockHeader {
    pub(crate) fn block_type(self) -> u32 {
        self.0 & 0xF
    }

    pub(crate) fn size(self) -> u32 {
        (self.0 >> 4) & 0xFFF
    }

    pub(crate) fn idx(self) -> u32 {
        self.0 >> 16
    }

    pub(crate) fn with_size(self, size: u32) -> Self {
        BlockHeader((self.0 & !0xFFF0) | ((size & 0xFFF) << 4))
    }

    /// Payload bytes following this header. Types 1..=12 are element
    /// widths (payload is `type * size` elements of `type` bytes); other
    /// types carry `size` bytes directly.
    pub(crate) fn payload_bytes(self) -> u32 {
        let block_type = self.block_type();
        if (1..13).contains(&block_type) {
            block_type * self.size()
        } else {
            self.size()
        }
    }
}

/// Motion detection block published when
/// [`RangingOutputs::MOTION_INDICATOR`] is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotionIndicator {
    /// First global motion indicator.
    pub global_indicator_1: u32,
    /// Second global motion indicator.
    pub global_indicator_2: u32,
    /// Motion detection status.
    pub status: u8,
    /// Number of aggregates where motion was detected.
    pub nb_of_detected_aggregates: u8,
    /// Number of aggregates configured.
    pub nb_of_aggregates: u8,
    /// Padding.
    pub spare: u8,
    /// Per-aggregate motion intensity.
    pub motion: [u32; 32],
}

/// One decoded ranging frame.
///
/// Per-zone arrays are indexed by zone number (row-major, top-left
/// first) and sized for the 8x8 worst case; at 4x4 only the first 16
/// entries are meaningful. Per-target arrays are indexed by
/// `zone * targets_per_zone + target`. A field is `Some` exactly when
/// the matching output was enabled for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResultsData {
    /// Internal sensor temperature in degrees Celsius.
    pub silicon_temp_degc: i8,
    /// Ambient rate per zone, in kcps/spad.
    pub ambient_per_spad: Option<[u32; MAX_ZONES]>,
    /// Number of SPADs enabled per zone.
    pub nb_spads_enabled: Option<[u32; MAX_ZONES]>,
    /// Number of targets detected per zone. Zero means the matching
    /// per-target entries carry no measurement.
    pub nb_target_detected: Option<[u8; MAX_ZONES]>,
    /// Signal rate per target, in kcps/spad.
    pub signal_per_spad: Option<[u32; MAX_TARGET_RESULTS]>,
    /// Distance standard deviation per target, in millimetres.
    pub range_sigma_mm: Option<[u16; MAX_TARGET_RESULTS]>,
    /// Distance per target in millimetres, clamped at zero.
    pub distance_mm: Option<[i16; MAX_TARGET_RESULTS]>,
    /// Estimated reflectance per target, in percent.
    pub reflectance: Option<[u8; MAX_TARGET_RESULTS]>,
    /// Measurement validity per target; 5 and 9 are the "valid" codes,
    /// 255 marks a slot with no detected target.
    pub target_status: Option<[u8; MAX_TARGET_RESULTS]>,
    /// Motion detection block.
    pub motion_indicator: Option<MotionIndicator>,
}

impl ResultsData {
    /// Empty frame with exactly the fields for `outputs` populated.
    fn for_outputs(outputs: RangingOutputs) -> Self {
        let zones = |flag| outputs.contains(flag).then(|| [0u32; MAX_ZONES]);
        Self {
            silicon_temp_degc: 0,
            ambient_per_spad: zones(RangingOutputs::AMBIENT_PER_SPAD),
            nb_spads_enabled: zones(RangingOutputs::NB_SPADS_ENABLED),
            nb_target_detected: outputs
                .contains(RangingOutputs::NB_TARGET_DETECTED)
                .then(|| [0u8; MAX_ZONES]),
            signal_per_spad: outputs
                .contains(RangingOutputs::SIGNAL_PER_SPAD)
                .then(|| [0u32; MAX_TARGET_RESULTS]),
            range_sigma_mm: outputs
                .contains(RangingOutputs::RANGE_SIGMA_MM)
                .then(|| [0u16; MAX_TARGET_RESULTS]),
            distance_mm: outputs
                .contains(RangingOutputs::DISTANCE_MM)
                .then(|| [0i16; MAX_TARGET_RESULTS]),
            reflectance: outputs
                .contains(RangingOutputs::REFLECTANCE)
                .then(|| [0u8; MAX_TARGET_RESULTS]),
            target_status: outputs
                .contains(RangingOutputs::TARGET_STATUS)
                .then(|| [0u8; MAX_TARGET_RESULTS]),
            motion_indicator: outputs
                .contains(RangingOutputs::MOTION_INDICATOR)
                .then(MotionIndicator::default),
        }
    }
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
    /// Starts a ranging session with the current resolution, outputs and
    /// targets-per-zone settings.
    ///
    /// Builds the firmware output list, pushes it with the matching
    /// enable mask, then verifies that the frame size the firmware
    /// negotiated matches the locally computed one.
    ///
    /// # Errors
    ///
    /// * `Err(Error::FrameSizeMismatch)` - the firmware disagrees on the
    ///   frame size; the session is not usable
    /// * `Err(Error::Timeout)` / `Err(Error::Mcu)` - the mailbox poll failed
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use vl53l5cx::{RangingOutputs, Vl53l5cx};
    ///
    /// let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
    /// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
    /// let mut sensor = Vl53l5cx::new(i2c, delay);
    ///
    /// // Small frames: distance and validity only.
    /// sensor.set_enabled_outputs(
    ///     RangingOutputs::DISTANCE_MM | RangingOutputs::TARGET_STATUS,
    /// );
    /// sensor.init().unwrap();
    /// sensor.start_ranging().unwrap();
    /// ```
    pub async fn start_ranging(&mut self) -> Result<(), Error<E>> {
        let resolution = self.get_resolution().await?;
        let zones = u32::from(resolution.zone_count());

        self.data_read_size = 0;
        self.streamcount = 255;

        let mut output: [u32; 12] = if self.targets_per_zone == 1 {
            OUTPUT_TEMPLATES_SINGLE_TARGET
        } else {
            OUTPUT_TEMPLATES_MULTI_TARGET
        };
        // The first three slots (start, metadata, common data) stay on.
        let enables: [u32; 4] = [0x7 | self.outputs.bits(), 0, 0, 0xC000_0000];

        for (slot, entry) in output.iter_mut().enumerate() {
            if *entry == 0 || enables[0] & (1 << slot) == 0 {
                continue;
            }
            let mut bh = BlockHeader(*entry);
            if (1..13).contains(&bh.block_type()) {
                if (PER_ZONE_IDX_FIRST..PER_ZONE_IDX_FIRST + PER_ZONE_IDX_SPAN).contains(&bh.idx())
                {
                    bh = bh.with_size(zones);
                } else {
                    bh = bh.with_size(zones * u32::from(self.targets_per_zone));
                }
                self.data_read_size += bh.block_type() * bh.size();
            } else {
                self.data_read_size += bh.size();
            }
            self.data_read_size += 4;
            *entry = bh.0;
        }
        self.data_read_size += 24;
        debug!("frame size for this session: {} bytes", self.data_read_size);

        let mut raw = [0u8; 48];
        from_u32_to_u8(&output, &mut raw);
        self.dci_write_data(&raw, DCI_OUTPUT_LIST).await?;

        let header_config: [u32; 2] = [self.data_read_size, 13];
        let mut raw = [0u8; 8];
        from_u32_to_u8(&header_config, &mut raw);
        self.dci_write_data(&raw, DCI_OUTPUT_CONFIG).await?;

        let mut raw = [0u8; 16];
        from_u32_to_u8(&enables, &mut raw);
        self.dci_write_data(&raw, DCI_OUTPUT_ENABLES).await?;

        // Route the interrupt through the xshut bypass.
        self.write_byte(REG_PAGE_SELECT, 0x00).await?;
        self.write_byte(0x09u16, 0x05).await?;
        self.write_byte(REG_PAGE_SELECT, 0x02).await?;

        // Fire the start command.
        let cmd = [0x00, 0x03, 0x00, 0x00];
        self.write_multi(UI_CMD_END - 3, &cmd).await?;
        self.poll_for_answer(4, 1, UI_CMD_STATUS, 0xFF, 0x03).await?;

        // Read back the negotiated frame size and compare.
        self.dci_read_to_temp(DCI_UI_RANGE_DATA, 12).await?;
        let negotiated = u16::from_le_bytes([self.temp_buffer[0x8], self.temp_buffer[0x9]]);
        if u32::from(negotiated) != self.data_read_size {
            warn!(
                "firmware negotiated {} bytes, expected {}",
                negotiated, self.data_read_size
            );
            return Err(Error::FrameSizeMismatch);
        }

        info!("ranging started");
        Ok(())
    }

    /// Stops the current ranging session.
    ///
    /// If the firmware already stopped on its own (single-shot sessions),
    /// the MCU stop handshake is skipped.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Timeout)` - the MCU did not acknowledge the stop
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn stop_ranging(&mut self) -> Result<(), Error<E>> {
        self.read_to_temp(UI_CMD_END - 3, 4).await?;
        let auto_stop_flag = u32::from_le_bytes([
            self.temp_buffer[0],
            self.temp_buffer[1],
            self.temp_buffer[2],
            self.temp_buffer[3],
        ]);

        let mut fault = None;
        if auto_stop_flag != 0x4FF {
            self.write_byte(REG_PAGE_SELECT, 0x00).await?;

            // Provoke an MCU stop.
            self.write_byte(0x15u16, 0x16).await?;
            self.write_byte(0x14u16, 0x01).await?;

            let mut attempts: u16 = 0;
            loop {
                let status = self.read_byte(0x06u16).await?;
                if status & 0x80 != 0 {
                    break;
                }
                attempts += 1;
                if attempts >= 500 {
                    warn!("MCU stop poll timed out");
                    return Err(Error::Timeout);
                }
                self.delay.delay_ms(10).await;
            }

            // The firmware records how the stop went; anything other than
            // the two stop-done codes is a fault.
            let status = self.read_byte(0x07u16).await?;
            if status != 0x84 && status != 0x85 {
                fault = Some(status);
            }
        } else {
            self.write_byte(REG_PAGE_SELECT, 0x00).await?;
        }

        // Undo the MCU stop and the xshut bypass.
        self.write_byte(0x14u16, 0x00).await?;
        self.write_byte(0x15u16, 0x00).await?;
        self.write_byte(0x09u16, 0x04).await?;
        self.write_byte(REG_PAGE_SELECT, 0x02).await?;

        self.data_read_size = 0;
        if let Some(code) = fault {
            warn!("stop reported status {:#x}", code);
            return Err(Error::Mcu);
        }
        info!("ranging stopped");
        Ok(())
    }

    /// Checks whether a new ranging frame is available.
    ///
    /// Reads the four status bytes at the bottom of the result window; a
    /// frame is new when the stream counter moved and the ready pattern is
    /// present.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Mcu)` - the status bytes flag a firmware fault
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn check_data_ready(&mut self) -> Result<bool, Error<E>> {
        self.read_to_temp(0, 4).await?;
        let status = [
            self.temp_buffer[0],
            self.temp_buffer[1],
            self.temp_buffer[2],
            self.temp_buffer[3],
        ];
        if status[0] != self.streamcount
            && status[0] != 255
            && status[1] == 0x05
            && status[2] & 0x05 == 0x05
            && status[3] & 0x10 == 0x10
        {
            self.streamcount = status[0];
            return Ok(true);
        }
        if status[3] & 0x80 != 0 {
            warn!("firmware fault {:#x} while ranging", status[2]);
            return Err(Error::Mcu);
        }
        Ok(false)
    }

    /// Reads and decodes one ranging frame.
    ///
    /// Walks the frame's block headers and scatters every recognized block
    /// into a fresh [`ResultsData`]; exactly the fields for the outputs
    /// enabled at [`start_ranging`](Self::start_ranging) come back `Some`.
    /// Raw firmware values are scaled to engineering units, and the status
    /// of empty target slots is forced to 255.
    ///
    /// # Errors
    ///
    /// * `Err(Error::CorruptedFrame)` - a block overruns the frame, or the
    ///   frame's header and footer sequence ids disagree
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn get_ranging_data(&mut self) -> Result<ResultsData, Error<E>> {
        let mut results = ResultsData::for_outputs(self.outputs);
        let idx: BlockIndexes = if self.targets_per_zone == 1 {
            BLOCK_IDX_SINGLE_TARGET
        } else {
            BLOCK_IDX_MULTI_TARGET
        };
        let size = self.data_read_size as usize;

        // A frame is at least the fixed header plus the footer; anything
        // shorter means no ranging session is configured.
        if size < 24 {
            return Err(Error::CorruptedFrame);
        }

        self.read_to_temp(0, size).await?;
        self.streamcount = self.temp_buffer[0];
        swap_words(&mut self.temp_buffer, size);

        // Frames carry the sequence id twice; a mismatch means the read
        // raced the firmware's buffer swap.
        let header_id = u16::from_be_bytes([self.temp_buffer[0x8], self.temp_buffer[0x9]]);
        let footer_id = u16::from_be_bytes([self.temp_buffer[size - 4], self.temp_buffer[size - 3]]);
        if header_id != footer_id {
            warn!("frame ids disagree: {} vs {}", header_id, footer_id);
            return Err(Error::CorruptedFrame);
        }

        // Block headers start after the fixed frame header.
        let mut i = 16;
        while i + 4 <= size {
            let bh = BlockHeader(u32::from_le_bytes([
                self.temp_buffer[i],
                self.temp_buffer[i + 1],
                self.temp_buffer[i + 2],
                self.temp_buffer[i + 3],
            ]));
            let msize = bh.payload_bytes() as usize;
            i += 4;
            if i + msize > size {
                warn!("block at {} overruns the frame", i - 4);
                return Err(Error::CorruptedFrame);
            }
            let payload = &self.temp_buffer[i..i + msize];

            let block_idx = bh.idx();
            if block_idx == METADATA_IDX {
                results.silicon_temp_degc = payload[8] as i8;
            } else if block_idx == idx.ambient_per_spad {
                if let Some(dst) = results.ambient_per_spad.as_mut() {
                    from_u8_to_u32(payload, dst);
                }
            } else if block_idx == idx.spad_count {
                if let Some(dst) = results.nb_spads_enabled.as_mut() {
                    from_u8_to_u32(payload, dst);
                }
            } else if block_idx == idx.nb_target_detected {
                if let Some(dst) = results.nb_target_detected.as_mut() {
                    let n = msize.min(dst.len());
                    dst[..n].copy_from_slice(&payload[..n]);
                }
            } else if block_idx == idx.signal_per_spad {
                if let Some(dst) = results.signal_per_spad.as_mut() {
                    from_u8_to_u32(payload, dst);
                }
            } else if block_idx == idx.range_sigma_mm {
                if let Some(dst) = results.range_sigma_mm.as_mut() {
                    from_u8_to_u16(payload, dst);
                }
            } else if block_idx == idx.distance_mm {
                if let Some(dst) = results.distance_mm.as_mut() {
                    from_u8_to_i16(payload, dst);
                }
            } else if block_idx == idx.reflectance {
                if let Some(dst) = results.reflectance.as_mut() {
                    let n = msize.min(dst.len());
                    dst[..n].copy_from_slice(&payload[..n]);
                }
            } else if block_idx == idx.target_status {
                if let Some(dst) = results.target_status.as_mut() {
                    let n = msize.min(dst.len());
                    dst[..n].copy_from_slice(&payload[..n]);
                }
            } else if block_idx == idx.motion_indicator {
                if msize < MOTION_BLOCK_SIZE {
                    warn!("motion block truncated to {} bytes", msize);
                    return Err(Error::CorruptedFrame);
                }
                if let Some(motion) = results.motion_indicator.as_mut() {
                    *motion = decode_motion_indicator(payload);
                }
            }
            i += msize;
        }

        convert_raw_units(&mut results);

        // Zones reporting zero targets get their status slots flagged.
        if let (Some(detected), Some(status)) =
            (results.nb_target_detected.as_ref(), results.target_status.as_mut())
        {
            let per_zone = usize::from(self.targets_per_zone);
            for (zone, &count) in detected.iter().enumerate() {
                if count == 0 {
                    status[zone * per_zone..(zone + 1) * per_zone].fill(255);
                }
            }
        }

        Ok(results)
    }

}

/// Scales raw firmware fixed-point values to engineering units.
fn convert_raw_units(results: &mut ResultsData) {
    if let Some(ambient) = results.ambient_per_spad.as_mut() {
        for value in ambient.iter_mut() {
            *value /= 2048;
        }
    }
    if let Some(signal) = results.signal_per_spad.as_mut() {
        for value in signal.iter_mut() {
            *value /= 2048;
        }
    }
    if let Some(distance) = results.distance_mm.as_mut() {
        for value in distance.iter_mut() {
            *value /= 4;
            if *value < 0 {
                *value = 0;
            }
        }
    }
    if let Some(sigma) = results.range_sigma_mm.as_mut() {
        for value in sigma.iter_mut() {
            *value /= 128;
        }
    }
    if let Some(reflectance) = results.reflectance.as_mut() {
        for value in reflectance.iter_mut() {
            *value /= 2;
        }
    }
    if let Some(motion) = results.motion_indicator.as_mut() {
        for value in motion.motion.iter_mut() {
            *value /= 65535;
        }
    }
}

/// Wire size of the motion block.
const MOTION_BLOCK_SIZE: usize = 140;

/// Unpacks the 140-byte motion block.
fn decode_motion_indicator(payload: &[u8]) -> MotionIndicator {
    let mut indicator = MotionIndicator {
        global_indicator_1: u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
        global_indicator_2: u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]),
        status: payload[8],
        nb_of_detected_aggregates: payload[9],
        nb_of_aggregates: payload[10],
        spare: payload[11],
        motion: [0; 32],
    };
    from_u8_to_u32(&payload[12..140], &mut indicator.motion);
    indicator
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_header_unpacks_fields() {
        // Distance block at 8x8 single target: idx 0xDF44, size 64, type 2.
        let bh = BlockHeader(0xDF44_0402);
        assert_eq!(bh.block_type(), 2);
        assert_eq!(bh.size(), 0x40);
        assert_eq!(bh.idx(), 0xDF44);
        assert_eq!(bh.payload_bytes(), 128);
    }

    #[test]
    fn block_header_size_patch_preserves_other_fields() {
        let bh = BlockHeader(0xDF44_0402).with_size(16);
        assert_eq!(bh.idx(), 0xDF44);
        assert_eq!(bh.block_type(), 2);
        assert_eq!(bh.size(), 16);
    }

    #[test]
    fn raw_size_payloads_ignore_element_width() {
        // Type 0 blocks carry their size directly (start/footer blocks).
        let bh = BlockHeader(0x0000_000D);
        assert_eq!(bh.payload_bytes(), 0);
        let metadata = BlockHeader(0x54B4_00C0);
        assert_eq!(metadata.block_type(), 0);
        assert_eq!(metadata.payload_bytes(), 0xC);
    }

    #[test]
    fn results_population_follows_enabled_outputs() {
        let results = ResultsData::for_outputs(
            RangingOutputs::DISTANCE_MM | RangingOutputs::TARGET_STATUS,
        );
        assert!(results.distance_mm.is_some());
        assert!(results.target_status.is_some());
        assert!(results.ambient_per_spad.is_none());
        assert!(results.motion_indicator.is_none());
    }

    #[test]
    fn motion_indicator_decodes_in_order() {
        let mut payload = [0u8; 140];
        payload[0..4].copy_from_slice(&7u32.to_le_bytes());
        payload[8] = 2;
        payload[9] = 3;
        payload[10] = 4;
        payload[12..16].copy_from_slice(&99u32.to_le_bytes());
        let indicator = decode_motion_indicator(&payload);
        assert_eq!(indicator.global_indicator_1, 7);
        assert_eq!(indicator.status, 2);
        assert_eq!(indicator.nb_of_detected_aggregates, 3);
        assert_eq!(indicator.nb_of_aggregates, 4);
        assert_eq!(indicator.motion[0], 99);
    }
}
