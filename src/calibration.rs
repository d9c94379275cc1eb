//! Calibration propagation.
//!
//! The factory offset block (read from NVM at boot) and the crosstalk
//! block both embed 8x8 correction grids. When the sensor runs at 4x4,
//! each grid is resampled by averaging 2x2 neighbourhoods before the
//! block is staged into the mailbox; at 8x8 the blocks are sent as
//! captured. The blocks live at fixed mailbox addresses outside the DCI
//! framing.

use crate::consts::{OFFSET_CAL_ADDRESS, UI_CMD_STATUS, XTALK_CAL_ADDRESS};
use crate::utils::{from_i16_to_u8, from_u32_to_u8, from_u8_to_i16, from_u8_to_u32, swap_words};
use crate::{Error, Resolution, Vl53l5cx};

#[cfg(not(feature = "async"))]
use embedded_hal::{delay::DelayNs, i2c::I2c};
#[cfg(feature = "async")]
use embedded_hal_async::{delay::DelayNs, i2c::I2c};

/// Averages an 8x8 grid down to 4x4 in place. Each output cell is the
/// truncating mean of the 2x2 input neighbourhood; cells 16..64 are
/// zeroed.
fn downsample_grid_u32(grid: &mut [u32; 64]) {
    for row in 0..4 {
        for col in 0..4 {
            let base = row * 16 + col * 2;
            let sum = u64::from(grid[base])
                + u64::from(grid[base + 1])
                + u64::from(grid[base + 8])
                + u64::from(grid[base + 9]);
            grid[row * 4 + col] = (sum / 4) as u32;
        }
    }
    grid[16..].fill(0);
}

/// Same resampling for signed 16-bit grids.
fn downsample_grid_i16(grid: &mut [i16; 64]) {
    for row in 0..4 {
        for col in 0..4 {
            let base = row * 16 + col * 2;
            let sum = i32::from(grid[base])
                + i32::from(grid[base + 1])
                + i32::from(grid[base + 8])
                + i32::from(grid[base + 9]);
            grid[row * 4 + col] = (sum / 4) as i16;
        }
    }
    grid[16..].fill(0);
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
    /// Stages the offset calibration block for `resolution` and writes it
    /// to the mailbox.
    pub(crate) async fn send_offset_data(
        &mut self,
        resolution: Resolution,
    ) -> Result<(), Error<E>> {
        let size = self.offset_data.len();
        self.temp_buffer[..size].copy_from_slice(&self.offset_data);

        if resolution == Resolution::Res4x4 {
            // Select the 4x4 DSS profile and resample both grids.
            let dss_4x4 = [0x0F, 0x04, 0x04, 0x00, 0x08, 0x10, 0x10, 0x07];
            self.temp_buffer[0x10..0x18].copy_from_slice(&dss_4x4);
            swap_words(&mut self.temp_buffer, size);

            let mut signal_grid = [0u32; 64];
            let mut range_grid = [0i16; 64];
            from_u8_to_u32(&self.temp_buffer[0x3C..0x3C + 256], &mut signal_grid);
            from_u8_to_i16(&self.temp_buffer[0x140..0x140 + 128], &mut range_grid);
            downsample_grid_u32(&mut signal_grid);
            downsample_grid_i16(&mut range_grid);
            from_u32_to_u8(&signal_grid, &mut self.temp_buffer[0x3C..0x3C + 256]);
            from_i16_to_u8(&range_grid, &mut self.temp_buffer[0x140..0x140 + 128]);

            swap_words(&mut self.temp_buffer, size);
        }

        // Trailing command marker expected by the firmware.
        self.temp_buffer.copy_within(8..size, 0);
        let footer = [0x00, 0x00, 0x00, 0x0F, 0x03, 0x01, 0x01, 0xE4];
        self.temp_buffer[0x1E0..0x1E8].copy_from_slice(&footer);

        self.write_from_temp(OFFSET_CAL_ADDRESS, size).await?;
        self.poll_for_answer(4, 1, UI_CMD_STATUS, 0xFF, 0x03).await
    }

    /// Stages the crosstalk calibration block for `resolution` and writes
    /// it to the mailbox.
    pub(crate) async fn send_xtalk_data(&mut self, resolution: Resolution) -> Result<(), Error<E>> {
        let size = self.xtalk_data.len();
        self.temp_buffer[..size].copy_from_slice(&self.xtalk_data);

        if resolution == Resolution::Res4x4 {
            // Select the 4x4 sampling profile and resample the grid.
            let res_4x4 = [0x0F, 0x04, 0x04, 0x17, 0x08, 0x10, 0x10, 0x07];
            let dss_4x4 = [0x00, 0x78, 0x00, 0x08, 0x00, 0x00, 0x00, 0x08];
            let profile_4x4 = [0xA0, 0xFC, 0x01, 0x00];
            self.temp_buffer[0x8..0x10].copy_from_slice(&res_4x4);
            self.temp_buffer[0x20..0x28].copy_from_slice(&dss_4x4);
            swap_words(&mut self.temp_buffer, size);

            let mut signal_grid = [0u32; 64];
            from_u8_to_u32(&self.temp_buffer[0x34..0x34 + 256], &mut signal_grid);
            downsample_grid_u32(&mut signal_grid);
            from_u32_to_u8(&signal_grid, &mut self.temp_buffer[0x34..0x34 + 256]);

            swap_words(&mut self.temp_buffer, size);
            self.temp_buffer[0x134..0x138].copy_from_slice(&profile_4x4);
        }

        self.write_from_temp(XTALK_CAL_ADDRESS, size).await?;
        self.poll_for_answer(4, 1, UI_CMD_STATUS, 0xFF, 0x03).await
    }
}
