//! Device Configuration Interface engine.
//!
//! Every firmware parameter lives behind a 16-bit DCI index and is moved
//! through the 4 KB command mailbox. Reads post a 12-byte request and poll
//! the mailbox status; writes stage a framed command (header, word-swapped
//! payload, footer) positioned so the frame ends at the top of the mailbox
//! window, then poll for acceptance. Payloads travel in 32-bit-word-swapped
//! order in both directions.

use crate::consts::{SCRATCH_BUFFER_SIZE, UI_CMD_END, UI_CMD_START, UI_CMD_STATUS};
use crate::utils::swap_words;
use crate::{Error, Vl53l5cx};

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
    /// Polls `address` until byte `pos` of a `size`-byte read, masked with
    /// `mask`, equals `expected`. Re-reads every 10 ms, giving up after
    /// 200 attempts.
    ///
    /// When at least four bytes are read, byte 2 carries the firmware
    /// status; a value of 0x7F or above means the command itself failed.
    pub(crate) async fn poll_for_answer(
        &mut self,
        size: usize,
        pos: usize,
        address: u16,
        mask: u8,
        expected: u8,
    ) -> Result<(), Error<E>> {
        let mut attempts = 0;
        loop {
            self.read_to_temp(address, size).await?;
            if size >= 4 && self.temp_buffer[2] >= 0x7F {
                warn!("mailbox status {:#x}", self.temp_buffer[2]);
                return Err(Error::Mcu);
            }
            if self.temp_buffer[pos] & mask == expected {
                return Ok(());
            }
            attempts += 1;
            if attempts >= 200 {
                warn!("poll for answer at {:#x} timed out", address);
                return Err(Error::Timeout);
            }
            self.delay.delay_ms(10).await;
        }
    }

    /// Waits for the MCU to finish booting after a reset, by watching the
    /// boot state registers. Gives up after 500 attempts at 1 ms apart.
    pub(crate) async fn poll_for_mcu_boot(&mut self) -> Result<(), Error<E>> {
        let mut attempts: u16 = 0;
        loop {
            let go2_status0 = self.read_byte(0x06u16).await?;
            if go2_status0 & 0x80 != 0 {
                let go2_status1 = self.read_byte(0x07u16).await?;
                if go2_status1 & 0x01 != 0 {
                    return Ok(());
                }
            }
            if go2_status0 & 0x01 != 0 {
                return Ok(());
            }
            attempts += 1;
            if attempts >= 500 {
                warn!("MCU boot poll timed out");
                return Err(Error::Timeout);
            }
            self.delay.delay_ms(1).await;
        }
    }

    /// Reads `size` bytes of the DCI parameter at `index` into the caller's
    /// buffer.
    ///
    /// # Errors
    ///
    /// * `Err(Error::BufferTooSmall)` - `data` is shorter than `size`, or
    ///   `size` exceeds the internal scratch buffer; nothing is sent
    /// * `Err(Error::Timeout)` / `Err(Error::Mcu)` - the mailbox poll failed
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn dci_read_data(
        &mut self,
        data: &mut [u8],
        index: u16,
        size: usize,
    ) -> Result<(), Error<E>> {
        if data.len() < size {
            return Err(Error::BufferTooSmall);
        }
        self.dci_read_to_temp(index, size).await?;
        data[..size].copy_from_slice(&self.temp_buffer[..size]);
        Ok(())
    }

    /// Writes `data` to the DCI parameter at `index`.
    ///
    /// # Errors
    ///
    /// * `Err(Error::BufferTooSmall)` - the framed command exceeds the
    ///   internal scratch buffer; nothing is sent
    /// * `Err(Error::Timeout)` / `Err(Error::Mcu)` - the mailbox poll failed
    /// * `Err(Error::I2cError(E))` - if there was an I2C communication error
    pub async fn dci_write_data(&mut self, data: &[u8], index: u16) -> Result<(), Error<E>> {
        let size = data.len();
        if size + 12 > SCRATCH_BUFFER_SIZE {
            return Err(Error::BufferTooSmall);
        }
        self.temp_buffer[4..4 + size].copy_from_slice(data);
        self.dci_write_from_temp_framed(index, size).await
    }

    /// Reads `size` bytes, patches `new_data` in at `pos`, and writes the
    /// whole parameter back.
    ///
    /// # Errors
    ///
    /// Same as [`dci_read_data`](Self::dci_read_data) and
    /// [`dci_write_data`](Self::dci_write_data); additionally
    /// `Err(Error::InvalidArgument)` if the patch does not fit inside the
    /// parameter.
    pub async fn dci_replace_data(
        &mut self,
        index: u16,
        size: usize,
        new_data: &[u8],
        pos: usize,
    ) -> Result<(), Error<E>> {
        if pos + new_data.len() > size {
            return Err(Error::InvalidArgument);
        }
        self.dci_read_to_temp(index, size).await?;
        self.temp_buffer[pos..pos + new_data.len()].copy_from_slice(new_data);
        self.dci_write_from_temp(index, size).await
    }

    /// Reads a DCI parameter into the scratch buffer, host byte order.
    pub(crate) async fn dci_read_to_temp(&mut self, index: u16, size: usize) -> Result<(), Error<E>> {
        if size + 12 > SCRATCH_BUFFER_SIZE {
            return Err(Error::BufferTooSmall);
        }

        // Post the 12-byte read request at the top of the mailbox.
        let size12 = size as u16;
        let cmd = [
            (index >> 8) as u8,
            (index & 0xFF) as u8,
            ((size12 & 0xFF0) >> 4) as u8,
            ((size12 & 0x0F) << 4) as u8,
            0x00,
            0x00,
            0x00,
            0x0F,
            0x00,
            0x02,
            0x00,
            0x08,
        ];
        self.write_multi(UI_CMD_END - 11, &cmd).await?;
        self.poll_for_answer(4, 1, UI_CMD_STATUS, 0xFF, 0x03).await?;

        // The answer lands at the bottom of the mailbox, in firmware order,
        // framed like the request: 4-byte header, payload, 8-byte footer.
        self.read_to_temp(UI_CMD_START, size + 12).await?;
        swap_words(&mut self.temp_buffer, size + 12);
        self.temp_buffer.copy_within(4..4 + size, 0);
        Ok(())
    }

    /// Writes the first `size` bytes of the scratch buffer to the DCI
    /// parameter at `index`. The payload is framed in place, so the buffer
    /// contents past `size + 12` are preserved.
    pub(crate) async fn dci_write_from_temp(
        &mut self,
        index: u16,
        size: usize,
    ) -> Result<(), Error<E>> {
        if size + 12 > SCRATCH_BUFFER_SIZE {
            return Err(Error::BufferTooSmall);
        }
        // Make room for the 4-byte header.
        self.temp_buffer.copy_within(..size, 4);
        self.dci_write_from_temp_framed(index, size).await
    }

    /// Frames and sends a write command whose payload already sits at
    /// `temp_buffer[4..4 + size]` in host order.
    async fn dci_write_from_temp_framed(&mut self, index: u16, size: usize) -> Result<(), Error<E>> {
        let size12 = size as u16;
        let address = UI_CMD_END as usize - (size + 12) + 1;

        self.temp_buffer[0] = (index >> 8) as u8;
        self.temp_buffer[1] = (index & 0xFF) as u8;
        self.temp_buffer[2] = ((size12 & 0xFF0) >> 4) as u8;
        self.temp_buffer[3] = ((size12 & 0x0F) << 4) as u8;

        swap_words(&mut self.temp_buffer[4..], size);

        let tail = size12 + 8;
        let footer = [
            0x00,
            0x00,
            0x00,
            0x0F,
            0x05,
            0x01,
            (tail >> 8) as u8,
            (tail & 0xFF) as u8,
        ];
        self.temp_buffer[4 + size..4 + size + 8].copy_from_slice(&footer);

        self.write_from_temp(address as u16, size + 12).await?;
        self.poll_for_answer(4, 1, UI_CMD_STATUS, 0xFF, 0x03).await
    }
}
