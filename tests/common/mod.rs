//! Scripted VL53L5CX stand-in for integration tests.
//!
//! Implements [`embedded_hal::i2c::I2c`] and models just enough of the
//! device to drive the public API end to end: the page-selected register
//! file, the boot handshakes, the firmware download pages, the command
//! mailbox (read requests, framed writes, calibration blocks, the NVM
//! script) and ranging frame generation from the configured output list.

use std::collections::HashMap;
use std::convert::Infallible;

use embedded_hal::i2c::{ErrorType, I2c, Operation};

const PAGE_SELECT: u16 = 0x7FFF;
const MAILBOX_END: usize = 0x3000;

/// Sequence id the fake stamps into generated frame headers and footers.
const FRAME_ID: [u8; 2] = [0xAB, 0xCD];

pub struct FakeSensor {
    /// Raw register file for pages 0 and 1.
    pub regs: [u8; 0x8000],
    /// Page 2 result memory: frame window at 0, mailbox at 0x2C00.
    pub mbox: [u8; MAILBOX_END],
    /// Parameter store behind the mailbox, host byte order.
    pub dci: HashMap<u16, Vec<u8>>,
    /// Factory NVM block served through the scripted mailbox command.
    pub nvm: Vec<u8>,
    /// Bytes received on each firmware download page.
    pub fw_pages: [usize; 3],
    page: u8,
    address: u8,
    /// Total I2C transactions seen.
    pub transactions: usize,
    /// Ranging session active.
    pub ranging: bool,
    /// Frame size to report instead of the one the host configured.
    pub negotiated_override: Option<u16>,
    /// Generate frames whose header and footer ids disagree.
    pub corrupt_frames: bool,
    /// Never raise the firmware-download handshake bit.
    pub fail_fw_handshake: bool,
    /// Status recorded when an MCU stop is provoked.
    pub stop_status: u8,
    /// Emit a targets-detected block whose header also claims the footer
    /// bytes as payload.
    pub overclaim_detected_block: bool,
    /// Emit a motion block whose header declares one byte less than the
    /// block really occupies.
    pub shrink_motion_block: bool,
}

impl FakeSensor {
    pub fn new() -> Self {
        let mut regs = [0u8; 0x8000];
        regs[0x00] = 0xF0; // device id
        regs[0x01] = 0x02; // revision id
        regs[0x06] = 0x01; // booted
        regs[0x07] = 0x01;
        regs[0x09] = 0x04; // powered
        regs[0x21] = 0x04; // firmware access granted

        let mut mbox = [0u8; MAILBOX_END];
        // Mailbox status: commands always complete immediately.
        mbox[0x2C00..0x2C04].copy_from_slice(&[0x02, 0x03, 0x00, 0x00]);

        let mut dci = HashMap::new();
        // Power-on defaults.
        dci.insert(0x5450u16, vec![4, 4, 0, 0, 8, 8, 0, 0]); // zone config, 4x4
        dci.insert(0x5458u16, vec![0, 15, 0, 0]); // 15 Hz
        let mut int_time = vec![0u8; 20];
        int_time[..4].copy_from_slice(&5000u32.to_le_bytes()); // 5 ms
        dci.insert(0x545Cu16, int_time);
        dci.insert(0x5478u16, vec![0; 16]); // fw target count block
        dci.insert(0xAD30u16, vec![0, 1, 0, 3, 0, 0, 0, 0]); // continuous
        dci.insert(0xAD38u16, vec![0; 16]); // dss config
        dci.insert(0xAE64u16, vec![2, 0, 0, 0]); // strongest first
        dci.insert(0xAED8u16, vec![0; 16]); // sharpener off

        Self {
            regs,
            mbox,
            dci,
            nvm: vec![0u8; 492],
            fw_pages: [0; 3],
            page: 0,
            address: 0x29,
            transactions: 0,
            ranging: false,
            negotiated_override: None,
            corrupt_frames: false,
            fail_fw_handshake: false,
            stop_status: 0x84,
            overclaim_detected_block: false,
            shrink_motion_block: false,
        }
    }

    fn handle_write(&mut self, reg: u16, data: &[u8]) {
        if reg == PAGE_SELECT {
            self.page = data[0];
            return;
        }
        match self.page {
            0x09..=0x0B => {
                self.fw_pages[usize::from(self.page) - 9] += data.len();
            }
            0x00 | 0x01 => {
                let reg = usize::from(reg);
                self.regs[reg..reg + data.len()].copy_from_slice(data);
                if self.page == 0 && reg == 0x04 {
                    self.address = data[0] >> 1;
                }
                // Provoking an MCU stop raises the stop-done bit and
                // records the stop status.
                if self.page == 0 && reg == 0x14 && data[0] == 0x01 {
                    self.regs[0x06] |= 0x80;
                    self.regs[0x07] = self.stop_status;
                }
                // Acknowledge the firmware download check.
                if self.page == 1 && reg == 0x06 && data[0] == 0x03 && !self.fail_fw_handshake {
                    self.regs[0x21] |= 0x10;
                }
            }
            _ => {
                let reg = usize::from(reg);
                self.mbox[reg..reg + data.len()].copy_from_slice(data);
                // Commands take effect once the write reaches the top of
                // the mailbox window.
                if reg + data.len() == MAILBOX_END {
                    self.process_mailbox();
                }
            }
        }
    }

    fn handle_read(&mut self, reg: u16, buf: &mut [u8]) {
        if reg == PAGE_SELECT {
            buf[0] = self.page;
            return;
        }
        let reg = usize::from(reg);
        match self.page {
            0x00 | 0x01 => buf.copy_from_slice(&self.regs[reg..reg + buf.len()]),
            _ => buf.copy_from_slice(&self.mbox[reg..reg + buf.len()]),
        }
    }

    fn process_mailbox(&mut self) {
        // The scripted NVM read: fixed signature, answered with the raw
        // factory block at the bottom of the mailbox.
        if self.mbox[0x2FD8..0x2FDC] == [0x00, 0x02, 0x00, 0x08]
            && self.mbox[0x2FFE..0x3000] == [0x01, 0xEC]
            && self.mbox[0x2FFD] == 0x00
        {
            let nvm = self.nvm.clone();
            self.mbox[0x2C04..0x2C04 + nvm.len()].copy_from_slice(&nvm);
            self.mbox[0x2FD8..0x3000].fill(0);
            return;
        }
        match self.mbox[0x2FFD] {
            // Parameter read request.
            0x02 if self.mbox[0x2FFF] == 0x08 => {
                let index = u16::from_be_bytes([self.mbox[0x2FF4], self.mbox[0x2FF5]]);
                let size =
                    (usize::from(self.mbox[0x2FF6]) << 4) | (usize::from(self.mbox[0x2FF7]) >> 4);
                self.serve_dci_read(index, size);
            }
            // Framed write: 0x05 marks a parameter frame, 0x03 a
            // calibration block (absorbed, acknowledged by the status).
            0x01 => {
                if self.mbox[0x2FFC] == 0x05 {
                    let tail =
                        usize::from(u16::from_be_bytes([self.mbox[0x2FFE], self.mbox[0x2FFF]]));
                    let size = tail - 8;
                    let start = MAILBOX_END - (size + 12);
                    let index = u16::from_be_bytes([self.mbox[start], self.mbox[start + 1]]);
                    let mut payload = self.mbox[start + 4..start + 4 + size].to_vec();
                    swap_words(&mut payload);
                    self.dci.insert(index, payload);
                }
            }
            // Ranging start command.
            0x03 => {
                self.ranging = true;
                self.generate_frame();
            }
            _ => {}
        }
    }

    fn serve_dci_read(&mut self, index: u16, size: usize) {
        let mut payload = vec![0u8; size];
        if index == 0x5440 {
            // Frame-size negotiation readback.
            let negotiated = self
                .negotiated_override
                .unwrap_or_else(|| self.configured_frame_size());
            payload[8..10].copy_from_slice(&negotiated.to_le_bytes());
        } else if let Some(value) = self.dci.get(&index) {
            let n = size.min(value.len());
            payload[..n].copy_from_slice(&value[..n]);
        }
        // Answers are framed like requests: header, payload, footer.
        let mut host = vec![0u8; size + 12];
        host[4..4 + size].copy_from_slice(&payload);
        swap_words(&mut host);
        self.mbox[0x2C04..0x2C04 + host.len()].copy_from_slice(&host);
    }

    /// Frame size implied by the output list and enable mask the host
    /// pushed, matching the firmware's own accounting.
    fn configured_frame_size(&self) -> u16 {
        let mut total = 24u32;
        for (slot, bh) in self.output_list().into_iter().enumerate() {
            if bh == 0 || self.output_enables() & (1 << slot) == 0 {
                continue;
            }
            total += 4 + payload_bytes(bh);
        }
        total as u16
    }

    fn output_list(&self) -> [u32; 12] {
        let mut list = [0u32; 12];
        if let Some(raw) = self.dci.get(&0xD980) {
            for (value, chunk) in list.iter_mut().zip(raw.chunks_exact(4)) {
                *value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            }
        }
        list
    }

    fn output_enables(&self) -> u32 {
        self.dci
            .get(&0xD970)
            .map_or(0, |raw| u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// Builds one ranging frame from the configured output list and stores
    /// it, wire order, at the bottom of the result window.
    fn generate_frame(&mut self) {
        let mut frame = Vec::new();

        // Fixed header; the first word reads, pre-swap, as the data-ready
        // pattern with stream counter 1.
        frame.extend_from_slice(&[0x10, 0x05, 0x05, 0x01]);
        frame.extend_from_slice(&[0; 4]);
        frame.extend_from_slice(&FRAME_ID);
        frame.extend_from_slice(&[0; 6]);

        for (slot, bh) in self.output_list().into_iter().enumerate() {
            if bh == 0 || self.output_enables() & (1 << slot) == 0 {
                continue;
            }
            let size = payload_bytes(bh) as usize;
            let idx = (bh >> 16) as u16;
            let mut wire_bh = bh;
            if self.overclaim_detected_block && (idx == 0xDB84 || idx == 0x57D0) {
                // Claim the trailing footer bytes as payload too.
                wire_bh += 8 << 4;
            }
            if self.shrink_motion_block && (idx == 0xD858 || idx == 0xCC50) {
                wire_bh -= 1 << 4;
            }
            frame.extend_from_slice(&wire_bh.to_le_bytes());
            let mut payload = vec![0u8; size];
            match idx {
                // Metadata: silicon temperature.
                0x54B4 => payload[8] = 25,
                // Targets detected: one per zone, none in zone 3.
                0xDB84 | 0x57D0 => {
                    payload.fill(1);
                    payload[3] = 0;
                }
                // Distance: raw 400 (100 mm after scaling).
                0xDF44 | 0x6690 => {
                    for chunk in payload.chunks_exact_mut(2) {
                        chunk.copy_from_slice(&400i16.to_le_bytes());
                    }
                }
                // Target status: all valid.
                0xE084 | 0x6B90 => payload.fill(5),
                _ => {}
            }
            frame.extend_from_slice(&payload);
        }

        // Footer block: unknown index, carries the sequence id again.
        frame.extend_from_slice(&0xFFFF_0040u32.to_le_bytes());
        if self.corrupt_frames {
            frame.extend_from_slice(&[0x00, 0x00]);
        } else {
            frame.extend_from_slice(&FRAME_ID);
        }
        frame.extend_from_slice(&[0; 2]);

        swap_words(&mut frame);
        self.mbox[..frame.len()].copy_from_slice(&frame);
    }
}

/// Payload bytes that follow a block header on the wire.
fn payload_bytes(bh: u32) -> u32 {
    let block_type = bh & 0xF;
    let size = (bh >> 4) & 0xFFF;
    if (1..13).contains(&block_type) {
        block_type * size
    } else {
        size
    }
}

/// 32-bit word swap between host and firmware byte order.
pub fn swap_words(buf: &mut [u8]) {
    for chunk in buf.chunks_exact_mut(4) {
        chunk.reverse();
    }
}

impl ErrorType for FakeSensor {
    type Error = Infallible;
}

impl I2c for FakeSensor {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Infallible> {
        assert_eq!(address, self.address, "transaction on unexpected address");
        self.transactions += 1;
        let mut reg = 0u16;
        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    reg = u16::from_be_bytes([bytes[0], bytes[1]]);
                    if bytes.len() > 2 {
                        self.handle_write(reg, &bytes[2..]);
                    }
                }
                Operation::Read(buf) => self.handle_read(reg, buf),
            }
        }
        Ok(())
    }
}
