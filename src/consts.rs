//! Register map, DCI indices and wire-format constants for the VL53L5CX.
//!
//! The sensor exposes two address spaces: a handful of plain byte registers
//! used during boot and power management, and the DCI (Device Configuration
//! Interface) index space reached through the 4 KB command mailbox at
//! `UI_CMD_START..=UI_CMD_END`.

/// Default 7-bit I2C address of the VL53L5CX (0x52 in 8-bit notation).
pub const DEFAULT_I2C_ADDRESS: u8 = 0x29;

/// Expected device identification byte.
pub(crate) const DEVICE_ID: u8 = 0xF0;
/// Expected silicon revision byte.
pub(crate) const REVISION_ID: u8 = 0x02;

/// Page-select register. Every raw register access happens under a page.
pub(crate) const REG_PAGE_SELECT: u16 = 0x7FFF;

/// Number of zones in the largest ranging grid.
pub const MAX_ZONES: usize = 64;
/// Highest supported number of targets per zone.
pub const MAX_TARGETS_PER_ZONE: usize = 4;
/// Length of the per-target result arrays (worst case).
pub const MAX_TARGET_RESULTS: usize = MAX_ZONES * MAX_TARGETS_PER_ZONE;

/// Size of the factory NVM block read at boot.
pub(crate) const NVM_DATA_SIZE: usize = 492;
/// Size of the offset calibration blob (leading sub-region of the NVM block).
pub(crate) const OFFSET_BUFFER_SIZE: usize = 488;
/// Size of the crosstalk calibration blob.
pub(crate) const XTALK_BUFFER_SIZE: usize = 776;

/// Worst-case ranging frame: fixed headers and footer plus every output
/// enabled at 8x8 with [`MAX_TARGETS_PER_ZONE`] targets.
pub(crate) const MAX_RESULTS_SIZE: usize = 40
    + 260 // ambient per spad
    + 260 // spad count
    + 68 // targets detected
    + (256 * MAX_TARGETS_PER_ZONE + 4) // signal per spad
    + (128 * MAX_TARGETS_PER_ZONE + 4) // range sigma
    + (128 * MAX_TARGETS_PER_ZONE + 4) // distance
    + (64 * MAX_TARGETS_PER_ZONE + 4) // reflectance
    + (64 * MAX_TARGETS_PER_ZONE + 4) // target status
    + 144 // motion indicator
    + 20; // footer

/// Size of the per-device scratch buffer. The DCI engine needs at least
/// 1024 bytes; the frame decoder needs room for the largest enabled frame.
pub(crate) const SCRATCH_BUFFER_SIZE: usize = if MAX_RESULTS_SIZE < 1024 {
    1024
} else {
    MAX_RESULTS_SIZE
};

/// Largest single I2C transfer issued by the driver, including the two
/// address bytes on writes.
pub(crate) const I2C_CHUNK_SIZE: usize = 256;

/* Command mailbox window. */
pub(crate) const UI_CMD_STATUS: u16 = 0x2C00;
pub(crate) const UI_CMD_START: u16 = 0x2C04;
pub(crate) const UI_CMD_END: u16 = 0x2FFF;

/* Mailbox offsets outside the DCI framing used by the boot sequence. */
pub(crate) const NVM_CMD_ADDRESS: u16 = 0x2FD8;
pub(crate) const OFFSET_CAL_ADDRESS: u16 = 0x2E18;
pub(crate) const XTALK_CAL_ADDRESS: u16 = 0x2CF8;
pub(crate) const DEFAULT_CONFIG_ADDRESS: u16 = 0x2C34;

/* DCI indices. */
pub(crate) const DCI_ZONE_CONFIG: u16 = 0x5450;
pub(crate) const DCI_FREQ_HZ: u16 = 0x5458;
pub(crate) const DCI_INT_TIME: u16 = 0x545C;
pub(crate) const DCI_FW_NB_TARGET: u16 = 0x5478;
pub(crate) const DCI_RANGING_MODE: u16 = 0xAD30;
pub(crate) const DCI_DSS_CONFIG: u16 = 0xAD38;
pub(crate) const DCI_TARGET_ORDER: u16 = 0xAE64;
pub(crate) const DCI_SHARPENER: u16 = 0xAED8;
pub(crate) const DCI_SINGLE_RANGE: u16 = 0xD964;
pub(crate) const DCI_OUTPUT_CONFIG: u16 = 0xD968;
pub(crate) const DCI_OUTPUT_ENABLES: u16 = 0xD970;
pub(crate) const DCI_OUTPUT_LIST: u16 = 0xD980;
pub(crate) const DCI_PIPE_CONTROL: u16 = 0xDB80;
/// Readback index holding the frame size the firmware negotiated.
pub(crate) const DCI_UI_RANGE_DATA: u16 = 0x5440;

/// Block indices in `PER_ZONE_IDX_FIRST..PER_ZONE_IDX_FIRST + PER_ZONE_IDX_SPAN`
/// carry one element per zone regardless of the targets-per-zone setting.
pub(crate) const PER_ZONE_IDX_FIRST: u32 = 0x54D0;
pub(crate) const PER_ZONE_IDX_SPAN: u32 = 960;

/// Block index of the metadata item (carries the silicon temperature).
pub(crate) const METADATA_IDX: u32 = 0x54B4;

/// Per-output block indices. The firmware publishes results under different
/// indices depending on whether it runs with one target per zone or several,
/// so the driver selects a table at runtime.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockIndexes {
    pub ambient_per_spad: u32,
    pub spad_count: u32,
    pub nb_target_detected: u32,
    pub signal_per_spad: u32,
    pub range_sigma_mm: u32,
    pub distance_mm: u32,
    pub reflectance: u32,
    pub target_status: u32,
    pub motion_indicator: u32,
}

pub(crate) const BLOCK_IDX_SINGLE_TARGET: BlockIndexes = BlockIndexes {
    ambient_per_spad: 0x54D0,
    spad_count: 0x55D0,
    nb_target_detected: 0xDB84,
    signal_per_spad: 0xDBC4,
    range_sigma_mm: 0xDEC4,
    distance_mm: 0xDF44,
    reflectance: 0xE044,
    target_status: 0xE084,
    motion_indicator: 0xD858,
};

pub(crate) const BLOCK_IDX_MULTI_TARGET: BlockIndexes = BlockIndexes {
    ambient_per_spad: 0x54D0,
    spad_count: 0x55D0,
    nb_target_detected: 0x57D0,
    signal_per_spad: 0x5890,
    range_sigma_mm: 0x6490,
    distance_mm: 0x6690,
    reflectance: 0x6A90,
    target_status: 0x6B90,
    motion_indicator: 0xCC50,
};

/// Output-list templates in wire order. Entry `i` is enabled by bit `i` of
/// the output-enable words; the first three entries (start, metadata,
/// common data) are always on.
pub(crate) const OUTPUT_TEMPLATES_SINGLE_TARGET: [u32; 12] = [
    0x0000_000D, // start
    0x54B4_00C0, // metadata
    0x54C0_0040, // common data
    0x54D0_0104, // ambient per spad
    0x55D0_0404, // spad count
    0xDB84_0401, // targets detected
    0xDBC4_0404, // signal per spad
    0xDEC4_0402, // range sigma
    0xDF44_0402, // distance
    0xE044_0401, // reflectance
    0xE084_0401, // target status
    0xD858_08C0, // motion indicator
];

pub(crate) const OUTPUT_TEMPLATES_MULTI_TARGET: [u32; 12] = [
    0x0000_000D,
    0x54B4_00C0,
    0x54C0_0040,
    0x54D0_0104,
    0x55D0_0404,
    0x57D0_0401,
    0x5890_0404,
    0x6490_0402,
    0x6690_0402,
    0x6A90_0401,
    0x6B90_0401,
    0xCC50_08C0,
];

/// Ranging grid resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Resolution {
    /// 4x4 grid, 16 zones, ranging frequency up to 60 Hz.
    Res4x4,
    /// 8x8 grid, 64 zones, ranging frequency up to 15 Hz.
    Res8x8,
}

impl Resolution {
    /// Number of zones in the grid.
    #[must_use]
    pub fn zone_count(self) -> u8 {
        match self {
            Resolution::Res4x4 => 16,
            Resolution::Res8x8 => 64,
        }
    }

    pub(crate) fn from_zone_count(zones: u16) -> Option<Self> {
        match zones {
            16 => Some(Resolution::Res4x4),
            64 => Some(Resolution::Res8x8),
            _ => None,
        }
    }
}

/// Order in which targets within a zone are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TargetOrder {
    /// Closest target first.
    Closest,
    /// Strongest return first (power-on default).
    Strongest,
}

impl From<TargetOrder> for u8 {
    fn from(order: TargetOrder) -> Self {
        match order {
            TargetOrder::Closest => 1,
            TargetOrder::Strongest => 2,
        }
    }
}

impl TargetOrder {
    pub(crate) fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(TargetOrder::Closest),
            2 => Some(TargetOrder::Strongest),
            _ => None,
        }
    }
}

/// Ranging scheduling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RangingMode {
    /// Back-to-back ranging at the maximum integration time.
    Continuous,
    /// Timed ranging honouring the configured integration time.
    Autonomous,
}

/// Device power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerMode {
    /// Low-power retention mode; firmware and configuration are kept.
    Sleep,
    /// Fully powered (power-on default).
    Wakeup,
}
