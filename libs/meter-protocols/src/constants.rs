//! Protocol constants shared by the decoders and the device layer

// ============================================================================
// Holdpeak (binary, nibble-framed)
// ============================================================================

/// Serial speed of the Holdpeak multimeter link
pub const HOLDPEAK_BAUD_RATE: u32 = 2400;

/// Length of a complete Holdpeak frame, markers included
pub const HOLDPEAK_FRAME_LEN: usize = 14;

/// Mask selecting the position tag carried in the high nibble of every byte
pub const NIBBLE_TAG_MASK: u8 = 0xF0;

/// High-nibble tag of the first byte of a frame
pub const FRAME_START_TAG: u8 = 0x10;

/// High-nibble tag of the last byte of a frame
pub const FRAME_END_TAG: u8 = 0xE0;

/// In-progress frames longer than this are discarded
pub const MAX_FRAME_BUFFER: usize = 64;

// ============================================================================
// Mason (ASCII, CR-delimited)
// ============================================================================

/// Serial speed of the Mason power-supply link
pub const MASON_BAUD_RATE: u32 = 9600;

/// Line delimiter
pub const LINE_DELIMITER: u8 = b'\r';

/// Acknowledgment line sent by the supply
pub const ACK_LINE: &[u8] = b"OK";

/// Length of a reading line (without delimiter)
pub const READING_LINE_LEN: usize = 9;

/// Pending line data longer than this without a delimiter is discarded
pub const MAX_LINE_BUFFER: usize = 256;

/// Poll request, sent once per scheduler tick
pub const CMD_GET_DATA: &[u8] = b"GETD\r";

/// Switch the supply output on
pub const CMD_OUTPUT_ON: &[u8] = b"SOUT0\r";

/// Switch the supply output off
pub const CMD_OUTPUT_OFF: &[u8] = b"SOUT1\r";
