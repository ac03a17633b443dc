//! Hex rendering for raw-data debug logs

use std::fmt::Write;

/// Encode bytes as space-separated uppercase hex
/// Example: [0x47, 0x45, 0x0D] -> "47 45 0D"
pub fn encode_upper(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            result.push(' ');
        }
        // Writing to a String cannot fail
        let _ = write!(&mut result, "{:02X}", byte);
    }
    result
}
