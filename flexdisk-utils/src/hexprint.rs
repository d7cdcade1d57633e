use std::fmt::Write;

/// Nicely format the given bytes as a hex block. The listed addresses
/// will start from `start`.
pub fn hex_block(buf: &[u8], start: usize) -> String {
    // Each 16 bytes of input produces a line of a 10-character address,
    // the hex bytes, and an ASCII gutter.
    let mut str = String::with_capacity((buf.len() / 16 + 1) * 85);
    for (row, chunk) in buf.chunks(16).enumerate() {
        if row != 0 {
            str.push('\n');
        }
        // Address header.
        write!(str, "{:#010X}   ", start + row * 16).unwrap();
        // Two hex digits per byte, double-spaced after each 4 bytes.
        for (i, byte) in chunk.iter().enumerate() {
            str.push(' ');
            if i != 0 && i % 4 == 0 {
                str.push(' ');
            }
            write!(str, "{:02X}", byte).unwrap();
        }
        // Pad out a short final row so the gutters line up.
        for i in chunk.len()..16 {
            str.push_str("   ");
            if i != 0 && i % 4 == 0 {
                str.push(' ');
            }
        }
        // ASCII representation.
        str.push_str("  |");
        for byte in chunk {
            str.push(printable(*byte));
        }
        str.push('|');
    }
    str
}

fn printable(chr: u8) -> char {
    match chr {
        32..=126 => chr.into(),
        _ => '.',
    }
}
