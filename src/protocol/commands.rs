//! # Martel Printer Commands
//!
//! This module implements the escape-sequence command set of Martel MPP
//! and MCP thermal printers.
//!
//! ## Escape Sequence Structure
//!
//! Every command is the escape byte followed by a one-byte opcode and, for
//! some commands, a single parameter byte:
//!
//! | Command | Bytes |
//! |---------|-------|
//! | Reset | `ESC @` |
//! | Select font n | `ESC ! n` |
//! | Feed forward n dotlines | `ESC J n` |
//! | Feed backward n dotlines | `ESC j n` |
//! | Raster band start | `ESC Z` |
//!
//! The builders return the exact byte sequences; transmission is the
//! caller's business via [`Port::write`](crate::port::Port::write).

// ============================================================================
// CONTROL CODE CONSTANTS
// ============================================================================

/// ESC (Escape) - command prefix byte.
pub const ESC: u8 = 0x1B;

/// GS (Group Separator) - extended command prefix.
pub const GS: u8 = 0x1D;

/// LF (Line Feed) - print and advance; also closes a raster band.
pub const LF: u8 = 0x0A;

/// The full ASCII control-code table, usable by name.
///
/// The text filter's `<TAB>`/`<ESC>`-style tags resolve against these
/// names; see [`crate::text`].
pub const CONTROL_CODES: [(&str, u8); 32] = [
    ("NUL", 0),
    ("SOH", 1),
    ("STX", 2),
    ("ETX", 3),
    ("EOT", 4),
    ("ENQ", 5),
    ("ACK", 6),
    ("BEL", 7),
    ("BS", 8),
    ("TAB", 9),
    ("LF", 10),
    ("VT", 11),
    ("FF", 12),
    ("CR", 13),
    ("SO", 14),
    ("SI", 15),
    ("DLE", 16),
    ("DC1", 17),
    ("DC2", 18),
    ("DC3", 19),
    ("DC4", 20),
    ("NAK", 21),
    ("SYN", 22),
    ("ETB", 23),
    ("CAN", 24),
    ("EM", 25),
    ("SUB", 26),
    ("ESC", 27),
    ("FS", 28),
    ("GS", 29),
    ("RS", 30),
    ("US", 31),
];

// ============================================================================
// PRINTER COMMANDS
// ============================================================================

/// # Reset Printer (ESC @)
///
/// Returns the printer to its power-on state: the line buffer is cleared
/// and font and feed settings revert to their defaults.
#[inline]
pub fn reset() -> Vec<u8> {
    vec![ESC, b'@']
}

/// # Select Font (ESC ! n)
///
/// Selects one of the three built-in fonts. The parameter is taken modulo
/// 3, matching the printer's own wrap-around of out-of-range values.
#[inline]
pub fn select_font(n: u8) -> Vec<u8> {
    vec![ESC, b'!', n % 3]
}

/// # Feed Paper Forward (ESC J n)
///
/// Advances the paper by `n` dotlines without printing. Used at the end
/// of a ticket to push the printed area past the tear bar.
#[inline]
pub fn feed_forward(dotlines: u8) -> Vec<u8> {
    vec![ESC, b'J', dotlines]
}

/// # Feed Paper Backward (ESC j n)
///
/// Retracts the paper by `n` dotlines. Paired with a forward feed this
/// avoids the blank gap between tickets.
#[inline]
pub fn feed_backward(dotlines: u8) -> Vec<u8> {
    vec![ESC, b'j', dotlines]
}

/// # Raster Band Start (ESC Z)
///
/// Opens a 24-row run-length-encoded graphics band. The band body and its
/// terminator are produced by the [`raster`](crate::raster) encoder.
#[inline]
pub fn band_start() -> Vec<u8> {
    vec![ESC, b'Z']
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset() {
        assert_eq!(reset(), vec![0x1B, 0x40]);
    }

    #[test]
    fn test_select_font_wraps_modulo_three() {
        assert_eq!(select_font(0), vec![0x1B, 0x21, 0]);
        assert_eq!(select_font(2), vec![0x1B, 0x21, 2]);
        assert_eq!(select_font(3), vec![0x1B, 0x21, 0]);
        assert_eq!(select_font(7), vec![0x1B, 0x21, 1]);
    }

    #[test]
    fn test_feeds() {
        assert_eq!(feed_forward(48), vec![0x1B, 0x4A, 48]);
        assert_eq!(feed_backward(16), vec![0x1B, 0x6A, 16]);
        assert_eq!(feed_forward(0), vec![0x1B, 0x4A, 0]);
    }

    #[test]
    fn test_band_start() {
        assert_eq!(band_start(), vec![0x1B, 0x5A]);
    }

    #[test]
    fn test_control_code_table() {
        assert_eq!(CONTROL_CODES.len(), 32);
        assert_eq!(CONTROL_CODES[27], ("ESC", 27));
        // Names map to their own ASCII values
        for (i, (_, value)) in CONTROL_CODES.iter().enumerate() {
            assert_eq!(*value as usize, i);
        }
    }
}
