//! # Martel Protocol Implementation
//!
//! Low-level command builders for the escape-sequence protocol spoken by
//! Martel MPP and MCP panel-mount thermal printers.
//!
//! ## Module Structure
//!
//! - [`commands`]: printer commands (reset, font select, paper feed) and
//!   the ASCII control-code constants the command set is built from
//!
//! ## Usage Example
//!
//! ```
//! use martel::protocol::commands;
//! use martel::raster;
//!
//! // Build a small print job
//! let mut data = Vec::new();
//! data.extend(commands::reset());
//! data.extend(commands::select_font(1));
//! data.extend(b"TOTAL  12.50\n");
//! data.extend(raster::frame_band(std::iter::once(&[0xFFu8; 48][..])));
//! data.extend(commands::feed_forward(48));
//!
//! // Send `data` to the printer via a Port...
//! ```

pub mod commands;
