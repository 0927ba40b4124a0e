//! # Martel - Thermal Printer Communication Library
//!
//! Martel is a Rust library for driving Martel Instruments panel-mount
//! thermal printers over their three wired transports. It provides:
//!
//! - **Port layer**: one handle over serial, parallel and USB backends,
//!   with exclusive device ownership, per-operation timeouts and a
//!   recorded last-error
//! - **Raster encoder**: run-length/literal hybrid row encoding and
//!   24-row band framing
//! - **Protocol**: escape-sequence command builders (reset, fonts, feeds)
//! - **Device URIs**: `martel:<device>?key=value+...` locators
//! - **Text filter**: `<ESC>`-style tag substitution for ticket text
//!
//! ## Quick Start
//!
//! ```no_run
//! use martel::port::Port;
//! use martel::protocol::commands;
//! use martel::raster;
//! use std::time::Duration;
//!
//! // Build and inspect the port, then open the device
//! let mut port = Port::from_uri("martel:/dev/ttyS0?type=serial+baudrate=115200");
//! if let Some(err) = port.last_error() {
//!     Err(err)?;
//! }
//! port.open()?;
//! port.set_write_timeout(Duration::from_secs(5));
//!
//! // Compose a job: reset, one all-black band, feed to the tear bar
//! let mut job = Vec::new();
//! job.extend(commands::reset());
//! let rows = vec![[0xFFu8; 48]; 24];
//! job.extend(raster::frame_band(rows.iter().map(|r| r.as_slice())));
//! job.extend(commands::feed_forward(48));
//!
//! port.write(&job)?;
//! port.sync()?;
//! port.close()?;
//! # Ok::<(), martel::MartelError>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`port`] | Port handle and the three transport backends |
//! | [`raster`] | Row encoding and band framing |
//! | [`protocol`] | Printer command builders |
//! | [`uri`] | Device URI parsing and formatting |
//! | [`printer`] | Printer model table |
//! | [`text`] | Ticket text tag substitution |
//! | [`error`] | Error taxonomy |
//!
//! ## Supported Printers
//!
//! MPP2000/3000/4000, MPP5510/5610 and MCP7810/8810 panel-mount thermal
//! printers, over RS-232, Centronics parallel and USB (CDC-ACM).
//!
//! ## Platform
//!
//! Linux only: the backends drive tty devices through termios and
//! parallel ports through `ppdev` (`/dev/parport*`).

pub mod error;
pub mod port;
pub mod printer;
pub mod protocol;
pub mod raster;
pub mod text;
pub mod uri;

// Re-exports for convenience
pub use error::{MartelError, Result};
pub use port::parallel::ParallelMode;
pub use port::serial::{Baudrate, Handshake};
pub use port::{Port, PortKind};
pub use printer::{Model, ModelType};
pub use uri::DeviceUri;
