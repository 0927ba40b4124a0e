//! # Printer Models
//!
//! Hardware characteristics of the supported Martel panel-mount printer
//! range. The filter binaries use the model to clamp raster rows to the
//! physical head width; callers use the family to pick a command dialect.
//!
//! ## Supported Printers
//!
//! | Model | Family | Head width (dots) |
//! |-------|--------|-------------------|
//! | MCP7810 | MCP | 384 |
//! | MCP8810 | MCP | 384 |
//! | MPP2000 | MPP | 384 |
//! | MPP3000 | MPP | 576 |
//! | MPP4000 | MPP | 832 |
//! | MPP5510 | MPP | 384 |
//! | MPP5610 | MPP | 384 |

use std::fmt;
use std::str::FromStr;

use crate::error::MartelError;

/// Command-dialect family a model belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Panel-mount MPP printers.
    Mpp,
    /// Cutter-equipped MCP printers.
    Mcp,
}

/// A supported printer model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Mcp7810,
    Mcp8810,
    Mpp2000,
    Mpp3000,
    Mpp4000,
    Mpp5510,
    Mpp5610,
}

impl Model {
    /// The marketing name, e.g. `"MPP5510"`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Mcp7810 => "MCP7810",
            Self::Mcp8810 => "MCP8810",
            Self::Mpp2000 => "MPP2000",
            Self::Mpp3000 => "MPP3000",
            Self::Mpp4000 => "MPP4000",
            Self::Mpp5510 => "MPP5510",
            Self::Mpp5610 => "MPP5610",
        }
    }

    /// The command-dialect family.
    pub fn model_type(self) -> ModelType {
        match self {
            Self::Mcp7810 | Self::Mcp8810 => ModelType::Mcp,
            Self::Mpp2000
            | Self::Mpp3000
            | Self::Mpp4000
            | Self::Mpp5510
            | Self::Mpp5610 => ModelType::Mpp,
        }
    }

    /// Thermal head width in dots.
    pub fn width_dots(self) -> u16 {
        match self {
            Self::Mcp7810
            | Self::Mcp8810
            | Self::Mpp2000
            | Self::Mpp5510
            | Self::Mpp5610 => 384,
            Self::Mpp3000 => 576,
            Self::Mpp4000 => 832,
        }
    }

    /// Thermal head width in bytes (one bit per dot).
    pub fn width_bytes(self) -> usize {
        usize::from(self.width_dots()) / 8
    }

    /// Every supported model.
    pub fn all() -> &'static [Model] {
        &[
            Self::Mcp7810,
            Self::Mcp8810,
            Self::Mpp2000,
            Self::Mpp3000,
            Self::Mpp4000,
            Self::Mpp5510,
            Self::Mpp5610,
        ]
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Model {
    type Err = MartelError;

    fn from_str(s: &str) -> Result<Self, MartelError> {
        Model::all()
            .iter()
            .copied()
            .find(|model| model.name().eq_ignore_ascii_case(s))
            .ok_or(MartelError::InvalidModel)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widths() {
        assert_eq!(Model::Mpp5510.width_dots(), 384);
        assert_eq!(Model::Mpp5510.width_bytes(), 48);
        assert_eq!(Model::Mpp3000.width_dots(), 576);
        assert_eq!(Model::Mpp3000.width_bytes(), 72);
        assert_eq!(Model::Mpp4000.width_dots(), 832);
        assert_eq!(Model::Mpp4000.width_bytes(), 104);
    }

    #[test]
    fn test_families() {
        assert_eq!(Model::Mcp7810.model_type(), ModelType::Mcp);
        assert_eq!(Model::Mcp8810.model_type(), ModelType::Mcp);
        assert_eq!(Model::Mpp2000.model_type(), ModelType::Mpp);
        assert_eq!(Model::Mpp5610.model_type(), ModelType::Mpp);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("MPP5510".parse::<Model>().unwrap(), Model::Mpp5510);
        assert_eq!("mpp5510".parse::<Model>().unwrap(), Model::Mpp5510);
        assert_eq!("Mcp7810".parse::<Model>().unwrap(), Model::Mcp7810);
        assert_eq!("MPP9000".parse::<Model>(), Err(MartelError::InvalidModel));
    }

    #[test]
    fn test_every_width_is_byte_aligned() {
        for model in Model::all() {
            assert_eq!(model.width_dots() % 8, 0, "{model}");
        }
    }
}
