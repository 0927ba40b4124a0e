//! # Device URIs
//!
//! This module parses and builds the structured device locators used to
//! configure a printer port without per-transport code in callers.
//!
//! ## Syntax
//!
//! ```text
//! martel:<device>[?<key>=<value>[+<key>=<value>...]]
//! ```
//!
//! Examples:
//!
//! ```text
//! martel:/dev/ttyS0?type=serial+baudrate=115200+handshake=rtscts
//! martel:/dev/parport0?type=parallel+mode=irq
//! martel:/dev/ttyACM0?type=usb
//! ```
//!
//! ## Recognized Keys
//!
//! | Key | Values | Applies to |
//! |-----|--------|------------|
//! | `type` | `serial` \| `parallel` \| `usb` | port construction |
//! | `baudrate` | 1200/2400/4800/9600/19200/38400/57600/115200 | serial |
//! | `handshake` | `none` \| `rtscts` \| `xonxoff` | serial |
//! | `mode` | `poll` \| `irq` | parallel |
//!
//! Unknown keys are preserved by the parser and ignored by the backends.
//!
//! ## Limits
//!
//! No percent-decoding or escaping is performed; the `:`, `?`, `=` and `+`
//! delimiters are literal and cannot appear inside tokens. A URI is at most
//! [`URI_MAX`] bytes when serialized and carries at most [`OPTS_MAX`]
//! options. Exceeding either limit is an explicit error, never a silent
//! truncation.

use std::fmt;

use arrayvec::ArrayVec;

use crate::error::{MartelError, Result};

/// Maximum serialized URI length in bytes.
pub const URI_MAX: usize = 255;

/// Maximum number of `key=value` options in one URI.
pub const OPTS_MAX: usize = 8;

/// The mandatory scheme prefix.
const SCHEME: &str = "martel:";

/// One `key=value` option.
#[derive(Debug, Clone, PartialEq, Eq)]
struct UriOption {
    key: String,
    value: String,
}

/// # Device URI
///
/// The parsed form of a `martel:` device locator: a non-empty device path
/// plus an ordered option list. Duplicate keys are allowed; lookups return
/// the first match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceUri {
    device: String,
    opts: ArrayVec<UriOption, OPTS_MAX>,
}

impl DeviceUri {
    /// Create a URI for a device with no options.
    ///
    /// ## Errors
    ///
    /// - [`MartelError::InvalidUri`] if `device` is empty
    /// - [`MartelError::NameTooLong`] if the serialized form would already
    ///   exceed [`URI_MAX`]
    pub fn new(device: &str) -> Result<Self> {
        if device.is_empty() {
            return Err(MartelError::InvalidUri);
        }
        if SCHEME.len() + device.len() > URI_MAX {
            return Err(MartelError::NameTooLong);
        }
        Ok(Self {
            device: device.to_string(),
            opts: ArrayVec::new(),
        })
    }

    /// Append a `key=value` option, builder style.
    ///
    /// Duplicate keys are allowed and kept in insertion order.
    ///
    /// ## Errors
    ///
    /// [`MartelError::InvalidUri`] if the key or value is empty or the
    /// option table is full ([`OPTS_MAX`]).
    pub fn with_option(mut self, key: &str, value: &str) -> Result<Self> {
        if key.is_empty() || value.is_empty() {
            return Err(MartelError::InvalidUri);
        }
        self.opts
            .try_push(UriOption {
                key: key.to_string(),
                value: value.to_string(),
            })
            .map_err(|_| MartelError::InvalidUri)?;
        Ok(self)
    }

    /// # Parse a Device URI
    ///
    /// The grammar is fixed: the literal `martel:` scheme, then the device
    /// token up to `?`, then zero or more `key=value` pairs separated by
    /// `+`, terminated at end of input.
    ///
    /// ## Errors
    ///
    /// [`MartelError::InvalidUri`] on a missing scheme, empty device, empty
    /// key or value, a pair without `=`, more than [`OPTS_MAX`] options, or
    /// input longer than [`URI_MAX`] bytes.
    ///
    /// ## Example
    ///
    /// ```
    /// use martel::uri::DeviceUri;
    ///
    /// let uri = DeviceUri::parse("martel:/dev/ttyS0?type=serial+baudrate=9600")?;
    /// assert_eq!(uri.device(), "/dev/ttyS0");
    /// assert_eq!(uri.get("type"), Some("serial"));
    /// assert_eq!(uri.get("baudrate"), Some("9600"));
    /// # Ok::<(), martel::MartelError>(())
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        if text.len() > URI_MAX {
            return Err(MartelError::InvalidUri);
        }

        let rest = text.strip_prefix(SCHEME).ok_or(MartelError::InvalidUri)?;

        let (device, opts_text) = match rest.split_once('?') {
            Some((device, opts)) => (device, Some(opts)),
            None => (rest, None),
        };

        if device.is_empty() {
            return Err(MartelError::InvalidUri);
        }

        let mut uri = Self {
            device: device.to_string(),
            opts: ArrayVec::new(),
        };

        if let Some(opts_text) = opts_text {
            if !opts_text.is_empty() {
                for pair in opts_text.split('+') {
                    let (key, value) =
                        pair.split_once('=').ok_or(MartelError::InvalidUri)?;
                    uri = uri.with_option(key, value)?;
                }
            }
        }

        Ok(uri)
    }

    /// The device path or identifier. Always non-empty.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Look up the value of an option key.
    ///
    /// First match wins; lookups are case-sensitive.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.opts
            .iter()
            .find(|opt| opt.key == key)
            .map(|opt| opt.value.as_str())
    }

    /// Number of options.
    pub fn options_len(&self) -> usize {
        self.opts.len()
    }

    /// Iterate over `(key, value)` pairs in insertion order.
    pub fn options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.opts
            .iter()
            .map(|opt| (opt.key.as_str(), opt.value.as_str()))
    }

    /// # Serialize to URI Text
    ///
    /// Inverse of [`parse`](Self::parse): the first option joins the device
    /// with `?`, subsequent options with `+`.
    ///
    /// ## Errors
    ///
    /// [`MartelError::InvalidUri`] if the output would exceed [`URI_MAX`]
    /// bytes. Callers must size their device and option strings so the
    /// serialized form fits; the failure is never hidden by truncation.
    pub fn to_uri(&self) -> Result<String> {
        let text = self.to_string();
        if text.len() > URI_MAX {
            return Err(MartelError::InvalidUri);
        }
        Ok(text)
    }
}

impl fmt::Display for DeviceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SCHEME, self.device)?;
        for (i, opt) in self.opts.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '+' };
            write!(f, "{}{}={}", sep, opt.key, opt.value)?;
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_device_only() {
        let uri = DeviceUri::parse("martel:/dev/ttyS0").unwrap();
        assert_eq!(uri.device(), "/dev/ttyS0");
        assert_eq!(uri.options_len(), 0);
    }

    #[test]
    fn test_parse_with_options() {
        let uri =
            DeviceUri::parse("martel:/dev/ttyS0?type=serial+baudrate=115200+handshake=none")
                .unwrap();
        assert_eq!(uri.device(), "/dev/ttyS0");
        assert_eq!(uri.get("type"), Some("serial"));
        assert_eq!(uri.get("baudrate"), Some("115200"));
        assert_eq!(uri.get("handshake"), Some("none"));
        assert_eq!(uri.get("mode"), None);
    }

    #[test]
    fn test_parse_empty_options_section() {
        // A trailing '?' with no pairs is a valid URI with zero options
        let uri = DeviceUri::parse("martel:/dev/lp0?").unwrap();
        assert_eq!(uri.device(), "/dev/lp0");
        assert_eq!(uri.options_len(), 0);
    }

    #[test]
    fn test_parse_rejects_missing_scheme() {
        assert_eq!(
            DeviceUri::parse("/dev/ttyS0?type=serial"),
            Err(MartelError::InvalidUri)
        );
        assert_eq!(
            DeviceUri::parse("usb:/dev/ttyACM0"),
            Err(MartelError::InvalidUri)
        );
    }

    #[test]
    fn test_parse_rejects_empty_device() {
        assert_eq!(DeviceUri::parse("martel:"), Err(MartelError::InvalidUri));
        assert_eq!(
            DeviceUri::parse("martel:?type=serial"),
            Err(MartelError::InvalidUri)
        );
    }

    #[test]
    fn test_parse_rejects_malformed_pairs() {
        // Missing '='
        assert_eq!(
            DeviceUri::parse("martel:/dev/lp0?poll"),
            Err(MartelError::InvalidUri)
        );
        // Empty key
        assert_eq!(
            DeviceUri::parse("martel:/dev/lp0?=poll"),
            Err(MartelError::InvalidUri)
        );
        // Empty value
        assert_eq!(
            DeviceUri::parse("martel:/dev/lp0?mode="),
            Err(MartelError::InvalidUri)
        );
        // Trailing separator leaves an empty pair
        assert_eq!(
            DeviceUri::parse("martel:/dev/lp0?mode=poll+"),
            Err(MartelError::InvalidUri)
        );
    }

    #[test]
    fn test_parse_rejects_too_many_options() {
        let mut text = String::from("martel:/dev/lp0?a=1");
        for i in 1..OPTS_MAX + 1 {
            text.push_str(&format!("+k{}={}", i, i));
        }
        assert_eq!(DeviceUri::parse(&text), Err(MartelError::InvalidUri));
    }

    #[test]
    fn test_parse_rejects_oversized_input() {
        let text = format!("martel:/dev/{}", "x".repeat(URI_MAX));
        assert_eq!(DeviceUri::parse(&text), Err(MartelError::InvalidUri));
    }

    #[test]
    fn test_duplicate_keys_first_match_wins() {
        let uri = DeviceUri::parse("martel:/dev/lp0?mode=poll+mode=irq").unwrap();
        assert_eq!(uri.get("mode"), Some("poll"));
        assert_eq!(uri.options_len(), 2);
    }

    #[test]
    fn test_round_trip() {
        let text = "martel:/dev/ttyS1?type=serial+baudrate=19200+handshake=xonxoff";
        let uri = DeviceUri::parse(text).unwrap();
        assert_eq!(uri.to_uri().unwrap(), text);

        let reparsed = DeviceUri::parse(&uri.to_uri().unwrap()).unwrap();
        assert_eq!(reparsed, uri);
    }

    #[test]
    fn test_builder_round_trip() {
        let uri = DeviceUri::new("/dev/parport0")
            .unwrap()
            .with_option("type", "parallel")
            .unwrap()
            .with_option("mode", "irq")
            .unwrap();
        assert_eq!(
            uri.to_uri().unwrap(),
            "martel:/dev/parport0?type=parallel+mode=irq"
        );
    }

    #[test]
    fn test_builder_rejects_overflow() {
        let mut uri = DeviceUri::new("/dev/lp0").unwrap();
        for i in 0..OPTS_MAX {
            uri = uri.with_option(&format!("k{}", i), "v").unwrap();
        }
        assert_eq!(
            uri.with_option("extra", "v"),
            Err(MartelError::InvalidUri)
        );
    }

    #[test]
    fn test_format_rejects_oversized_output() {
        let device = "x".repeat(200);
        let uri = DeviceUri::new(&device)
            .unwrap()
            .with_option("key", &"y".repeat(60))
            .unwrap();
        assert_eq!(uri.to_uri(), Err(MartelError::InvalidUri));
    }
}
