//! Device address specifications.
//!
//! Grounded on `devspec.py`'s `NetDevSpec`/`SerialDevSpec` named tuples:
//! a `DeviceSpec` is the minimal information needed to open a transport
//! to a candidate device, before anything about the device itself is
//! known.

use std::fmt;
use std::str::FromStr;

/// Transport method a [`DeviceSpec`] addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportMethod {
    Tcp,
    Udp,
    Rtu,
    /// Reuses the RTU serial transport; see DESIGN.md "ASCII transport".
    Ascii,
}

impl TransportMethod {
    fn as_str(self) -> &'static str {
        match self {
            TransportMethod::Tcp => "tcp",
            TransportMethod::Udp => "udp",
            TransportMethod::Rtu => "rtu",
            TransportMethod::Ascii => "ascii",
        }
    }

    fn is_serial(self) -> bool {
        matches!(self, TransportMethod::Rtu | TransportMethod::Ascii)
    }
}

impl FromStr for TransportMethod {
    type Err = DevSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(TransportMethod::Tcp),
            "udp" => Ok(TransportMethod::Udp),
            "rtu" => Ok(TransportMethod::Rtu),
            "ascii" => Ok(TransportMethod::Ascii),
            other => Err(DevSpecError::UnknownMethod(other.to_string())),
        }
    }
}

/// A candidate device address: network (`tcp`/`udp`, host + port) or
/// serial (`rtu`/`ascii`, tty path + baud rate). Both carry a Modbus
/// unit id, `0` meaning "unit unknown, try handler-declared candidates".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceSpec {
    Net {
        method: TransportMethod,
        host: String,
        port: u16,
        unit: u8,
    },
    Serial {
        method: TransportMethod,
        tty: String,
        rate: u32,
        unit: u8,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DevSpecError {
    #[error("unknown transport method {0:?}")]
    UnknownMethod(String),
    #[error("expected {0} colon-separated fields, got {1}")]
    WrongFieldCount(usize, usize),
    #[error("invalid numeric field: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),
}

impl DeviceSpec {
    pub fn method(&self) -> TransportMethod {
        match self {
            DeviceSpec::Net { method, .. } => *method,
            DeviceSpec::Serial { method, .. } => *method,
        }
    }

    pub fn unit(&self) -> u8 {
        match self {
            DeviceSpec::Net { unit, .. } => *unit,
            DeviceSpec::Serial { unit, .. } => *unit,
        }
    }

    pub fn with_unit(&self, unit: u8) -> DeviceSpec {
        let mut s = self.clone();
        match &mut s {
            DeviceSpec::Net { unit: u, .. } => *u = unit,
            DeviceSpec::Serial { unit: u, .. } => *u = unit,
        }
        s
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSpec::Net {
                method,
                host,
                port,
                unit,
            } => write!(f, "{}:{}:{}:{}", method.as_str(), host, port, unit),
            DeviceSpec::Serial {
                method,
                tty,
                rate,
                unit,
            } => write!(f, "{}:{}:{}:{}", method.as_str(), tty, rate, unit),
        }
    }
}

impl FromStr for DeviceSpec {
    type Err = DevSpecError;

    /// Parses the colon-joined form used on the CLI and in scan output,
    /// matching `devspec.py`'s `fromstring`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 4 {
            return Err(DevSpecError::WrongFieldCount(4, parts.len()));
        }
        let method: TransportMethod = parts[0].parse()?;
        let second_numeric: u32 = parts[2].parse()?;
        let unit: u8 = parts[3].parse()?;
        if method.is_serial() {
            Ok(DeviceSpec::Serial {
                method,
                tty: parts[1].to_string(),
                rate: second_numeric,
                unit,
            })
        } else {
            Ok(DeviceSpec::Net {
                method,
                host: parts[1].to_string(),
                port: second_numeric as u16,
                unit,
            })
        }
    }
}

/// Parses a set of specs, silently dropping malformed entries, matching
/// `devspec.py`'s `fromstrings` bare-except-continue behavior.
pub fn from_strings<'a, I: IntoIterator<Item = &'a str>>(
    specs: I,
) -> std::collections::HashSet<DeviceSpec> {
    specs
        .into_iter()
        .filter_map(|s| DeviceSpec::from_str(s).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_tcp() {
        let spec = DeviceSpec::from_str("tcp:192.168.1.5:502:1").unwrap();
        assert_eq!(
            spec,
            DeviceSpec::Net {
                method: TransportMethod::Tcp,
                host: "192.168.1.5".into(),
                port: 502,
                unit: 1,
            }
        );
        assert_eq!(spec.to_string(), "tcp:192.168.1.5:502:1");
    }

    #[test]
    fn round_trips_serial() {
        let spec = DeviceSpec::from_str("rtu:/dev/ttyUSB0:9600:3").unwrap();
        assert_eq!(
            spec,
            DeviceSpec::Serial {
                method: TransportMethod::Rtu,
                tty: "/dev/ttyUSB0".into(),
                rate: 9600,
                unit: 3,
            }
        );
        assert_eq!(spec.to_string(), "rtu:/dev/ttyUSB0:9600:3");
    }

    #[test]
    fn rejects_unknown_method() {
        assert!(matches!(
            DeviceSpec::from_str("foo:bar:1:1"),
            Err(DevSpecError::UnknownMethod(_))
        ));
    }

    #[test]
    fn from_strings_drops_malformed_entries() {
        let specs = from_strings(["tcp:host:502:1", "garbage", "udp:host2:502:2"]);
        assert_eq!(specs.len(), 2);
    }
}
