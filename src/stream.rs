use clap::ValueEnum;
use std::fmt;

pub const STATION_TITLE: &str = "The Lot Radio";
pub const STATION_SUBTITLE: &str = "Live from a shipping container in Brooklyn";

/// One of the fixed bitrate renditions of the station stream.
///
/// Chosen once when the controller is built; there is no switching at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StreamTarget {
    #[value(name = "64")]
    Kbps64,
    #[default]
    #[value(name = "128")]
    Kbps128,
    #[value(name = "192")]
    Kbps192,
}

impl StreamTarget {
    pub fn uri(&self) -> &'static str {
        match self {
            StreamTarget::Kbps64 => "http://thelot.out.airtime.pro:8000/thelot_a",
            StreamTarget::Kbps128 => "http://thelot.out.airtime.pro:8000/thelot_b",
            StreamTarget::Kbps192 => "http://thelot.out.airtime.pro:8000/thelot_c",
        }
    }

    pub fn bitrate_kbps(&self) -> u32 {
        match self {
            StreamTarget::Kbps64 => 64,
            StreamTarget::Kbps128 => 128,
            StreamTarget::Kbps192 => 192,
        }
    }
}

impl fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} kbps", self.bitrate_kbps())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_128() {
        assert_eq!(StreamTarget::default(), StreamTarget::Kbps128);
        assert!(StreamTarget::default().uri().ends_with("thelot_b"));
    }

    #[test]
    fn test_renditions_are_distinct() {
        let uris = [
            StreamTarget::Kbps64.uri(),
            StreamTarget::Kbps128.uri(),
            StreamTarget::Kbps192.uri(),
        ];
        assert_ne!(uris[0], uris[1]);
        assert_ne!(uris[1], uris[2]);
        assert_ne!(uris[0], uris[2]);
    }

    #[test]
    fn test_parse_from_cli_value() {
        let target = StreamTarget::from_str("192", false).unwrap();
        assert_eq!(target, StreamTarget::Kbps192);
        assert!(StreamTarget::from_str("256", false).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(StreamTarget::Kbps64.to_string(), "64 kbps");
    }
}
