//! Data structures representing RBN spots.
//!
//! This module defines the core types used throughout the application
//! to represent parsed spots from the Reverse Beacon Network, plus the
//! amateur band table used by the band filter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The type of CQ or beacon activity detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpotType {
    /// Standard CQ call
    Cq,
    /// Generic beacon
    Beacon,
    /// Station calling DX
    Dx,
    /// Unknown or other type
    Other,
}

impl SpotType {
    /// Classify the activity column of a spot line.
    pub fn from_token(token: &str) -> Self {
        match token.to_ascii_uppercase().as_str() {
            "CQ" => SpotType::Cq,
            "BEACON" => SpotType::Beacon,
            "DX" => SpotType::Dx,
            _ => SpotType::Other,
        }
    }
}

impl fmt::Display for SpotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpotType::Cq => write!(f, "CQ"),
            SpotType::Beacon => write!(f, "BEACON"),
            SpotType::Dx => write!(f, "DX"),
            SpotType::Other => write!(f, "OTHER"),
        }
    }
}

/// The transmission mode of the spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Mode {
    /// Continuous Wave (Morse code)
    Cw,
    /// Radio Teletype
    Rtty,
    /// PSK31 digital mode
    Psk31,
    /// PSK63 digital mode
    Psk63,
    /// Binary phase shift keying
    Bpsk,
    /// FT8 digital mode
    Ft8,
    /// FT4 digital mode
    Ft4,
    /// Unknown mode
    Unknown,
}

impl Mode {
    /// Every mode the feed is known to report.
    pub const KNOWN: [Mode; 7] = [
        Mode::Cw,
        Mode::Rtty,
        Mode::Psk31,
        Mode::Psk63,
        Mode::Bpsk,
        Mode::Ft8,
        Mode::Ft4,
    ];

    /// Map a feed mode token to a `Mode`, falling back to `Unknown`.
    pub fn from_token(token: &str) -> Self {
        token.parse().unwrap_or(Mode::Unknown)
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CW" => Ok(Mode::Cw),
            "RTTY" => Ok(Mode::Rtty),
            "PSK31" => Ok(Mode::Psk31),
            "PSK63" => Ok(Mode::Psk63),
            "BPSK" => Ok(Mode::Bpsk),
            "FT8" => Ok(Mode::Ft8),
            "FT4" => Ok(Mode::Ft4),
            "UNKNOWN" => Ok(Mode::Unknown),
            _ => Err(format!("unknown mode: {}", s)),
        }
    }
}

impl TryFrom<String> for Mode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Mode> for String {
    fn from(mode: Mode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Cw => write!(f, "CW"),
            Mode::Rtty => write!(f, "RTTY"),
            Mode::Psk31 => write!(f, "PSK31"),
            Mode::Psk63 => write!(f, "PSK63"),
            Mode::Bpsk => write!(f, "BPSK"),
            Mode::Ft8 => write!(f, "FT8"),
            Mode::Ft4 => write!(f, "FT4"),
            Mode::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// An amateur band with a fixed, inclusive frequency range in kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Band {
    M160,
    M80,
    M60,
    M40,
    M30,
    M20,
    M17,
    M15,
    M12,
    M10,
    M6,
}

impl Band {
    /// The full band table, 160m through 6m.
    pub const ALL: [Band; 11] = [
        Band::M160,
        Band::M80,
        Band::M60,
        Band::M40,
        Band::M30,
        Band::M20,
        Band::M17,
        Band::M15,
        Band::M12,
        Band::M10,
        Band::M6,
    ];

    /// Inclusive (low, high) edges in kHz.
    pub fn range_khz(self) -> (f64, f64) {
        match self {
            Band::M160 => (1800.0, 2000.0),
            Band::M80 => (3500.0, 4000.0),
            Band::M60 => (5330.0, 5410.0),
            Band::M40 => (7000.0, 7300.0),
            Band::M30 => (10100.0, 10150.0),
            Band::M20 => (14000.0, 14350.0),
            Band::M17 => (18068.0, 18168.0),
            Band::M15 => (21000.0, 21450.0),
            Band::M12 => (24890.0, 24990.0),
            Band::M10 => (28000.0, 29700.0),
            Band::M6 => (50000.0, 54000.0),
        }
    }

    /// Whether a frequency falls inside this band, edges included.
    pub fn contains(self, frequency_khz: f64) -> bool {
        let (low, high) = self.range_khz();
        (low..=high).contains(&frequency_khz)
    }

    /// Find the band a frequency belongs to, if any.
    pub fn for_frequency(frequency_khz: f64) -> Option<Band> {
        Band::ALL.into_iter().find(|b| b.contains(frequency_khz))
    }

    pub fn name(self) -> &'static str {
        match self {
            Band::M160 => "160m",
            Band::M80 => "80m",
            Band::M60 => "60m",
            Band::M40 => "40m",
            Band::M30 => "30m",
            Band::M20 => "20m",
            Band::M17 => "17m",
            Band::M15 => "15m",
            Band::M12 => "12m",
            Band::M10 => "10m",
            Band::M6 => "6m",
        }
    }
}

impl FromStr for Band {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Band::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown band: {}", s))
    }
}

impl TryFrom<String> for Band {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Band> for String {
    fn from(band: Band) -> Self {
        band.name().to_string()
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed spot from the Reverse Beacon Network.
///
/// This represents a single decoded signal detected by a skimmer station.
///
/// # Example
///
/// A raw spot like:
/// ```text
/// DX de W1AW-#:    14025.0  JA1XYZ       CW    12 dB   22 WPM  CQ      1234Z
/// ```
///
/// Would be parsed into a `Spot` with:
/// - `de_call`: "W1AW"
/// - `frequency_khz`: 14025.0
/// - `dx_call`: "JA1XYZ"
/// - `mode`: Mode::Cw
/// - `snr_db`: 12
/// - `wpm`: 22
/// - `spot_type`: SpotType::Cq
/// - `timestamp`: "1234Z"
#[derive(Debug, Clone, PartialEq)]
pub struct Spot {
    /// The callsign of the skimmer station that reported this signal,
    /// with any `-suffix` removed.
    pub de_call: String,

    /// The frequency in kHz where the signal was detected.
    pub frequency_khz: f64,

    /// The callsign of the station being spotted (the DX station).
    pub dx_call: String,

    /// The transmission mode (CW, RTTY, etc.).
    pub mode: Mode,

    /// Signal-to-noise ratio in decibels.
    pub snr_db: i32,

    /// CW speed in words per minute.
    pub wpm: u16,

    /// The type of activity (CQ, BEACON, etc.).
    pub spot_type: SpotType,

    /// The feed's own time column, kept verbatim (e.g. `1234Z`).
    pub timestamp: String,
}

impl Spot {
    /// Returns the amateur radio band for this spot's frequency.
    pub fn band(&self) -> Option<Band> {
        Band::for_frequency(self.frequency_khz)
    }
}

impl fmt::Display for Spot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DX de {}: {:>8.1} {} {} {} dB {} WPM {} {}",
            self.de_call,
            self.frequency_khz,
            self.dx_call,
            self.mode,
            self.snr_db,
            self.wpm,
            self.spot_type,
            self.timestamp
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_spot(freq: f64) -> Spot {
        Spot {
            de_call: "TEST".to_string(),
            frequency_khz: freq,
            dx_call: "W1AW".to_string(),
            mode: Mode::Cw,
            snr_db: 10,
            wpm: 20,
            spot_type: SpotType::Cq,
            timestamp: "1200Z".to_string(),
        }
    }

    #[test]
    fn test_band_detection() {
        assert_eq!(make_spot(14025.0).band(), Some(Band::M20));
    }

    #[test]
    fn test_band_detection_edge_cases() {
        assert_eq!(make_spot(7000.0).band(), Some(Band::M40));
        assert_eq!(make_spot(7300.0).band(), Some(Band::M40));
        assert_eq!(make_spot(6999.9).band(), None);
        assert_eq!(make_spot(14350.0).band(), Some(Band::M20));
        assert_eq!(make_spot(54000.1).band(), None);
    }

    #[test]
    fn test_band_from_str() {
        assert_eq!("20m".parse::<Band>().unwrap(), Band::M20);
        assert_eq!("160M".parse::<Band>().unwrap(), Band::M160);
        assert!("2m".parse::<Band>().is_err());
    }

    #[test]
    fn test_mode_from_token() {
        assert_eq!(Mode::from_token("CW"), Mode::Cw);
        assert_eq!(Mode::from_token("psk63"), Mode::Psk63);
        assert_eq!(Mode::from_token("JT65"), Mode::Unknown);
    }

    #[test]
    fn test_spot_type_from_token() {
        assert_eq!(SpotType::from_token("CQ"), SpotType::Cq);
        assert_eq!(SpotType::from_token("beacon"), SpotType::Beacon);
        assert_eq!(SpotType::from_token("NCDXF"), SpotType::Other);
    }

    #[test]
    fn test_band_serde_roundtrip_name() {
        let json = serde_json::to_string(&Band::M17).unwrap();
        assert_eq!(json, "\"17m\"");
        let band: Band = serde_json::from_str("\"6m\"").unwrap();
        assert_eq!(band, Band::M6);
    }

    #[test]
    fn test_mode_serde_any_case() {
        assert_eq!(serde_json::to_string(&Mode::Psk31).unwrap(), "\"PSK31\"");
        let mode: Mode = serde_json::from_str("\"ft8\"").unwrap();
        assert_eq!(mode, Mode::Ft8);
        assert!(serde_json::from_str::<Mode>("\"jt65\"").is_err());
    }
}
