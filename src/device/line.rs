use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    pub fn bits(self) -> u8 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(format!("unsupported data bits {other}, expected 5..=8")),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(value: DataBits) -> Self {
        value.bits()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl Parity {
    fn letter(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

impl StopBits {
    fn label(self) -> &'static str {
        match self {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        }
    }
}

/// Baud rate and framing applied to the UART at attach time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    pub baud: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl LineConfig {
    /// Length of the CDC `SET_LINE_CODING` payload.
    pub const CODING_LEN: usize = 7;

    /// CDC PSTN line coding structure: rate, char format, parity type, data bits.
    pub fn encode_cdc(&self) -> [u8; Self::CODING_LEN] {
        let mut buf = [0u8; Self::CODING_LEN];
        buf[0..4].copy_from_slice(&self.baud.to_le_bytes());
        buf[4] = match self.stop_bits {
            StopBits::One => 0,
            StopBits::OnePointFive => 1,
            StopBits::Two => 2,
        };
        buf[5] = match self.parity {
            Parity::None => 0,
            Parity::Odd => 1,
            Parity::Even => 2,
            Parity::Mark => 3,
            Parity::Space => 4,
        };
        buf[6] = self.data_bits.bits();
        buf
    }
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            baud: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl fmt::Display for LineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{}{}",
            self.baud,
            self.data_bits.bits(),
            self.parity.letter(),
            self.stop_bits.label()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_115200_8n1() {
        assert_eq!(LineConfig::default().to_string(), "115200 8N1");
    }

    #[test]
    fn cdc_coding_layout() {
        let line = LineConfig {
            baud: 9600,
            data_bits: DataBits::Seven,
            parity: Parity::Even,
            stop_bits: StopBits::Two,
        };
        assert_eq!(line.encode_cdc(), [0x80, 0x25, 0x00, 0x00, 2, 2, 7]);
        assert_eq!(line.to_string(), "9600 7E2");
    }

    #[test]
    fn data_bits_reject_out_of_range() {
        assert!(DataBits::try_from(9u8).is_err());
        assert_eq!(DataBits::try_from(5u8), Ok(DataBits::Five));
    }
}
