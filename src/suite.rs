use core::{fmt, str::FromStr};

#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};

/// The wire encodings a relay understands.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub enum Suite {
    #[cfg_attr(feature = "std", serde(rename = "ccnb"))]
    Ccnb,
    #[cfg_attr(feature = "std", serde(rename = "ccnx2015"))]
    CcnTlv,
    #[cfg_attr(feature = "std", serde(rename = "cisco2015"))]
    CisTlv,
    #[cfg_attr(feature = "std", serde(rename = "iot2014"))]
    IotTlv,
    #[cfg_attr(feature = "std", serde(rename = "ndn2013"))]
    NdnTlv,
}

// Values carried after the 0x80 "switch encoding" byte
pub const ENC_CCNB: u64 = 0;
pub const ENC_NDN2013: u64 = 1;
pub const ENC_CCNX2014: u64 = 2;
pub const ENC_IOT2014: u64 = 3;
pub const ENC_LOCALRPC: u64 = 4;
pub const ENC_CISCO2015: u64 = 5;

impl Suite {
    pub const ALL: [Suite; 5] = [
        Suite::Ccnb,
        Suite::CcnTlv,
        Suite::CisTlv,
        Suite::IotTlv,
        Suite::NdnTlv,
    ];

    pub fn encoding_code(self) -> u64 {
        match self {
            Suite::Ccnb => ENC_CCNB,
            Suite::NdnTlv => ENC_NDN2013,
            Suite::CcnTlv => ENC_CCNX2014,
            Suite::IotTlv => ENC_IOT2014,
            Suite::CisTlv => ENC_CISCO2015,
        }
    }

    pub fn from_encoding_code(code: u64) -> Option<Self> {
        match code {
            ENC_CCNB => Some(Suite::Ccnb),
            ENC_NDN2013 => Some(Suite::NdnTlv),
            ENC_CCNX2014 => Some(Suite::CcnTlv),
            ENC_IOT2014 => Some(Suite::IotTlv),
            ENC_CISCO2015 => Some(Suite::CisTlv),
            _ => None, // ENC_LOCALRPC included
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Suite::Ccnb => "ccnb",
            Suite::CcnTlv => "ccnx2015",
            Suite::CisTlv => "cisco2015",
            Suite::IotTlv => "iot2014",
            Suite::NdnTlv => "ndn2013",
        }
    }

    // These suites cannot be told apart from the others by their first bytes,
    //  so they always travel behind an encoding switch.
    pub fn requires_switch(self) -> bool {
        matches!(self, Suite::CisTlv | Suite::IotTlv)
    }

    // Whether name components carry their own type-length header
    pub fn components_carry_header(self) -> bool {
        matches!(self, Suite::CcnTlv | Suite::CisTlv)
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSuiteName;

impl FromStr for Suite {
    type Err = UnknownSuiteName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ccnb" => Ok(Suite::Ccnb),
            "ccnx2015" | "ccnx" => Ok(Suite::CcnTlv),
            "cisco2015" | "cisco" => Ok(Suite::CisTlv),
            "iot2014" | "iot" => Ok(Suite::IotTlv),
            "ndn2013" | "ndn" => Ok(Suite::NdnTlv),
            _ => Err(UnknownSuiteName),
        }
    }
}

/// Guesses the suite of a packet from its first bytes.
/// Does not look at encoding switches, those must be removed first.
pub fn sniff(bytes: &[u8]) -> Option<Suite> {
    let first = *bytes.first()?;
    let second = bytes.get(1).copied();

    match (first, second) {
        // Interest and ContentObject DTAG heads
        (0x01, Some(0xd2)) | (0x04, Some(0x82)) => Some(Suite::Ccnb),
        // Fixed header: version, packet type, ..., header length
        (0x01, Some(typ)) if typ <= 3 && bytes.len() >= 8 && bytes[7] >= 8 => {
            Some(Suite::CcnTlv)
        }
        (0x05, _) | (0x06, _) | (0x64, _) => Some(Suite::NdnTlv),
        _ => None,
    }
}
