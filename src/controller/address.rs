//! TotalMix OSC address map
//!
//! Static mapping between wire addresses and the mixer controls this crate
//! knows about. Everything else parses to `None` and is dropped by the
//! feedback handler.

use std::fmt;

pub const BUS_OUTPUT: &str = "/1/busOutput";
pub const MASTER_VOLUME: &str = "/1/mastervolume";
pub const MAIN_MUTE: &str = "/1/mainMute";
pub const MAIN_DIM: &str = "/1/mainDim";
const VOLUME_PREFIX: &str = "/1/volume";

/// A mixer control addressable over OSC (page 1 of the TotalMix layout)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MixerAddress {
    /// Selects the output bus so fader commands act on hardware outputs
    BusOutput,
    /// Fader N of the selected bus (1-based)
    Volume(u32),
    MasterVolume,
    MainMute,
    MainDim,
}

impl MixerAddress {
    /// Map a wire address to a known control
    pub fn parse(address: &str) -> Option<Self> {
        match address {
            BUS_OUTPUT => Some(MixerAddress::BusOutput),
            MASTER_VOLUME => Some(MixerAddress::MasterVolume),
            MAIN_MUTE => Some(MixerAddress::MainMute),
            MAIN_DIM => Some(MixerAddress::MainDim),
            _ => {
                let digits = address.strip_prefix(VOLUME_PREFIX)?;
                // Only the canonical spelling, so parse and Display agree
                if digits.is_empty()
                    || digits.starts_with('0')
                    || !digits.bytes().all(|b| b.is_ascii_digit())
                {
                    return None;
                }
                digits.parse().ok().map(MixerAddress::Volume)
            }
        }
    }
}

impl fmt::Display for MixerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MixerAddress::BusOutput => f.write_str(BUS_OUTPUT),
            MixerAddress::Volume(n) => write!(f, "{}{}", VOLUME_PREFIX, n),
            MixerAddress::MasterVolume => f.write_str(MASTER_VOLUME),
            MixerAddress::MainMute => f.write_str(MAIN_MUTE),
            MixerAddress::MainDim => f.write_str(MAIN_DIM),
        }
    }
}
