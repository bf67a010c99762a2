//! Satellite identifier encoding.
//!
//! The producer numbers satellites with a single combined PRN space;
//! the consuming platform expects a packed identifier carrying the
//! per-constellation index, the constellation type and usage flags.

/// Constellation type identifiers of the consuming platform's
/// status encoding contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Constellation {
    Unknown = 0,
    Gps = 1,
    Sbas = 2,
    Glonass = 3,
    Qzss = 4,
    Beidou = 5,
    Galileo = 6,
}

/// Usage flags packed into the low bits of every identifier:
/// ephemeris, almanac and used-in-fix all set.
const USED_IN_FIX_FLAGS: i32 = 7;

/// Bit offsets of the packed identifier layout. These change across
/// target platform versions, so they are injected configuration
/// rather than compile time constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SvidShifts {
    /// Offset of the per-constellation satellite index
    pub svid_shift: u32,

    /// Offset of the constellation type
    pub constellation_shift: u32,
}

impl Default for SvidShifts {
    fn default() -> Self {
        Self {
            svid_shift: 8,
            constellation_shift: 4,
        }
    }
}

/// Maps a combined PRN onto its (constellation, index) pair.
/// Values outside every known range pass through unchanged as
/// [Constellation::Unknown], deliberately without bounds checking,
/// for compatibility with real world producers.
pub fn classify(prn: i32) -> (Constellation, i32) {
    match prn {
        1..=32 => (Constellation::Gps, prn),
        65..=96 => (Constellation::Glonass, prn - 64),
        193..=200 => (Constellation::Qzss, prn),
        201..=235 => (Constellation::Beidou, prn - 200),
        301..=336 => (Constellation::Galileo, prn - 300),
        _ => (Constellation::Unknown, prn),
    }
}

/// Packs a combined PRN into a platform satellite identifier.
pub fn encode(prn: i32, shifts: SvidShifts) -> i32 {
    let (constellation, svid) = classify(prn);

    (svid << shifts.svid_shift) + ((constellation as i32) << shifts.constellation_shift) + USED_IN_FIX_FLAGS
}
