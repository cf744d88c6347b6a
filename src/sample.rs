//! The decoded data model shared by every parser: sample types, gas
//! mixes, tanks, salinity, fingerprints, and the opaque per-dive blob.
//! Derives `serde::{Serialize, Deserialize}` the way a dive-log type
//! would, so callers can hand decoded output straight to `serde_json`.

use serde::{Deserialize, Serialize};

/// Opaque, family-specific byte sequence handed to the session's `foreach`
/// callback. Its leading bytes contain the fingerprint region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiveBlob {
    pub bytes: Vec<u8>,
    pub fingerprint_offset: usize,
    pub fingerprint_len: usize,
}

impl DiveBlob {
    pub fn fingerprint(&self) -> &[u8] {
        &self.bytes[self.fingerprint_offset..self.fingerprint_offset + self.fingerprint_len]
    }
}

/// Opaque byte run used by the caller to recognize already-downloaded dives.
pub type Fingerprint = Vec<u8>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GasMix {
    pub helium: f64,
    pub oxygen: f64,
    pub nitrogen: f64,
}

impl GasMix {
    pub fn from_o2_he_percent(o2_percent: u8, he_percent: u8) -> Self {
        let oxygen = o2_percent as f64 / 100.0;
        let helium = he_percent as f64 / 100.0;
        GasMix {
            oxygen,
            helium,
            nitrogen: (1.0 - oxygen - helium).max(0.0),
        }
    }

    /// The three fractions must sum to 1.0 within 1e-9 and each must lie
    /// in [0, 1].
    pub fn is_valid(&self) -> bool {
        let sum = self.helium + self.oxygen + self.nitrogen;
        (sum - 1.0).abs() <= 1e-9
            && (0.0..=1.0).contains(&self.helium)
            && (0.0..=1.0).contains(&self.oxygen)
            && (0.0..=1.0).contains(&self.nitrogen)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TankType {
    None,
    Metric,
    Imperial,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tank {
    pub gasmix_index: Option<usize>,
    pub kind: TankType,
    pub volume_l: f64,
    pub work_pressure_bar: f64,
    pub begin_pressure_bar: f64,
    pub end_pressure_bar: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Water {
    Fresh,
    Salt,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Salinity {
    pub water: Water,
    pub density_kg_m3: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecoKind {
    Ndl,
    SafetyStop,
    DecoStop,
    DeepStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Deco {
    pub kind: DecoKind,
    pub time_s: u32,
    pub depth_m: f64,
}

/// One decoded sample value at a given point in the profile's time
/// series. `Vendor` borrows from the blob it was decoded from rather
/// than copying, so its lifetime is tied to the call that produced it —
/// an actual borrow-checker contract, not just a documented one.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample<'a> {
    Time(u32),
    Depth(f64),
    Pressure { tank_index: usize, bar: f64 },
    Temperature(f64),
    Event { kind: u32, time_offset: u32, flags: u32, value: u32 },
    Rbt(u32),
    Heartbeat(u32),
    Bearing(u32),
    Vendor { kind: u8, raw_slice: &'a [u8] },
    Setpoint(f64),
    Ppo2(f64),
    Cns(f64),
    Deco(Deco),
    GasMix { index: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_mix_dedup_values_are_valid() {
        let air = GasMix::from_o2_he_percent(21, 0);
        let ean32 = GasMix::from_o2_he_percent(32, 0);
        assert!(air.is_valid());
        assert!(ean32.is_valid());
    }

    #[test]
    fn fingerprint_slice() {
        let blob = DiveBlob {
            bytes: vec![0, 1, 2, 3, 4, 5],
            fingerprint_offset: 2,
            fingerprint_len: 3,
        };
        assert_eq!(blob.fingerprint(), &[2, 3, 4]);
    }
}
