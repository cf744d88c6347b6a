//! Generic `Parser` contract and the seven family-specific decoders.
//! Like [`crate::session`], this is a capability-set trait with
//! closed dispatch by [`crate::dispatch::FamilyTag`]; every family binds a
//! blob with `set_data` and decodes it lazily behind a two-level cache
//! (`HeaderCache`/`ProfileCache`).

pub mod aladin;
pub mod cobalt;
pub mod oceanic;
pub mod ostc;
pub mod shearwater;
pub mod suunto_d9;
pub mod zeagle;

use crate::datetime::ParsedDateTime;
use crate::error::{Error, Result};
use crate::sample::{DecoKind, GasMix, Salinity, Tank};

/// Callback signature for `samples_foreach`: receives each decoded sample
/// in time order, returns `false` to stop the traversal early.
pub type SampleCallback<'a> = dyn FnMut(crate::sample::Sample<'_>) -> bool + 'a;

/// Query selector for [`Parser::get_field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    DiveTime,
    MaxDepth,
    AvgDepth,
    GasMixCount,
    GasMix(usize),
    Salinity,
    Atmospheric,
    TempSurface,
    TempMin,
    TempMax,
    TankCount,
    Tank(usize),
    DiveMode,
    String(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiveMode {
    Air,
    Nitrox,
    Gauge,
    Freedive,
    Ccr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Seconds(u32),
    Depth(f64),
    Count(usize),
    GasMix(GasMix),
    Salinity(Salinity),
    Pressure(f64),
    Temperature(f64),
    Tank(Tank),
    DiveMode(DiveMode),
    /// `(description, value)`; `value` is freshly allocated text the
    /// caller owns.
    Text(String, String),
}

pub trait Parser {
    fn set_data(&mut self, data: Vec<u8>) -> Result<()>;

    fn get_datetime(&mut self) -> Result<ParsedDateTime>;

    fn get_field(&mut self, field: Field) -> Result<FieldValue>;

    fn samples_foreach(&mut self, callback: &mut SampleCallback) -> Result<()>;
}

/// Shared gas-mix deduplication table: unique `(O2, He)` pairs get a
/// stable zero-based index in order of first appearance, capped at
/// `max_entries`.
#[derive(Debug, Default)]
pub struct GasMixTable {
    mixes: Vec<GasMix>,
    max_entries: usize,
}

impl GasMixTable {
    pub fn new(max_entries: usize) -> Self {
        GasMixTable {
            mixes: Vec::new(),
            max_entries,
        }
    }

    /// Look up `(o2_percent, he_percent)`, inserting it if new. Returns its
    /// stable index, or `Error::NoMemory` if the table is full.
    pub fn index_of(&mut self, o2_percent: u8, he_percent: u8) -> Result<usize> {
        let mix = GasMix::from_o2_he_percent(o2_percent, he_percent);
        if let Some(i) = self.mixes.iter().position(|m| *m == mix) {
            return Ok(i);
        }
        if self.mixes.len() >= self.max_entries {
            return Err(Error::NoMemory("gas mix table full".into()));
        }
        self.mixes.push(mix);
        Ok(self.mixes.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.mixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mixes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<GasMix> {
        self.mixes.get(index).copied()
    }
}

/// Per-sample deco tracker for the Atomics Cobalt family: the
/// `in_deco` flag is latched, not re-derived fresh from each sample.
#[derive(Debug, Default, Clone, Copy)]
pub struct CobaltDecoLatch {
    in_deco: bool,
}

impl CobaltDecoLatch {
    pub fn update(&mut self, ndl_seconds: u32, violation: bool) -> (DecoKind, u32) {
        if ndl_seconds > 0 {
            self.in_deco = false;
        } else if violation {
            self.in_deco = true;
        }
        let kind = if self.in_deco {
            DecoKind::DecoStop
        } else {
            DecoKind::Ndl
        };
        (kind, ndl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_mix_table_dedups_and_assigns_stable_indices() {
        let mut table = GasMixTable::new(8);
        assert_eq!(table.index_of(21, 0).unwrap(), 0);
        assert_eq!(table.index_of(32, 0).unwrap(), 1);
        assert_eq!(table.index_of(21, 0).unwrap(), 0);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn gas_mix_table_overflow_is_no_memory() {
        let mut table = GasMixTable::new(1);
        table.index_of(21, 0).unwrap();
        assert!(matches!(table.index_of(32, 0), Err(Error::NoMemory(_))));
    }

    #[test]
    fn cobalt_latch_sets_on_violation_and_clears_on_positive_ndl() {
        let mut latch = CobaltDecoLatch::default();
        assert_eq!(latch.update(60, false), (DecoKind::Ndl, 60));
        assert_eq!(latch.update(0, true).0, DecoKind::DecoStop);
        // Latched: stays in deco even without a fresh violation bit.
        assert_eq!(latch.update(0, false).0, DecoKind::DecoStop);
        // Clears only when NDL goes positive again.
        assert_eq!(latch.update(30, false).0, DecoKind::Ndl);
    }
}
