//! Generic `Session` contract and the four wire-pattern implementations.
//! `Session` is a capability-set trait with closed dispatch by
//! [`crate::dispatch::FamilyTag`]: optional, family-dependent operations
//! default to `Unsupported` rather than being absent from the trait,
//! the way `Device`/`ReportParser` traits elsewhere in this style
//! supply defaulted optional methods.

pub mod pattern_a;
pub mod pattern_b;
pub mod pattern_c;
pub mod pattern_d;

use crate::context::Context;
use crate::datetime::ParsedDateTime;
use crate::error::{Error, Result};
use crate::event::EventSink;
use crate::sample::DiveBlob;

/// Fields common to every concrete session, embedded rather than
/// inherited.
pub struct SessionBase {
    pub context: Context,
    pub fingerprint: Vec<u8>,
}

impl SessionBase {
    pub fn new(context: Context) -> Self {
        Self {
            context,
            fingerprint: Vec::new(),
        }
    }
}

/// Callback signature for `foreach`: receives each dive newest-first,
/// returns `false` to stop the traversal cleanly.
pub type DiveCallback<'a> = dyn FnMut(DiveBlob) -> bool + 'a;

pub trait Session {
    fn set_fingerprint(&mut self, fingerprint: &[u8]) -> Result<()>;

    fn foreach(&mut self, sink: &mut dyn EventSink, callback: &mut DiveCallback) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn read(&mut self, _addr: u32, _buf: &mut [u8]) -> Result<()> {
        Err(Error::Unsupported)
    }

    fn write(&mut self, _addr: u32, _data: &[u8]) -> Result<()> {
        Err(Error::Unsupported)
    }

    fn dump(&mut self) -> Result<Vec<u8>> {
        Err(Error::Unsupported)
    }

    fn reset_maxdepth(&mut self) -> Result<()> {
        Err(Error::Unsupported)
    }

    fn set_clock(&mut self, _datetime: ParsedDateTime) -> Result<()> {
        Err(Error::Unsupported)
    }

    fn display_text(&mut self, _text: &str) -> Result<()> {
        Err(Error::Unsupported)
    }

    fn custom_text(&mut self, _text: &str) -> Result<()> {
        Err(Error::Unsupported)
    }

    fn config_read(&mut self, _slot: u32, _out: &mut [u8]) -> Result<()> {
        Err(Error::Unsupported)
    }

    fn config_write(&mut self, _slot: u32, _data: &[u8]) -> Result<()> {
        Err(Error::Unsupported)
    }

    fn config_reset(&mut self) -> Result<()> {
        Err(Error::Unsupported)
    }

    fn fw_update(&mut self, _hex_image: &[u8]) -> Result<()> {
        Err(Error::Unsupported)
    }
}

/// Given a logbook's latest-slot index and the total slot count, walk
/// backwards (modulo `slot_count`) calling `visit(slot_index)` until it
/// returns `Ok(false)` (fingerprint matched / caller stop) or every slot
/// has been visited once. Available to any pattern whose logbook is a
/// plain modulo-indexed slot array (§4.2's newest-first + wraparound +
/// at-most-once-per-slot contract); patterns with a linked-list or
/// paired-pointer logbook (B, D) thread extra per-step state the single
/// `visit(slot_index)` shape doesn't carry, so they implement the walk
/// inline instead.
pub fn walk_logbook_backwards(
    latest: usize,
    slot_count: usize,
    mut visit: impl FnMut(usize) -> Result<bool>,
) -> Result<()> {
    if slot_count == 0 {
        return Ok(());
    }
    let mut idx = latest;
    for _ in 0..slot_count {
        if !visit(idx)? {
            return Ok(());
        }
        idx = if idx == 0 { slot_count - 1 } else { idx - 1 };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backward_walk_wraps_and_stops() {
        let mut visited = Vec::new();
        walk_logbook_backwards(2, 5, |idx| {
            visited.push(idx);
            Ok(idx != 0)
        })
        .unwrap();
        assert_eq!(visited, vec![2, 1, 0]);
    }

    #[test]
    fn backward_walk_from_low_index_wraps() {
        let mut visited = Vec::new();
        walk_logbook_backwards(0, 3, |idx| {
            visited.push(idx);
            Ok(true)
        })
        .unwrap();
        assert_eq!(visited, vec![0, 2, 1]);
    }
}
