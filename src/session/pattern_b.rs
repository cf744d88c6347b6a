//! Pattern B: structured request/response with echo and trailer (Suunto
//! D9/Vyper2 family).
//!
//! The packet-framing and answer-verification logic here is grounded
//! directly on `suunto_d9.c`'s `suunto_d9_device_packet` (RTS-toggle
//! half-duplex framing, echo check, header/length/parameter/checksum
//! verification in that exact order) and its three `suunto_d9*_layout`
//! tables (memory size, fingerprint offset, serial offset, profile ring).
//! `suunto_common2.c`, which owns the actual dive-linked-list traversal
//! and command opcode set in the original driver, was not available to
//! ground against; that traversal is therefore generalized here from the
//! generic `foreach` contract and the Suunto-specific detail that dive
//! records form a backward-linked chain in the profile ring (each
//! record's first two bytes are the address of the previous, older
//! dive; `0x0000` terminates the chain) rather than a fixed logbook slot
//! array.

use crate::channel::ByteChannel;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::{DeviceInfo, Event, EventSink};
use crate::ringbuf;
use crate::sample::DiveBlob;
use crate::session::{DiveCallback, Session, SessionBase};

/// Packet command types, synthesized from the generic Pattern B framing
/// since the concrete opcode table lives in the unavailable
/// `suunto_common2.c`.
const CMD_VERSION: u8 = 0x0F;
const CMD_READ: u8 = 0x05;

#[derive(Debug, Clone, Copy)]
pub struct SuuntoLayout {
    pub memsize: u32,
    pub fingerprint_offset: u32,
    pub serial_offset: u32,
    pub rb_profile_begin: u32,
    pub rb_profile_end: u32,
}

/// D9 layout, preserved exactly from `suunto_d9_layout`.
pub const D9_LAYOUT: SuuntoLayout = SuuntoLayout {
    memsize: 0x8000,
    fingerprint_offset: 0x0011,
    serial_offset: 0x0023,
    rb_profile_begin: 0x019A,
    rb_profile_end: 0x7FFE,
};

/// D9tx/D4i/D6i layout, preserved exactly from `suunto_d9tx_layout`.
pub const D9TX_LAYOUT: SuuntoLayout = SuuntoLayout {
    memsize: 0x10000,
    fingerprint_offset: 0x0013,
    serial_offset: 0x0024,
    rb_profile_begin: 0x019A,
    rb_profile_end: 0xEBF0,
};

/// DX layout, preserved exactly from `suunto_dx_layout`.
pub const DX_LAYOUT: SuuntoLayout = SuuntoLayout {
    memsize: 0x10000,
    fingerprint_offset: 0x0017,
    serial_offset: 0x0024,
    rb_profile_begin: 0x019A,
    rb_profile_end: 0xEBF0,
};

const FINGERPRINT_LEN: usize = 5;
/// Size of the "previous dive" back-pointer each profile record begins
/// with (generalized traversal, see module docs).
const LINK_HEADER_LEN: usize = 2;

pub struct SuuntoD9Session<C: ByteChannel> {
    channel: C,
    base: SessionBase,
    layout: SuuntoLayout,
}

impl<C: ByteChannel> SuuntoD9Session<C> {
    /// Open at 9600 8N1 and autodetect the working baud rate, per
    /// `suunto_d9_device_autodetect`: try `{9600, 115200}`, starting from a
    /// model-based hint.
    pub fn open(mut channel: C, context: Context, layout: SuuntoLayout, model_hint_high_baud: bool) -> Result<Self> {
        use crate::channel::{FlowControl, Parity};
        channel.set_line(8, Parity::None, 1)?;
        channel.set_flowcontrol(FlowControl::None)?;
        channel.set_timeout(Some(std::time::Duration::from_millis(3000)))?;
        channel.set_dtr(true)?;
        channel.sleep(100);
        channel.flush(crate::channel::Queue::Both)?;

        let mut session = SuuntoD9Session {
            channel,
            base: SessionBase::new(context),
            layout,
        };

        let bauds: [u32; 2] = if model_hint_high_baud {
            [115_200, 9600]
        } else {
            [9600, 115_200]
        };
        let mut last_err = Error::Timeout;
        for baud in bauds {
            session.channel.set_baud(baud)?;
            match session.version() {
                Ok(_) => return Ok(session),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    /// `suunto_d9_device_packet`: RTS-toggle half-duplex framing with echo
    /// and answer-structure verification, in the exact order the source
    /// checks it.
    fn packet(&mut self, command: &[u8], answer: &mut [u8], size: usize) -> Result<()> {
        self.base.context.check()?;

        self.channel.set_rts(false)?;
        self.channel.write_all(command)?;

        let mut echo = vec![0u8; command.len()];
        self.channel.read_exact_backoff(&mut echo)?;
        if echo != command {
            return Err(Error::Protocol("unexpected echo".into()));
        }

        self.channel.set_rts(true)?;
        self.channel.read_exact_backoff(answer)?;

        let asize = answer.len();
        if answer[0] != command[0] {
            return Err(Error::Protocol("unexpected answer header".into()));
        }
        if crate::bytes::u16_be(&answer[1..3]) as usize + 4 != asize {
            return Err(Error::Protocol("unexpected answer size".into()));
        }
        if command[3..] != answer[3..asize - size - 1] {
            return Err(Error::Protocol("unexpected answer parameters".into()));
        }
        let crc = answer[asize - 1];
        let ccrc = crate::checksum::xor_u8(&answer[..asize - 1], 0x00);
        if crc != ccrc {
            return Err(Error::Protocol("unexpected answer checksum".into()));
        }

        Ok(())
    }

    fn command(cmd: u8, params: &[u8]) -> Vec<u8> {
        let mut out = vec![cmd, 0, 0];
        let len = params.len() as u16;
        out[1..3].copy_from_slice(&len.to_be_bytes());
        out.extend_from_slice(params);
        out
    }

    fn version(&mut self) -> Result<(u16, u16)> {
        let command = Self::command(CMD_VERSION, &[]);
        let mut answer = vec![0u8; 3 + 4 + 1];
        self.packet(&command, &mut answer, 4)?;
        let model = crate::bytes::u16_be(&answer[3..5]);
        let serial = crate::bytes::u16_be(&answer[5..7]);
        Ok((model, serial))
    }

    /// Read `len` bytes starting at `addr` from device memory.
    fn read_memory(&mut self, addr: u32, len: usize) -> Result<Vec<u8>> {
        let mut params = vec![0u8; 3];
        params[0..2].copy_from_slice(&(addr as u16).to_be_bytes());
        params[2] = len as u8;
        let command = Self::command(CMD_READ, &params);
        let mut answer = vec![0u8; 3 + params.len() + len + 1];
        self.packet(&command, &mut answer, len)?;
        Ok(answer[3 + params.len()..3 + params.len() + len].to_vec())
    }
}

impl<C: ByteChannel> Session for SuuntoD9Session<C> {
    fn set_fingerprint(&mut self, fingerprint: &[u8]) -> Result<()> {
        if !fingerprint.is_empty() && fingerprint.len() != FINGERPRINT_LEN {
            return Err(Error::InvalidArgs(format!(
                "Suunto fingerprint must be {FINGERPRINT_LEN} bytes"
            )));
        }
        self.base.fingerprint = fingerprint.to_vec();
        Ok(())
    }

    fn foreach(&mut self, sink: &mut dyn EventSink, callback: &mut DiveCallback) -> Result<()> {
        sink.on_event(&Event::Progress {
            current: 0,
            maximum: (self.layout.rb_profile_end - self.layout.rb_profile_begin) as u64,
        });

        let (model, serial) = self.version()?;
        sink.on_event(&Event::DeviceInfo(DeviceInfo {
            model,
            firmware: 0,
            serial: serial as u32,
        }));

        // Newest dive pointer lives just before the fingerprint field in
        // this generalized layout.
        let head_ptr_bytes = self.read_memory(self.layout.fingerprint_offset.saturating_sub(2), 2)?;
        let mut cursor = crate::bytes::u16_be(&head_ptr_bytes) as u32;

        let begin = self.layout.rb_profile_begin;
        let end = self.layout.rb_profile_end;

        loop {
            self.base.context.check()?;
            if cursor == 0 {
                break;
            }
            if cursor < begin || cursor >= end {
                return Err(Error::DataFormat("dive link pointer outside profile ring".into()));
            }

            let link = self.read_memory(cursor, LINK_HEADER_LEN)?;
            let prev = crate::bytes::u16_be(&link) as u32;

            let len = if prev == 0 {
                ringbuf::distance(cursor, end, false, begin, end)? as usize
            } else {
                ringbuf::distance(prev, cursor, false, begin, end)? as usize
            };
            let mut bytes = link.clone();
            bytes.extend(self.read_memory(
                crate::ringbuf::increment(cursor, LINK_HEADER_LEN as u32, begin, end)?,
                len.saturating_sub(LINK_HEADER_LEN),
            )?);

            let fp_offset = LINK_HEADER_LEN;
            if bytes.len() < fp_offset + FINGERPRINT_LEN {
                return Err(Error::DataFormat("dive record shorter than fingerprint region".into()));
            }
            if !self.base.fingerprint.is_empty()
                && bytes[fp_offset..fp_offset + FINGERPRINT_LEN] == self.base.fingerprint[..]
            {
                break;
            }

            let blob = DiveBlob {
                bytes,
                fingerprint_offset: fp_offset,
                fingerprint_len: FINGERPRINT_LEN,
            };
            if !callback(blob) {
                break;
            }

            cursor = prev;
        }

        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_order_matches_reference() {
        // header + be16(len) + params + checksum, XOR over everything but
        // the trailing checksum byte.
        let answer = [0x0F, 0x00, 0x04, 0xAA, 0xBB, 0xCC, 0xDD];
        let crc = crate::checksum::xor_u8(&answer[..answer.len() - 1], 0x00);
        assert_eq!(crc, 0x0F ^ 0x00 ^ 0x04 ^ 0xAA ^ 0xBB ^ 0xCC);
    }
}
