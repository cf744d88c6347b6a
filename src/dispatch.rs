//! `FamilyTag`: the closed enum that stands in for a runtime vtable
//! dispatch over device families, binding a family identifier to its
//! concrete [`crate::session::Session`] and [`crate::parser::Parser`]
//! implementations. New families are added by extending this enum and
//! its two `open_session`/`open_parser` match arms, not by touching
//! callers.

use crate::channel::ByteChannel;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::parser::aladin::UwatecAladinParser;
use crate::parser::cobalt::AtomicsCobaltParser;
use crate::parser::oceanic::{OceanicAtom2Parser, OceanicLayout};
use crate::parser::ostc::OstcParser;
use crate::parser::shearwater::{ShearwaterParser, ShearwaterVariant};
use crate::parser::suunto_d9::{SuuntoD9Model, SuuntoD9Parser};
use crate::parser::zeagle::ZeagleParser;
use crate::parser::Parser;
use crate::session::pattern_a::HwFrogSession;
use crate::session::pattern_b::{SuuntoD9Session, D9TX_LAYOUT, DX_LAYOUT, D9_LAYOUT};
use crate::session::pattern_c::UwatecAladinSession;
use crate::session::pattern_d::ZeagleSession;
use crate::session::Session;

/// Every vendor family the core supports. Each variant carries
/// whatever identification the family needs to pick a concrete layout or
/// decode table (a model byte, a serial number) — the session/parser
/// construction itself takes no further runtime branching once a tag is
/// chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyTag {
    HwOstcFrog,
    SuuntoD9,
    SuuntoD9tx,
    SuuntoDx,
    UwatecAladin,
    ZeagleN2ition3,
    OceanicAtom2 { layout: OceanicLayout },
    AtomicsCobalt,
    ShearwaterPredator,
    ShearwaterPetrel,
}

/// Construct the concrete [`Session`] for `tag` over `channel`.
pub fn open_session<C: ByteChannel + 'static>(
    tag: FamilyTag,
    channel: C,
    context: Context,
) -> Result<Box<dyn Session>> {
    match tag {
        FamilyTag::HwOstcFrog => Ok(Box::new(HwFrogSession::open(channel, context)?)),
        FamilyTag::SuuntoD9 => Ok(Box::new(SuuntoD9Session::open(channel, context, D9_LAYOUT, false)?)),
        FamilyTag::SuuntoD9tx => Ok(Box::new(SuuntoD9Session::open(channel, context, D9TX_LAYOUT, true)?)),
        FamilyTag::SuuntoDx => Ok(Box::new(SuuntoD9Session::open(channel, context, DX_LAYOUT, true)?)),
        FamilyTag::UwatecAladin => Ok(Box::new(UwatecAladinSession::open(channel, context)?)),
        FamilyTag::ZeagleN2ition3 => Ok(Box::new(ZeagleSession::open(channel, context)?)),
        FamilyTag::OceanicAtom2 { .. }
        | FamilyTag::AtomicsCobalt
        | FamilyTag::ShearwaterPredator
        | FamilyTag::ShearwaterPetrel => Err(Error::Unsupported),
    }
}

/// Construct the concrete [`Parser`] for `tag`, given the device's serial
/// number and (where the family's date decode needs it) the host's current
/// year for epoch completion.
pub fn open_parser(tag: FamilyTag, serial: u32, host_year: i32) -> Result<Box<dyn Parser>> {
    match tag {
        FamilyTag::HwOstcFrog => Ok(Box::new(OstcParser::new())),
        FamilyTag::SuuntoD9 => Ok(Box::new(SuuntoD9Parser::new(SuuntoD9Model::D9, serial))),
        FamilyTag::SuuntoD9tx => Ok(Box::new(SuuntoD9Parser::new(SuuntoD9Model::D9, serial))),
        FamilyTag::SuuntoDx => Ok(Box::new(SuuntoD9Parser::new(SuuntoD9Model::D4, serial))),
        FamilyTag::UwatecAladin => Ok(Box::new(UwatecAladinParser::new())),
        FamilyTag::ZeagleN2ition3 => Ok(Box::new(ZeagleParser::new())),
        FamilyTag::OceanicAtom2 { layout } => Ok(Box::new(OceanicAtom2Parser::new(layout, serial, host_year))),
        FamilyTag::AtomicsCobalt => Ok(Box::new(AtomicsCobaltParser::new())),
        FamilyTag::ShearwaterPredator => Ok(Box::new(ShearwaterParser::new(ShearwaterVariant::Predator, serial))),
        FamilyTag::ShearwaterPetrel => Ok(Box::new(ShearwaterParser::new(ShearwaterVariant::Petrel, serial))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::FixtureChannel;

    #[test]
    fn oceanic_parser_dispatches_without_a_session() {
        let parser = open_parser(FamilyTag::OceanicAtom2 { layout: OceanicLayout::Default }, 1, 2024);
        assert!(parser.is_ok());
    }

    #[test]
    fn session_only_family_has_no_session_constructor() {
        let result = open_session(FamilyTag::AtomicsCobalt, FixtureChannel::new(), Context::new());
        assert!(matches!(result, Err(Error::Unsupported)));
    }

    #[test]
    fn aladin_session_opens_over_a_fixture_channel() {
        let result = open_session(FamilyTag::UwatecAladin, FixtureChannel::new(), Context::new());
        assert!(result.is_ok());
    }
}
