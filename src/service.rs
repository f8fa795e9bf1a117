//! VBI services, line addressing and the sliced-line record produced for each decoded line.

use crate::data_unit::DataUnitId;
use bitflags::bitflags;
use std::fmt;
use std::ops::RangeInclusive;

bitflags! {
    /// A set of VBI services, as a bitmask.
    ///
    /// A single physical line can satisfy more than one service classification, so a
    /// [`Sliced`](struct.Sliced.html) record identifies its content with a set rather than a
    /// single value (e.g. Teletext system B lines are tagged both as _level 1.0_ and _level 2.5_
    /// Teletext).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Service: u32 {
        /// Teletext system B, level 1.0, 625-line systems
        const TELETEXT_B_L10_625 = 0x0000_0001;
        /// Teletext system B, level 2.5, 625-line systems
        const TELETEXT_B_L25_625 = 0x0000_0002;
        /// Teletext system B, any level
        const TELETEXT_B_625 = Self::TELETEXT_B_L10_625.bits() | Self::TELETEXT_B_L25_625.bits();
        /// Video Programming System, line 16
        const VPS = 0x0000_0004;
        /// Closed Caption on the first field of a 625-line system
        const CAPTION_625_F1 = 0x0000_0008;
        /// Closed Caption on the second field of a 625-line system
        const CAPTION_625_F2 = 0x0000_0010;
        /// Closed Caption on either field of a 625-line system
        const CAPTION_625 = Self::CAPTION_625_F1.bits() | Self::CAPTION_625_F2.bits();
        /// Closed Caption on the first field of a 525-line system
        const CAPTION_525_F1 = 0x0000_0020;
        /// Closed Caption on the second field of a 525-line system
        const CAPTION_525_F2 = 0x0000_0040;
        /// Closed Caption on either field of a 525-line system
        const CAPTION_525 = Self::CAPTION_525_F1.bits() | Self::CAPTION_525_F2.bits();
        /// Widescreen Signalling, 625-line systems
        const WSS_625 = 0x0000_0400;
        /// Widescreen Signalling per EIA-J CPR-1204, 525-line systems
        const WSS_CPR1204 = 0x0000_0800;
    }
}

impl Service {
    /// The number of meaningful payload bytes in a `Sliced` record carrying this service.
    pub fn payload_len(self) -> usize {
        if self.intersects(Service::TELETEXT_B_625) {
            42
        } else if self.intersects(Service::VPS) {
            13
        } else if self.intersects(Service::WSS_CPR1204) {
            3
        } else if self.intersects(Service::WSS_625 | Service::CAPTION_625 | Service::CAPTION_525) {
            2
        } else {
            0
        }
    }
}

/// The scanning system of the video signal from which the VBI lines were taken.  Determines how
/// a field-relative line offset maps to a frame line number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanningSystem {
    /// 525 lines, 29.97 frames per second (NTSC, PAL-M)
    Lines525,
    /// 625 lines, 25 frames per second (PAL, SECAM)
    Lines625,
}
impl ScanningSystem {
    /// frame line number of the line before the first line of the second field
    fn second_field_start(self) -> u32 {
        match self {
            ScanningSystem::Lines525 => 263,
            ScanningSystem::Lines625 => 313,
        }
    }
}
impl Default for ScanningSystem {
    fn default() -> Self {
        ScanningSystem::Lines625
    }
}

/// One of the two interlaced fields of a video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// The first field in transmission order
    First,
    /// The second field in transmission order
    Second,
}
impl Field {
    /// `0` for the first field, `1` for the second
    pub fn index(self) -> usize {
        match self {
            Field::First => 0,
            Field::Second => 1,
        }
    }
}

/// The _field_parity_ and _line_offset_ fields which begin the payload of most VBI data units.
///
/// The top two bits of the byte are not part of the address (they are reserved, or carry the
/// segment flags of a raw-sample data unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAddress {
    /// the field in which the line was transmitted
    pub field: Field,
    /// 1-based offset of the line within the field, or `0` if the line is undefined
    pub offset: u8,
}
impl LineAddress {
    /// Decode the address from a _field_parity_ / _line_offset_ byte.  A set _field_parity_ bit
    /// indicates the first field.
    pub fn from_byte(b: u8) -> LineAddress {
        LineAddress {
            field: if b & 0b0010_0000 != 0 {
                Field::First
            } else {
                Field::Second
            },
            offset: b & 0b0001_1111,
        }
    }

    /// The frame line number of this address in the given scanning system, or `None` if the
    /// line is undefined (`offset` of zero).
    pub fn frame_line(self, system: ScanningSystem) -> Option<u32> {
        frame_line(system, self.field, self.offset)
    }
}

/// Convert a field and a 1-based line offset within that field into a frame line number.
///
/// An offset of `0` denotes an undefined line, for which `None` is returned.
pub fn frame_line(system: ScanningSystem, field: Field, offset: u8) -> Option<u32> {
    if offset == 0 {
        return None;
    }
    Some(match field {
        Field::First => u32::from(offset),
        Field::Second => u32::from(offset) + system.second_field_start(),
    })
}

/// Framing and addressing rules for one byte-serial data unit type.
#[derive(Debug)]
pub(crate) struct ServiceParams {
    pub unit: DataUnitId,
    pub id: Service,
    /// bytes of service data following the line address (and framing code, if any)
    pub payload_len: usize,
    pub framing_code: Option<u8>,
    pub line_offsets: RangeInclusive<u8>,
    pub second_field: bool,
    pub undefined_line: bool,
}
impl ServiceParams {
    /// smallest acceptable _data_unit_length_
    pub fn min_unit_len(&self) -> usize {
        1 + self.framing_code.map_or(0, |_| 1) + self.payload_len
    }

    /// true if the given address is a legal location for this service
    pub fn valid_line(&self, addr: LineAddress) -> bool {
        if addr.offset == 0 {
            self.undefined_line
        } else {
            (self.second_field || addr.field == Field::First)
                && self.line_offsets.contains(&addr.offset)
        }
    }
}

// bit-reversed form of the Teletext framing code 0x27
const TELETEXT_FRAMING_CODE: u8 = 0xe4;

static SERVICES: [ServiceParams; 7] = [
    ServiceParams {
        unit: DataUnitId::EbuTeletextNonSubtitle,
        id: Service::TELETEXT_B_625,
        payload_len: 42,
        framing_code: Some(TELETEXT_FRAMING_CODE),
        line_offsets: 6..=22,
        second_field: true,
        undefined_line: true,
    },
    ServiceParams {
        unit: DataUnitId::EbuTeletextSubtitle,
        id: Service::TELETEXT_B_625,
        payload_len: 42,
        framing_code: Some(TELETEXT_FRAMING_CODE),
        line_offsets: 6..=22,
        second_field: true,
        undefined_line: true,
    },
    ServiceParams {
        unit: DataUnitId::Vps,
        id: Service::VPS,
        payload_len: 13,
        framing_code: None,
        line_offsets: 16..=16,
        second_field: false,
        undefined_line: false,
    },
    ServiceParams {
        unit: DataUnitId::Wss,
        id: Service::WSS_625,
        payload_len: 2,
        framing_code: None,
        line_offsets: 23..=23,
        second_field: false,
        undefined_line: false,
    },
    ServiceParams {
        unit: DataUnitId::ClosedCaption,
        id: Service::CAPTION_625,
        payload_len: 2,
        framing_code: None,
        line_offsets: 22..=22,
        second_field: true,
        undefined_line: false,
    },
    ServiceParams {
        unit: DataUnitId::WssCpr1204,
        id: Service::WSS_CPR1204,
        payload_len: 3,
        framing_code: None,
        line_offsets: 20..=20,
        second_field: true,
        undefined_line: false,
    },
    ServiceParams {
        unit: DataUnitId::ClosedCaption525,
        id: Service::CAPTION_525,
        payload_len: 2,
        framing_code: None,
        line_offsets: 21..=21,
        second_field: true,
        undefined_line: false,
    },
];

impl DataUnitId {
    /// The framing rules for this byte-serial data unit type, or `None` for types which are not
    /// decoded into `Sliced` records this way (stuffing, raw samples, unknown types).
    pub(crate) fn service_params(self) -> Option<&'static ServiceParams> {
        SERVICES.iter().find(|p| p.unit == self)
    }
}

/// Maximum number of payload bytes in a `Sliced` record.
pub const SLICED_PAYLOAD_SIZE: usize = 56;

/// One decoded VBI line.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Sliced {
    /// the service(s) carried by this line
    pub id: Service,
    /// frame line number, or `0` if the line number is unknown
    pub line: u32,
    /// service data, in natural bit order.  Only the first `id.payload_len()` bytes are
    /// meaningful; the remainder are zero.
    pub data: [u8; SLICED_PAYLOAD_SIZE],
}
impl Sliced {
    /// An empty record, with no service and unknown line.
    pub const EMPTY: Sliced = Sliced {
        id: Service::empty(),
        line: 0,
        data: [0; SLICED_PAYLOAD_SIZE],
    };

    /// The meaningful prefix of `data`
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.id.payload_len()]
    }
}
impl Default for Sliced {
    fn default() -> Self {
        Sliced::EMPTY
    }
}
impl fmt::Debug for Sliced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("Sliced")
            .field("id", &self.id)
            .field("line", &self.line)
            .field("payload", &self.payload())
            .finish()
    }
}
