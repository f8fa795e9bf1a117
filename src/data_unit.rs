//! Extraction of the _data units_ which make up the payload of a VBI PES packet.
//!
//! Each data unit is a _data_unit_id_ byte, a _data_unit_length_ byte, and then `length` bytes of
//! payload.  Byte-serial services (Teletext, VPS, WSS, Closed Caption) become one
//! [`Sliced`](../service/struct.Sliced.html) record per unit.  Monochrome sample units carry one
//! segment of a line of raw luminance samples, and are reassembled into the frame's raw buffer.

use crate::demux::DemuxError;
use crate::frame::{Frame, LineOrder, RawCursor, SAMPLES_PER_LINE};
use crate::pes::DataIdentifier;
use crate::service::{LineAddress, ScanningSystem, ServiceParams, Sliced};
use log::trace;

/// Values of the _data_unit_id_ field.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DataUnitId {
    /// EBU Teletext, non-subtitle data
    EbuTeletextNonSubtitle,
    /// EBU Teletext, subtitle data
    EbuTeletextSubtitle,
    /// Widescreen signalling for 525-line systems, per EIA-J CPR-1204
    WssCpr1204,
    /// Closed Caption for 525-line systems
    ClosedCaption525,
    /// Monochrome 4:2:2 samples from a 525-line system
    MonochromeSamples525,
    /// Video Programming System
    Vps,
    /// Widescreen Signalling
    Wss,
    /// Closed Caption for 625-line systems
    ClosedCaption,
    /// Monochrome 4:2:2 samples
    MonochromeSamples,
    /// `data_unit_id` for stuffing
    Stuffing,
    /// A value not understood by this implementation
    Unknown(u8),
}
impl DataUnitId {
    /// True for the two EBU Teletext data unit types
    pub fn is_teletext(self) -> bool {
        matches!(
            self,
            DataUnitId::EbuTeletextNonSubtitle | DataUnitId::EbuTeletextSubtitle
        )
    }

    /// True for the types carrying segments of raw sample lines
    pub fn is_raw(self) -> bool {
        matches!(
            self,
            DataUnitId::MonochromeSamples | DataUnitId::MonochromeSamples525
        )
    }
}
impl From<u8> for DataUnitId {
    fn from(v: u8) -> Self {
        match v {
            0x02 => DataUnitId::EbuTeletextNonSubtitle,
            0x03 => DataUnitId::EbuTeletextSubtitle,
            0xb4 => DataUnitId::WssCpr1204,
            0xb5 => DataUnitId::ClosedCaption525,
            0xb6 => DataUnitId::MonochromeSamples525,
            0xc3 => DataUnitId::Vps,
            0xc4 => DataUnitId::Wss,
            0xc5 => DataUnitId::ClosedCaption,
            0xc6 => DataUnitId::MonochromeSamples,
            0xff => DataUnitId::Stuffing,
            _ => DataUnitId::Unknown(v),
        }
    }
}
impl From<DataUnitId> for u8 {
    fn from(id: DataUnitId) -> Self {
        match id {
            DataUnitId::EbuTeletextNonSubtitle => 0x02,
            DataUnitId::EbuTeletextSubtitle => 0x03,
            DataUnitId::WssCpr1204 => 0xb4,
            DataUnitId::ClosedCaption525 => 0xb5,
            DataUnitId::MonochromeSamples525 => 0xb6,
            DataUnitId::Vps => 0xc3,
            DataUnitId::Wss => 0xc4,
            DataUnitId::ClosedCaption => 0xc5,
            DataUnitId::MonochromeSamples => 0xc6,
            DataUnitId::Stuffing => 0xff,
            DataUnitId::Unknown(v) => v,
        }
    }
}

/// Maximum value of the _n_pixels_ field of a raw sample data unit
pub const MAX_PIXELS_PER_SEGMENT: usize = 251;

const FIRST_SEGMENT: u8 = 0b1000_0000;
const LAST_SEGMENT: u8 = 0b0100_0000;

/// How extraction of a packet's data units came to stop without error.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Extracted {
    /// every data unit in the packet was handled
    PacketDone,
    /// the data unit at the current offset belongs to the next frame; the current frame must be
    /// delivered, and the frame state reset, before extraction continues from this offset
    NewFrame,
}

#[derive(Debug, PartialEq, Eq)]
enum UnitOutcome {
    Consumed,
    NewFrame,
}

/// Extract the data units in `units` (the packet payload following the _data_identifier_),
/// starting from `*offset`, into `frame`.
///
/// On return `*offset` is the position at which extraction must resume.  After an error this
/// position depends on the error; see [`DemuxError`](../demux/enum.DemuxError.html).
pub(crate) fn extract(
    frame: &mut Frame,
    system: ScanningSystem,
    data_identifier: DataIdentifier,
    units: &[u8],
    offset: &mut usize,
) -> Result<Extracted, DemuxError> {
    while *offset < units.len() {
        let rest = &units[*offset..];
        if rest.len() < 2 {
            // a lone stuffing byte may pad out the packet
            let id = rest[0];
            *offset = units.len();
            if DataUnitId::from(id) == DataUnitId::Stuffing {
                break;
            }
            return Err(DemuxError::DataUnitOverflow {
                data_unit_id: id,
                length: 0,
                available: 0,
            });
        }
        let id = DataUnitId::from(rest[0]);
        let length = usize::from(rest[1]);
        if rest.len() - 2 < length {
            *offset = units.len();
            return Err(DemuxError::DataUnitOverflow {
                data_unit_id: rest[0],
                length,
                available: rest.len() - 2,
            });
        }
        let unit = &rest[2..2 + length];
        let outcome = if data_identifier.allows_all_data_units() || id.is_teletext() {
            extract_unit(frame, system, id, unit)
        } else {
            Ok(UnitOutcome::Consumed)
        };
        match outcome {
            Ok(UnitOutcome::Consumed) => {
                *offset += 2 + length;
            }
            Ok(UnitOutcome::NewFrame) => return Ok(Extracted::NewFrame),
            Err(e) => {
                match e {
                    DemuxError::RawDataIncomplete => (),
                    DemuxError::SlicedBufferOverflow | DemuxError::RawBufferOverflow => {
                        *offset = units.len()
                    }
                    _ => *offset += 2 + length,
                }
                return Err(e);
            }
        }
    }
    Ok(Extracted::PacketDone)
}

fn extract_unit(
    frame: &mut Frame,
    system: ScanningSystem,
    id: DataUnitId,
    unit: &[u8],
) -> Result<UnitOutcome, DemuxError> {
    if let Some(params) = id.service_params() {
        extract_sliced(frame, system, params, unit)
    } else if id.is_raw() {
        extract_raw(frame, system, id, unit)
    } else {
        // stuffing, and types we don't know
        Ok(UnitOutcome::Consumed)
    }
}

fn check_line_order(
    frame: &Frame,
    id: DataUnitId,
    addr: LineAddress,
    lofp: u8,
    line: u32,
) -> Result<Option<UnitOutcome>, DemuxError> {
    match frame.line_order(addr.field, line) {
        LineOrder::Next => Ok(None),
        LineOrder::NewFrame => Ok(Some(UnitOutcome::NewFrame)),
        LineOrder::Duplicate => Err(DemuxError::DataUnitLineNumber {
            data_unit_id: id.into(),
            line_offset: lofp,
        }),
    }
}

fn extract_sliced(
    frame: &mut Frame,
    system: ScanningSystem,
    params: &ServiceParams,
    unit: &[u8],
) -> Result<UnitOutcome, DemuxError> {
    if unit.len() < params.min_unit_len() {
        return Err(DemuxError::DataUnitLength {
            data_unit_id: params.unit.into(),
            length: unit.len() as u8,
        });
    }
    let lofp = unit[0];
    let mut data = &unit[1..];
    if let Some(framing_code) = params.framing_code {
        if data[0] != framing_code {
            // custom framing codes can't be represented in a Sliced record
            trace!(
                "{:?}: skipping unit with framing code {:#04x}",
                params.unit,
                data[0]
            );
            return Ok(UnitOutcome::Consumed);
        }
        data = &data[1..];
    }
    let addr = LineAddress::from_byte(lofp);
    if !params.valid_line(addr) {
        return Err(DemuxError::DataUnitLineNumber {
            data_unit_id: params.unit.into(),
            line_offset: lofp,
        });
    }
    let line = addr.frame_line(system);
    if let Some(line) = line {
        if let Some(outcome) = check_line_order(frame, params.unit, addr, lofp, line)? {
            return Ok(outcome);
        }
    }
    let mut sliced = Sliced {
        id: params.id,
        line: line.unwrap_or(0),
        ..Sliced::EMPTY
    };
    for (dst, src) in sliced.data.iter_mut().zip(&data[..params.payload_len]) {
        *dst = src.reverse_bits();
    }
    frame.push_sliced(sliced)?;
    if let Some(line) = line {
        frame.commit_line(addr.field, line);
    }
    frame.count_unit();
    Ok(UnitOutcome::Consumed)
}

fn extract_raw(
    frame: &mut Frame,
    system: ScanningSystem,
    id: DataUnitId,
    unit: &[u8],
) -> Result<UnitOutcome, DemuxError> {
    let bad_length = || DemuxError::DataUnitLength {
        data_unit_id: id.into(),
        length: unit.len() as u8,
    };
    if unit.len() < 4 {
        return Err(bad_length());
    }
    let lofp = unit[0];
    let position = usize::from(unit[1]) << 8 | usize::from(unit[2]);
    let n_pixels = usize::from(unit[3]);
    if n_pixels > MAX_PIXELS_PER_SEGMENT
        || unit.len() < 4 + n_pixels
        || position + n_pixels > SAMPLES_PER_LINE
    {
        return Err(bad_length());
    }
    let samples = &unit[4..4 + n_pixels];
    let addr = LineAddress::from_byte(lofp);
    let line = addr
        .frame_line(system)
        .ok_or(DemuxError::DataUnitLineNumber {
            data_unit_id: id.into(),
            line_offset: lofp,
        })?;
    if !frame.has_raw() {
        return Ok(UnitOutcome::Consumed);
    }

    let cursor = if lofp & FIRST_SEGMENT != 0 {
        if let Some(open) = frame.take_raw_cursor() {
            frame.discard_raw_line(open.index);
            return Err(DemuxError::RawDataIncomplete);
        }
        if let Some(outcome) = check_line_order(frame, id, addr, lofp, line)? {
            return Ok(outcome);
        }
        let index = frame
            .raw_line_index(addr)
            .ok_or(DemuxError::RawBufferOverflow)?;
        frame.commit_line(addr.field, line);
        frame.discard_raw_line(index);
        RawCursor {
            addr,
            index,
            next_position: 0,
        }
    } else {
        let open = frame.take_raw_cursor().ok_or(DemuxError::RawSegmentLost)?;
        if open.addr != addr {
            frame.discard_raw_line(open.index);
            return Err(DemuxError::RawSegmentLost);
        }
        if position != open.next_position {
            frame.discard_raw_line(open.index);
            return Err(DemuxError::RawSegmentPosition {
                expected: open.next_position as u16,
                actual: position as u16,
            });
        }
        open
    };

    frame.write_raw(cursor.index, position, samples);
    frame.count_unit();
    if lofp & LAST_SEGMENT != 0 {
        frame.complete_raw_line(cursor.index);
    } else {
        frame.set_raw_cursor(RawCursor {
            next_position: position + n_pixels,
            ..cursor
        });
    }
    Ok(UnitOutcome::Consumed)
}
