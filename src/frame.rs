//! State for the video frame currently being assembled from data units.

use crate::demux::DemuxError;
use crate::service::{Field, LineAddress, Sliced};
use fixedbitset::FixedBitSet;

/// Number of luminance samples in one line of a raw-sample data unit (ITU-R BT.601 at 13.5MHz)
pub const SAMPLES_PER_LINE: usize = 720;

/// How a line relates to the lines already seen in the current frame
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum LineOrder {
    /// the line follows those already seen
    Next,
    /// the line belongs to the next frame
    NewFrame,
    /// the line has already been seen in this frame
    Duplicate,
}

/// Position within a raw-sample line whose segments are still arriving
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) struct RawCursor {
    pub addr: LineAddress,
    pub index: usize,
    pub next_position: usize,
}

#[derive(Debug)]
struct RawBuffer {
    samples: Vec<u8>,
    complete: FixedBitSet,
    lines_per_field: usize,
}
impl RawBuffer {
    fn new(lines_per_field: usize) -> RawBuffer {
        RawBuffer {
            samples: vec![0; 2 * lines_per_field * SAMPLES_PER_LINE],
            complete: FixedBitSet::with_capacity(2 * lines_per_field),
            lines_per_field,
        }
    }

    fn clear(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = 0);
        self.complete.clear();
    }

    fn line_mut(&mut self, index: usize) -> &mut [u8] {
        let start = index * SAMPLES_PER_LINE;
        &mut self.samples[start..start + SAMPLES_PER_LINE]
    }
}

/// Read access to the raw-sample lines of a frame.
///
/// Lines are addressed the same way as in the data units that carried them: by field, and by a
/// 1-based line offset within the field.
#[derive(Clone, Copy)]
pub struct RawFrame<'a> {
    samples: &'a [u8],
    complete: &'a FixedBitSet,
    lines_per_field: usize,
}
impl<'a> RawFrame<'a> {
    /// The number of lines per field which the raw buffer can hold.
    pub fn lines_per_field(&self) -> usize {
        self.lines_per_field
    }

    fn index(&self, field: Field, offset: u8) -> Option<usize> {
        let offset = usize::from(offset);
        if offset == 0 || offset > self.lines_per_field {
            None
        } else {
            Some(field.index() * self.lines_per_field + offset - 1)
        }
    }

    /// True if every segment of the given line was received.
    pub fn is_complete(&self, field: Field, offset: u8) -> bool {
        self.index(field, offset)
            .map(|i| self.complete.contains(i))
            .unwrap_or(false)
    }

    /// The `SAMPLES_PER_LINE` samples of the given line, if all its segments were received.
    pub fn line(&self, field: Field, offset: u8) -> Option<&'a [u8]> {
        let i = self.index(field, offset)?;
        if self.complete.contains(i) {
            let start = i * SAMPLES_PER_LINE;
            Some(&self.samples[start..start + SAMPLES_PER_LINE])
        } else {
            None
        }
    }

    /// The whole buffer; the lines of the first field followed by those of the second.  Lines
    /// which were not received, or were received incompletely, are all-zero.
    pub fn samples(&self) -> &'a [u8] {
        self.samples
    }
}

/// One video frame's worth of decoded lines under construction.
#[derive(Debug)]
pub(crate) struct Frame {
    sliced: Vec<Sliced>,
    max_sliced: usize,
    raw: Option<RawBuffer>,
    // highest frame line number seen per field, 0 if none
    last_line: [u32; 2],
    raw_cursor: Option<RawCursor>,
    units_in_packet: usize,
}
impl Frame {
    pub fn new(max_sliced: usize, raw_lines_per_field: Option<usize>) -> Frame {
        Frame {
            sliced: Vec::with_capacity(max_sliced),
            max_sliced,
            raw: raw_lines_per_field.map(RawBuffer::new),
            last_line: [0; 2],
            raw_cursor: None,
            units_in_packet: 0,
        }
    }

    pub fn reset(&mut self) {
        self.sliced.clear();
        if let Some(ref mut raw) = self.raw {
            raw.clear();
        }
        self.last_line = [0; 2];
        self.raw_cursor = None;
        self.units_in_packet = 0;
    }

    /// true if nothing at all has been extracted into this frame
    pub fn is_empty(&self) -> bool {
        self.sliced.is_empty() && self.last_line == [0; 2]
    }

    pub fn sliced(&self) -> &[Sliced] {
        &self.sliced[..]
    }

    pub fn begin_packet(&mut self) {
        self.units_in_packet = 0;
    }

    pub fn count_unit(&mut self) {
        self.units_in_packet += 1;
    }

    pub fn units_in_packet(&self) -> usize {
        self.units_in_packet
    }

    pub fn line_order(&self, field: Field, line: u32) -> LineOrder {
        if field == Field::First && self.last_line[Field::Second.index()] != 0 {
            return LineOrder::NewFrame;
        }
        let last = self.last_line[field.index()];
        if line < last {
            LineOrder::NewFrame
        } else if line == last {
            LineOrder::Duplicate
        } else {
            LineOrder::Next
        }
    }

    pub fn commit_line(&mut self, field: Field, line: u32) {
        self.last_line[field.index()] = line;
    }

    pub fn push_sliced(&mut self, s: Sliced) -> Result<(), DemuxError> {
        if self.sliced.len() >= self.max_sliced {
            return Err(DemuxError::SlicedBufferOverflow);
        }
        self.sliced.push(s);
        Ok(())
    }

    pub fn has_raw(&self) -> bool {
        self.raw.is_some()
    }

    pub fn raw_line_index(&self, addr: LineAddress) -> Option<usize> {
        let raw = self.raw.as_ref()?;
        let offset = usize::from(addr.offset);
        if offset == 0 || offset > raw.lines_per_field {
            None
        } else {
            Some(addr.field.index() * raw.lines_per_field + offset - 1)
        }
    }

    /// Copy samples into the given line starting at `position`.  The caller has checked that
    /// `position + samples.len()` does not exceed `SAMPLES_PER_LINE`.
    pub fn write_raw(&mut self, index: usize, position: usize, samples: &[u8]) {
        if let Some(ref mut raw) = self.raw {
            raw.line_mut(index)[position..position + samples.len()].copy_from_slice(samples);
        }
    }

    /// Zero the given line and mark it as not received.
    pub fn discard_raw_line(&mut self, index: usize) {
        if let Some(ref mut raw) = self.raw {
            raw.line_mut(index).iter_mut().for_each(|s| *s = 0);
            raw.complete.set(index, false);
        }
    }

    pub fn complete_raw_line(&mut self, index: usize) {
        if let Some(ref mut raw) = self.raw {
            raw.complete.insert(index);
        }
    }

    pub fn take_raw_cursor(&mut self) -> Option<RawCursor> {
        self.raw_cursor.take()
    }

    pub fn set_raw_cursor(&mut self, cursor: RawCursor) {
        self.raw_cursor = Some(cursor);
    }

    pub fn raw_frame(&self) -> Option<RawFrame<'_>> {
        self.raw.as_ref().map(|raw| RawFrame {
            samples: &raw.samples[..],
            complete: &raw.complete,
            lines_per_field: raw.lines_per_field,
        })
    }
}
