//! The VBI demultiplexer context, and the interfaces through which PES bytes are supplied and
//! completed frames retrieved.
//!
//! Two styles of use are supported,
//!
//!  - _pull_: the caller repeatedly invokes [`VbiDemux::pull()`](struct.VbiDemux.html#method.pull)
//!    with the remaining input, receiving either a completed frame or an indication that the
//!    input has been exhausted
//!  - _push_: the caller hands each buffer to
//!    [`VbiDemux::push()`](struct.VbiDemux.html#method.push), and completed frames (and any
//!    errors) are delivered to a [`FrameConsumer`](trait.FrameConsumer.html)
//!
//! In either case the input may be split into chunks of any size, down to single bytes, without
//! changing the output.

use crate::data_unit::{self, Extracted};
use crate::frame::{Frame, RawFrame};
use crate::pes::{StreamId, Timestamp, VbiPesHeader};
use crate::scan::{self, Scan};
use crate::service::{ScanningSystem, Sliced};
use crate::wrap::WrapBuffer;
use log::{debug, trace, warn};
use std::fmt;
use std::mem;

/// Largest number of lines per field which the raw sample buffer may hold; the _line_offset_
/// field can address no more.
pub const MAX_RAW_LINES_PER_FIELD: usize = 31;

/// Settings fixed for the lifetime of a [`VbiDemux`](struct.VbiDemux.html).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxConfig {
    system: ScanningSystem,
    max_sliced_lines: usize,
    raw_lines_per_field: Option<usize>,
}
impl Default for DemuxConfig {
    fn default() -> Self {
        DemuxConfig {
            system: ScanningSystem::Lines625,
            max_sliced_lines: 64,
            raw_lines_per_field: None,
        }
    }
}
impl DemuxConfig {
    /// The scanning system used to convert line offsets into frame line numbers
    pub fn with_system(mut self, system: ScanningSystem) -> Self {
        self.system = system;
        self
    }

    /// The number of sliced lines a single frame can hold.  Further lines produce
    /// `DemuxError::SlicedBufferOverflow`.
    pub fn with_max_sliced_lines(mut self, max_sliced_lines: usize) -> Self {
        self.max_sliced_lines = max_sliced_lines;
        self
    }

    /// Enables reassembly of monochrome sample data units into a buffer holding the given number
    /// of lines per field (clamped to the range `1..=31`).  Raw sample units are ignored unless
    /// this is set.
    pub fn with_raw_lines_per_field(mut self, lines: usize) -> Self {
        self.raw_lines_per_field = Some(lines.clamp(1, MAX_RAW_LINES_PER_FIELD));
        self
    }

    /// the configured scanning system
    pub fn system(&self) -> ScanningSystem {
        self.system
    }
    /// the configured frame capacity
    pub fn max_sliced_lines(&self) -> usize {
        self.max_sliced_lines
    }
    /// the configured raw buffer size, if raw samples are to be reassembled
    pub fn raw_lines_per_field(&self) -> Option<usize> {
        self.raw_lines_per_field
    }
}

/// Problems found in the data units of a VBI PES packet.
///
/// None of these are fatal.  Simply calling the demultiplexer again continues processing, from a
/// point which depends on the error,
///
///  - after `DataUnitOverflow`, `SlicedBufferOverflow` and `RawBufferOverflow`, the rest of the
///    packet is dropped
///  - after `DataUnitLength`, `DataUnitLineNumber`, `RawSegmentPosition` and `RawSegmentLost`,
///    the offending data unit is dropped and processing continues with the next
///  - after `RawDataIncomplete` the data unit which revealed the problem is processed
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DemuxError {
    /// The _data_unit_length_ runs past the end of the packet
    DataUnitOverflow {
        /// the _data_unit_id_ of the unit
        data_unit_id: u8,
        /// the length the unit claimed
        length: usize,
        /// the number of bytes actually remaining in the packet
        available: usize,
    },
    /// The _data_unit_length_ is too small for this type of data unit
    DataUnitLength {
        /// the _data_unit_id_ of the unit
        data_unit_id: u8,
        /// the length the unit claimed
        length: u8,
    },
    /// The line is not permitted for the service, or repeats a line already seen in this frame
    DataUnitLineNumber {
        /// the _data_unit_id_ of the unit
        data_unit_id: u8,
        /// the _field_parity_ / _line_offset_ byte of the unit
        line_offset: u8,
    },
    /// A raw sample segment did not start where the previous segment of the line ended
    RawSegmentPosition {
        /// the position immediately following the previous segment
        expected: u16,
        /// the _first_pixel_position_ of this segment
        actual: u16,
    },
    /// A raw sample segment arrived for a line with no first segment
    RawSegmentLost,
    /// A raw sample line was started before the last segment of the previous line was seen
    RawDataIncomplete,
    /// The frame already holds the maximum number of sliced lines
    SlicedBufferOverflow,
    /// A raw sample line lies outside the configured raw buffer
    RawBufferOverflow,
}
impl fmt::Display for DemuxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match *self {
            DemuxError::DataUnitOverflow {
                data_unit_id,
                length,
                available,
            } => write!(
                f,
                "data unit {:#04x} length {} exceeds the {} bytes remaining in the packet",
                data_unit_id, length, available
            ),
            DemuxError::DataUnitLength {
                data_unit_id,
                length,
            } => write!(f, "data unit {:#04x} length {} too short", data_unit_id, length),
            DemuxError::DataUnitLineNumber {
                data_unit_id,
                line_offset,
            } => write!(
                f,
                "data unit {:#04x} has invalid line address {:#04x}",
                data_unit_id, line_offset
            ),
            DemuxError::RawSegmentPosition { expected, actual } => write!(
                f,
                "raw sample segment at position {}, expected {}",
                actual, expected
            ),
            DemuxError::RawSegmentLost => write!(f, "raw sample segment without a first segment"),
            DemuxError::RawDataIncomplete => write!(f, "raw sample line incomplete"),
            DemuxError::SlicedBufferOverflow => write!(f, "too many sliced lines in frame"),
            DemuxError::RawBufferOverflow => write!(f, "raw sample line outside buffer"),
        }
    }
}
impl std::error::Error for DemuxError {}

/// Summary of a frame delivered by [`VbiDemux::pull()`](struct.VbiDemux.html#method.pull).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct CompletedFrame {
    /// the number of sliced lines written to the caller's array
    pub lines: usize,
    /// the number of sliced lines which did not fit in the caller's array
    pub dropped: usize,
    /// the presentation timestamp of the packet(s) the frame was taken from
    pub pts: Timestamp,
}

/// A frame delivered to a [`FrameConsumer`](trait.FrameConsumer.html).
pub struct VbiFrame<'a> {
    /// the decoded lines, in transmission order
    pub sliced: &'a [Sliced],
    /// the raw sample lines, if raw reassembly was enabled
    pub raw: Option<RawFrame<'a>>,
    /// the presentation timestamp of the packet(s) the frame was taken from
    pub pts: Timestamp,
    /// the number of lines which did not fit in the sliced array
    pub dropped: usize,
}

/// Receives the output of [`VbiDemux::push()`](struct.VbiDemux.html#method.push).
pub trait FrameConsumer {
    /// called with each completed frame
    fn frame(&mut self, frame: VbiFrame<'_>);

    /// called for each recoverable error found in the stream
    fn demux_error(&mut self, err: DemuxError);
}

#[derive(Debug, Clone, Copy)]
struct PacketCursor {
    header: VbiPesHeader,
    // position of the next data unit within the packet payload
    offset: usize,
    // true once the packet's timestamp has been accounted for
    started: bool,
}

enum Step {
    NeedData,
    Continue,
    Frame,
}

/// Demultiplexer state for one stream of VBI PES packets.
///
/// The stream may also carry packets of other kinds, and bytes which are not PES packets at all;
/// these are skipped.  One instance handles one stream; independent streams need independent
/// instances.
pub struct VbiDemux {
    config: DemuxConfig,
    wrap: WrapBuffer,
    frame: Frame,
    packet: Option<PacketCursor>,
    last_pts: Option<Timestamp>,
    frame_pts: Option<Timestamp>,
    new_frame: bool,
    output: Vec<Sliced>,
}
impl VbiDemux {
    /// Create a demultiplexer with the given configuration
    pub fn new(config: DemuxConfig) -> VbiDemux {
        let raw_lines = config
            .raw_lines_per_field
            .map(|l| l.clamp(1, MAX_RAW_LINES_PER_FIELD));
        VbiDemux {
            wrap: WrapBuffer::new(VbiPesHeader::SIZE),
            frame: Frame::new(config.max_sliced_lines, raw_lines),
            packet: None,
            last_pts: None,
            frame_pts: None,
            new_frame: false,
            output: Vec::new(),
            config,
        }
    }

    /// The configuration given at construction
    pub fn config(&self) -> &DemuxConfig {
        &self.config
    }

    /// Discard all partially processed input and any partially assembled frame, as needed after
    /// switching to a different source.
    pub fn reset(&mut self) {
        debug!("reset");
        self.wrap.reset();
        self.wrap.set_lookahead(VbiPesHeader::SIZE);
        self.frame.reset();
        self.packet = None;
        self.last_pts = None;
        self.frame_pts = None;
        self.new_frame = false;
    }

    /// Process as much of `buf` as needed to complete a frame.
    ///
    /// `buf` is advanced past the bytes consumed.  If a frame is completed, its sliced lines are
    /// copied into `sliced` (any that don't fit are counted in `CompletedFrame::dropped`) and
    /// the return value describes it; the caller should then call again with the remainder of
    /// `buf`.  `Ok(None)` means that all of `buf` has been consumed, and more input is needed.
    ///
    /// A frame ends when the line numbers go backwards, and also when a packet arrives carrying a
    /// PTS different from that of the frame under construction.  A stream which sends each field
    /// in its own packet with its own PTS therefore yields one frame per field.
    ///
    /// Errors describe problems with individual data units; the caller may simply call again to
    /// continue.
    pub fn pull(
        &mut self,
        sliced: &mut [Sliced],
        buf: &mut &[u8],
    ) -> Result<Option<CompletedFrame>, DemuxError> {
        self.begin_frame_if_pending();
        loop {
            match self.step(buf)? {
                Step::NeedData => return Ok(None),
                Step::Continue => (),
                Step::Frame => return Ok(Some(self.deliver(sliced))),
            }
        }
    }

    /// Signal the end of input, delivering the frame under construction, if any.  A packet still
    /// waiting for the rest of its bytes is discarded.
    pub fn finish(&mut self, sliced: &mut [Sliced]) -> Option<CompletedFrame> {
        self.begin_frame_if_pending();
        if self.packet.take().is_some() || self.wrap.leftover() > 0 {
            debug!("discarding incomplete packet at end of stream");
        }
        self.wrap.reset();
        self.wrap.set_lookahead(VbiPesHeader::SIZE);
        if self.frame.is_empty() {
            None
        } else {
            Some(self.deliver(sliced))
        }
    }

    /// The raw sample lines of the most recently delivered frame, if raw reassembly is enabled.
    /// Only meaningful until the next call to `pull()`, `push()` or `finish()`.
    pub fn raw_frame(&self) -> Option<RawFrame<'_>> {
        self.frame.raw_frame()
    }

    /// Process all of `buf`, passing each completed frame and each error to `consumer`.
    pub fn push<C: FrameConsumer>(&mut self, mut buf: &[u8], consumer: &mut C) {
        let mut output = self.take_output();
        loop {
            match self.pull(&mut output[..], &mut buf) {
                Ok(None) => break,
                Ok(Some(done)) => self.consume_frame(consumer, &output[..], done),
                Err(e) => {
                    warn!("{}", e);
                    consumer.demux_error(e);
                }
            }
        }
        self.output = output;
    }

    /// Deliver the frame under construction to `consumer`, at the end of the stream.
    pub fn flush<C: FrameConsumer>(&mut self, consumer: &mut C) {
        let mut output = self.take_output();
        if let Some(done) = self.finish(&mut output[..]) {
            self.consume_frame(consumer, &output[..], done);
        }
        self.output = output;
    }

    fn take_output(&mut self) -> Vec<Sliced> {
        let mut output = mem::take(&mut self.output);
        output.resize(self.config.max_sliced_lines, Sliced::EMPTY);
        output
    }

    fn consume_frame<C: FrameConsumer>(
        &self,
        consumer: &mut C,
        output: &[Sliced],
        done: CompletedFrame,
    ) {
        if done.dropped > 0 {
            warn!(
                "frame pts={} truncated, {} lines dropped",
                done.pts.value(),
                done.dropped
            );
        }
        consumer.frame(VbiFrame {
            sliced: &output[..done.lines],
            raw: self.frame.raw_frame(),
            pts: done.pts,
            dropped: done.dropped,
        });
    }

    fn begin_frame_if_pending(&mut self) {
        if self.new_frame {
            self.frame.reset();
            self.new_frame = false;
        }
    }

    fn deliver(&mut self, sliced: &mut [Sliced]) -> CompletedFrame {
        let lines = self.frame.sliced();
        let n = lines.len().min(sliced.len());
        sliced[..n].copy_from_slice(&lines[..n]);
        let done = CompletedFrame {
            lines: n,
            dropped: lines.len() - n,
            pts: self.frame_pts.unwrap_or_default(),
        };
        debug!(
            "frame complete: pts={} lines={}",
            done.pts.value(),
            lines.len()
        );
        // whatever follows belongs to the packet most recently seen
        self.frame_pts = self.last_pts;
        self.new_frame = true;
        done
    }

    fn step(&mut self, buf: &mut &[u8]) -> Result<Step, DemuxError> {
        let VbiDemux {
            ref config,
            ref mut wrap,
            ref mut frame,
            ref mut packet,
            ref mut last_pts,
            ref mut frame_pts,
            ..
        } = *self;
        let window = match wrap.wrap(buf) {
            Some(window) => window,
            None => return Ok(Step::NeedData),
        };
        let mut cursor = match *packet {
            Some(cursor) => cursor,
            None => {
                match scan::scan(window, VbiPesHeader::SIZE) {
                    Scan::NotFound(n) => wrap.skip(n),
                    Scan::Foreign { at, length } => {
                        trace!(
                            "skipping {:?} packet of {} bytes",
                            StreamId::from(window[at + 3]),
                            length
                        );
                        wrap.skip(at + length);
                    }
                    Scan::Found(at) => {
                        let start = &window[at..];
                        match VbiPesHeader::from_bytes(start) {
                            Ok(header) => {
                                if header.pts_dts().pts().is_none() && frame_pts.is_none() {
                                    trace!("dropping VBI packet without PTS");
                                    wrap.skip(at + header.total_size());
                                } else {
                                    wrap.skip(at);
                                    wrap.set_lookahead(header.total_size());
                                    *packet = Some(PacketCursor {
                                        header,
                                        offset: 0,
                                        started: false,
                                    });
                                }
                            }
                            Err(e) => {
                                let length = usize::from(start[4]) << 8 | usize::from(start[5]);
                                trace!("skipping PES packet: {}", e);
                                wrap.skip(at + VbiPesHeader::FIXED_HEADER_SIZE + length);
                            }
                        }
                    }
                }
                return Ok(Step::Continue);
            }
        };

        let header = cursor.header;
        if !cursor.started {
            cursor.started = true;
            frame.begin_packet();
            if let Some(pts) = header.pts_dts().pts() {
                *last_pts = Some(pts);
                if frame.is_empty() {
                    *frame_pts = Some(pts);
                } else if *frame_pts != Some(pts) {
                    debug!("pts changed to {}, frame ends", pts.value());
                    *packet = Some(cursor);
                    return Ok(Step::Frame);
                }
            }
        }

        let total = header.total_size();
        let units = &window[VbiPesHeader::SIZE..total];
        let units_len = units.len();
        let result = data_unit::extract(
            frame,
            config.system,
            header.data_identifier(),
            units,
            &mut cursor.offset,
        );
        if cursor.offset >= units_len {
            trace!("{} data units extracted from packet", frame.units_in_packet());
            wrap.skip(total);
            wrap.set_lookahead(VbiPesHeader::SIZE);
            *packet = None;
        } else {
            *packet = Some(cursor);
        }
        match result? {
            Extracted::PacketDone => Ok(Step::Continue),
            Extracted::NewFrame => {
                debug!("line sequence restarted, frame ends");
                Ok(Step::Frame)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::demux::*;
    use crate::service::{Field, Service};
    use bitstream_io::{BigEndian, BitWrite};
    use bitstream_io::{BitWriter, BE};
    use std::io;

    fn make_test_data<F>(builder: F) -> Vec<u8>
    where
        F: Fn(&mut BitWriter<Vec<u8>, BE>) -> Result<(), io::Error>,
    {
        let data: Vec<u8> = Vec::new();
        let mut w = BitWriter::endian(data, BigEndian);
        builder(&mut w).unwrap();
        w.into_writer()
    }

    fn write_ts(w: &mut BitWriter<Vec<u8>, BE>, ts: u64, prefix: u8) -> Result<(), io::Error> {
        w.write(4, prefix & 0b1111)?;
        w.write(3, (ts & 0b1_1100_0000_0000_0000_0000_0000_0000_0000) >> 30)?;
        w.write(1, 1)?; // marker_bit
        w.write(15, (ts & 0b0_0011_1111_1111_1111_1000_0000_0000_0000) >> 15)?;
        w.write(1, 1)?; // marker_bit
        w.write(15, ts & 0b0_0000_0000_0000_0000_0111_1111_1111_1111)?;
        w.write(1, 1) // marker_bit
    }

    fn pes_packet(pts: Option<u64>, data_identifier: u8, units: &[u8]) -> Vec<u8> {
        make_test_data(|w| {
            w.write(24, 1)?; // packet_start_code_prefix
            w.write(8, 0xbd)?; // stream_id
            w.write(16, (40 + units.len()) as u16)?; // PES_packet_length
            w.write(2, 0b10)?; // check-bits
            w.write(2, 0)?; // PES_scrambling_control
            w.write(1, 0)?; // pes_priority
            w.write(1, 1)?; // data_alignment_indicator
            w.write(2, 0)?; // copyright, original_or_copy
            w.write(2, if pts.is_some() { 0b10 } else { 0b00 })?; // PTS_DTS_flags
            w.write(6, 0)?;
            w.write(8, 0x24)?; // PES_header_data_length
            let mut used = 0;
            if let Some(pts) = pts {
                write_ts(w, pts, 0b0010)?;
                used += 5;
            }
            for _ in used..0x24 {
                w.write(8, 0xff)?; // stuffing_byte
            }
            w.write(8, data_identifier)?;
            w.write_bytes(units)
        })
    }

    fn foreign_packet(stream_id: u8, length: usize) -> Vec<u8> {
        let mut p = vec![0, 0, 1, stream_id, (length >> 8) as u8, length as u8];
        p.resize(6 + length, 0x55);
        p
    }

    /// a byte-serial data unit with the payload given in natural bit order
    fn unit(id: u8, lofp: u8, payload: &[u8]) -> Vec<u8> {
        let mut u = vec![id, 1 + payload.len() as u8, lofp];
        u.extend(payload.iter().map(|b| b.reverse_bits()));
        u
    }

    fn teletext(lofp: u8, payload: &[u8]) -> Vec<u8> {
        let mut u = vec![0x02, 44, lofp, 0xe4];
        u.extend(payload.iter().map(|b| b.reverse_bits()));
        u
    }

    /// Teletext on the given line of the first field, payload bytes all equal to the line offset
    fn teletext_line(offset: u8) -> Vec<u8> {
        teletext(0xe0 | offset, &[offset; 42])
    }

    fn raw(flags_lofp: u8, position: u16, samples: &[u8]) -> Vec<u8> {
        let mut u = vec![
            0xc6,
            4 + samples.len() as u8,
            flags_lofp,
            (position >> 8) as u8,
            position as u8,
            samples.len() as u8,
        ];
        u.extend_from_slice(samples);
        u
    }

    fn stuffing(length: u8) -> Vec<u8> {
        let mut u = vec![0xff, length];
        u.resize(2 + usize::from(length), 0xff);
        u
    }

    fn concat(parts: &[Vec<u8>]) -> Vec<u8> {
        parts.iter().flatten().copied().collect()
    }

    #[derive(Debug, PartialEq, Default)]
    struct Collect {
        frames: Vec<(Vec<Sliced>, Timestamp, Option<Vec<u8>>)>,
        errors: Vec<DemuxError>,
    }
    impl Collect {
        fn lines(&self) -> Vec<Vec<u32>> {
            self.frames
                .iter()
                .map(|(s, _, _)| s.iter().map(|l| l.line).collect())
                .collect()
        }
        fn pts(&self) -> Vec<u64> {
            self.frames.iter().map(|(_, pts, _)| pts.value()).collect()
        }
    }
    impl FrameConsumer for Collect {
        fn frame(&mut self, frame: VbiFrame<'_>) {
            self.frames.push((
                frame.sliced.to_vec(),
                frame.pts,
                frame.raw.map(|r| r.samples().to_vec()),
            ));
        }
        fn demux_error(&mut self, err: DemuxError) {
            self.errors.push(err);
        }
    }

    fn run_chunks(config: DemuxConfig, chunks: &[&[u8]]) -> Collect {
        let mut demux = VbiDemux::new(config);
        let mut collect = Collect::default();
        for chunk in chunks {
            demux.push(chunk, &mut collect);
        }
        demux.flush(&mut collect);
        collect
    }

    fn run(config: DemuxConfig, data: &[u8]) -> Collect {
        run_chunks(config, &[data])
    }

    #[test]
    fn single_teletext_packet() {
        let payload: Vec<u8> = (0..42u8).map(|i| i * 5 + 1).collect();
        let units = concat(&[teletext(0xe7, &payload), stuffing(20)]);
        let data = pes_packet(Some(123456), 0x10, &units);

        let mut demux = VbiDemux::new(DemuxConfig::default());
        let mut sliced = [Sliced::EMPTY; 8];
        let mut buf = &data[..];
        assert_eq!(demux.pull(&mut sliced, &mut buf), Ok(None));
        assert!(buf.is_empty());
        assert_eq!(
            demux.finish(&mut sliced),
            Some(CompletedFrame {
                lines: 1,
                dropped: 0,
                pts: Timestamp::from_u64(123456)
            })
        );
        assert!(sliced[0].id.contains(Service::TELETEXT_B_L10_625));
        assert_eq!(sliced[0].line, 7);
        assert_eq!(sliced[0].payload(), &payload[..]);
        assert_eq!(demux.finish(&mut sliced), None);
    }

    #[test]
    fn round_trip() {
        let ttx: Vec<u8> = (0..42u8).collect();
        let vps = [0x12u8, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0, 1, 2, 3, 4, 5];
        let wss = [0x08u8, 0x06];
        let cc = [0x94u8, 0x2c];
        let units = concat(&[
            teletext(0xe7, &ttx),
            unit(0xc3, 0xf0, &vps),
            unit(0xc4, 0xf7, &wss),
            unit(0xc5, 0xd6, &cc),
        ]);
        let result = run(DemuxConfig::default(), &pes_packet(Some(1), 0x99, &units));
        assert!(result.errors.is_empty());
        assert_eq!(result.frames.len(), 1);
        let sliced = &result.frames[0].0;
        let got: Vec<(Service, u32, Vec<u8>)> = sliced
            .iter()
            .map(|s| (s.id, s.line, s.payload().to_vec()))
            .collect();
        assert_eq!(
            got,
            vec![
                (Service::TELETEXT_B_625, 7, ttx.clone()),
                (Service::VPS, 16, vps.to_vec()),
                (Service::WSS_625, 23, wss.to_vec()),
                (Service::CAPTION_625, 335, cc.to_vec()),
            ]
        );
    }

    #[test]
    fn frame_rollover() {
        let frame: Vec<Vec<u8>> = (6..=22).map(teletext_line).collect();
        let frame = concat(&frame);
        let data = concat(&[
            pes_packet(Some(1000), 0x10, &frame),
            pes_packet(Some(1000), 0x10, &frame),
        ]);
        let mut demux = VbiDemux::new(DemuxConfig::default());
        let mut sliced = [Sliced::EMPTY; 64];
        let mut buf = &data[..];
        let first = demux.pull(&mut sliced, &mut buf).unwrap().unwrap();
        assert_eq!(first.lines, 17);
        assert_eq!(first.pts, Timestamp::from_u64(1000));
        let lines: Vec<u32> = sliced[..17].iter().map(|s| s.line).collect();
        assert_eq!(lines, (6..=22).collect::<Vec<u32>>());
        assert_eq!(demux.pull(&mut sliced, &mut buf), Ok(None));
        let second = demux.finish(&mut sliced).unwrap();
        assert_eq!(second.lines, 17);
        assert_eq!(sliced[0].line, 6);
        assert_eq!(sliced[0].payload(), &[6; 42][..]);
    }

    #[test]
    fn frame_rollover_within_packet() {
        let frames: Vec<Vec<u8>> = (6..=22).chain(6..=22).map(teletext_line).collect();
        let data = pes_packet(Some(1000), 0x10, &concat(&frames));
        let result = run(DemuxConfig::default(), &data);
        let lines: Vec<u32> = (6..=22).collect();
        assert_eq!(result.lines(), vec![lines.clone(), lines]);
        assert_eq!(result.pts(), vec![1000, 1000]);
    }

    #[test]
    fn second_field_then_first_field_is_new_frame() {
        let units = concat(&[
            teletext(0xc7, &[1; 42]),
            teletext(0xe7, &[2; 42]),
        ]);
        let result = run(DemuxConfig::default(), &pes_packet(Some(5), 0x10, &units));
        assert_eq!(result.lines(), vec![vec![320], vec![7]]);
    }

    #[test]
    fn pts_change_starts_frame() {
        let data = concat(&[
            pes_packet(Some(1000), 0x10, &teletext_line(7)),
            pes_packet(Some(4600), 0x10, &teletext_line(8)),
        ]);
        let result = run(DemuxConfig::default(), &data);
        assert_eq!(result.lines(), vec![vec![7], vec![8]]);
        assert_eq!(result.pts(), vec![1000, 4600]);
    }

    #[test]
    fn packet_per_field() {
        let data = concat(&[
            pes_packet(Some(1000), 0x10, &teletext_line(7)),
            pes_packet(Some(2800), 0x10, &teletext(0xc7, &[7; 42])),
            pes_packet(Some(4600), 0x10, &teletext_line(7)),
            pes_packet(Some(6400), 0x10, &teletext(0xc7, &[7; 42])),
        ]);
        let result = run(DemuxConfig::default(), &data);
        assert_eq!(result.lines(), vec![vec![7], vec![320], vec![7], vec![320]]);
        assert_eq!(result.pts(), vec![1000, 2800, 4600, 6400]);
    }

    #[test]
    fn packet_without_pts() {
        let data = concat(&[
            pes_packet(None, 0x10, &teletext_line(6)),
            pes_packet(Some(1000), 0x10, &teletext_line(7)),
            pes_packet(None, 0x10, &teletext_line(8)),
        ]);
        let result = run(DemuxConfig::default(), &data);
        assert_eq!(result.lines(), vec![vec![7, 8]]);
        assert_eq!(result.pts(), vec![1000]);
    }

    #[test]
    fn truncated_data_unit() {
        let mut broken = vec![0x02, 44, 0xe8, 0xe4];
        broken.extend_from_slice(&[0; 8]);
        let data = concat(&[
            pes_packet(Some(1000), 0x10, &concat(&[teletext_line(7), broken])),
            pes_packet(Some(4600), 0x10, &teletext_line(7)),
        ]);
        let result = run(DemuxConfig::default(), &data);
        assert_eq!(
            result.errors,
            vec![DemuxError::DataUnitOverflow {
                data_unit_id: 0x02,
                length: 44,
                available: 10
            }]
        );
        assert_eq!(result.lines(), vec![vec![7], vec![7]]);
    }

    #[test]
    fn incomplete_raw_segment() {
        let units = concat(&[
            raw(0x80 | 0x21, 0, &[5; 100]),
            raw(0xc0 | 0x22, 0, &[6; 50]),
            teletext_line(7),
        ]);
        let config = DemuxConfig::default().with_raw_lines_per_field(4);
        let result = run(config, &pes_packet(Some(1000), 0x99, &units));
        assert_eq!(result.errors, vec![DemuxError::RawDataIncomplete]);
        assert_eq!(result.lines(), vec![vec![7]]);
        let samples = result.frames[0].2.as_ref().unwrap();
        assert_eq!(samples.len(), 2 * 4 * 720);
        assert!(samples[..720].iter().all(|&s| s == 0));
        assert!(samples[720..770].iter().all(|&s| s == 6));
        assert!(samples[770..].iter().all(|&s| s == 0));
    }

    #[test]
    fn raw_frame_after_pull() {
        let units = concat(&[
            raw(0x80 | 0x23, 0, &[1; 200]),
            raw(0x23, 200, &[2; 200]),
            raw(0x40 | 0x23, 400, &[3; 200]),
        ]);
        let data = concat(&[
            pes_packet(Some(1), 0x99, &units),
            pes_packet(Some(2), 0x99, &teletext_line(7)),
        ]);
        let mut demux = VbiDemux::new(DemuxConfig::default().with_raw_lines_per_field(3));
        let mut sliced = [Sliced::EMPTY; 4];
        let mut buf = &data[..];
        let done = demux.pull(&mut sliced, &mut buf).unwrap().unwrap();
        assert_eq!(done.lines, 0);
        let raw = demux.raw_frame().unwrap();
        assert_eq!(raw.lines_per_field(), 3);
        let line = raw.line(Field::First, 3).unwrap();
        assert_eq!(&line[199..201], &[1u8, 2][..]);
        assert_eq!(&line[599..601], &[3u8, 0][..]);
        assert!(line[600..].iter().all(|&s| s == 0));
        assert!(!raw.is_complete(Field::Second, 3));
    }

    #[test]
    fn output_truncated() {
        let units = concat(&[
            teletext_line(6),
            teletext_line(7),
            teletext_line(8),
            teletext_line(9),
        ]);
        let data = concat(&[
            pes_packet(Some(1000), 0x10, &units),
            pes_packet(Some(4600), 0x10, &teletext_line(6)),
        ]);
        let mut demux = VbiDemux::new(DemuxConfig::default());
        let mut sliced = [Sliced::EMPTY; 2];
        let mut buf = &data[..];
        assert_eq!(
            demux.pull(&mut sliced, &mut buf),
            Ok(Some(CompletedFrame {
                lines: 2,
                dropped: 2,
                pts: Timestamp::from_u64(1000)
            }))
        );
        assert_eq!(sliced[0].line, 6);
        assert_eq!(sliced[1].line, 7);
    }

    #[test]
    fn sliced_buffer_overflow() {
        let units = concat(&[teletext_line(6), teletext_line(7), teletext_line(8)]);
        let data = concat(&[
            pes_packet(Some(1000), 0x10, &units),
            pes_packet(Some(4600), 0x10, &teletext_line(6)),
        ]);
        let result = run(DemuxConfig::default().with_max_sliced_lines(2), &data);
        assert_eq!(result.errors, vec![DemuxError::SlicedBufferOverflow]);
        assert_eq!(result.lines(), vec![vec![6, 7], vec![6]]);
    }

    #[test]
    fn scanning_system_525() {
        let units = concat(&[
            unit(0xb4, 0xf4, &[1, 2, 3]),
            unit(0xb5, 0xf5, &[0x14, 0x20]),
            unit(0xb5, 0xd5, &[0x14, 0x2c]),
        ]);
        let config = DemuxConfig::default().with_system(ScanningSystem::Lines525);
        let result = run(config, &pes_packet(Some(9), 0x9a, &units));
        assert!(result.errors.is_empty());
        assert_eq!(result.lines(), vec![vec![20, 21, 284]]);
        let sliced = &result.frames[0].0;
        assert_eq!(sliced[0].id, Service::WSS_CPR1204);
        assert_eq!(sliced[0].payload(), &[1, 2, 3][..]);
        assert_eq!(sliced[2].id, Service::CAPTION_525);
        assert_eq!(sliced[2].payload(), &[0x14, 0x2c][..]);
    }

    fn clean_packets() -> Vec<Vec<u8>> {
        vec![
            pes_packet(
                Some(1000),
                0x99,
                &concat(&[
                    raw(0x80 | 0x21, 0, &[0x10; 251]),
                    raw(0x40 | 0x21, 251, &[0x20; 100]),
                    teletext_line(6),
                    teletext_line(7),
                    unit(0xc3, 0xf0, &[0xab; 13]),
                ]),
            ),
            pes_packet(
                Some(1000),
                0x99,
                &concat(&[unit(0xc4, 0xf7, &[1, 2]), unit(0xc5, 0xd6, &[3, 4])]),
            ),
            pes_packet(
                Some(4600),
                0x10,
                &concat(&[
                    teletext_line(6),
                    teletext(0xe0, &[0x77; 42]),
                    teletext_line(6),
                    stuffing(3),
                ]),
            ),
            pes_packet(Some(8200), 0x10, &teletext_line(8)),
            pes_packet(None, 0x10, &teletext_line(9)),
        ]
    }

    fn clean_stream() -> Vec<u8> {
        concat(&clean_packets())
    }

    fn dirty_stream() -> Vec<u8> {
        let mut bad_header = pes_packet(Some(1000), 0x10, &teletext_line(10));
        bad_header[8] = 0x23;
        let bad_identifier = pes_packet(Some(2000), 0x20, &teletext_line(11));
        let noise = vec![
            vec![0x47, 0x11, 0x00, 0x00],
            foreign_packet(0xe0, 300),
            bad_header,
            vec![0x00, 0x00, 0x01, 0xb3, 0x12],
            foreign_packet(0xbe, 10),
            bad_identifier,
        ];
        let mut stream = vec![];
        for (i, packet) in clean_packets().into_iter().enumerate() {
            stream.extend_from_slice(&noise[i % noise.len()]);
            stream.extend_from_slice(&packet);
        }
        stream.extend_from_slice(&noise[5]);
        stream.extend_from_slice(&noise[0]);
        stream
    }

    fn config() -> DemuxConfig {
        DemuxConfig::default().with_raw_lines_per_field(2)
    }

    #[test]
    fn clean_stream_content() {
        let result = run(config(), &clean_stream());
        assert_eq!(
            result.lines(),
            vec![vec![6, 7, 16, 23, 335], vec![6, 0], vec![8, 9]]
        );
        assert_eq!(result.pts(), vec![1000, 4600, 8200]);
        assert_eq!(
            result.errors,
            vec![DemuxError::DataUnitLineNumber {
                data_unit_id: 0x02,
                line_offset: 0xe6
            }]
        );
        let samples = result.frames[0].2.as_ref().unwrap();
        assert!(samples[..251].iter().all(|&s| s == 0x10));
        assert!(samples[251..351].iter().all(|&s| s == 0x20));
        // raw samples are not carried over into the following frame
        assert!(result.frames[1].2.as_ref().unwrap().iter().all(|&s| s == 0));
    }

    #[test]
    fn chunk_independence() {
        let data = dirty_stream();
        let expected = run(config(), &data);
        assert_eq!(expected.frames.len(), 3);
        for size in 1..=64 {
            let chunks: Vec<&[u8]> = data.chunks(size).collect();
            assert_eq!(run_chunks(config(), &chunks), expected, "chunk size {}", size);
        }
        let mut chunks: Vec<&[u8]> = vec![];
        let mut rest = &data[..];
        for size in [1, 7, 2, 45, 3, 100, 13, 46, 47].iter().cycle() {
            if rest.is_empty() {
                break;
            }
            let n = (*size).min(rest.len());
            chunks.push(&rest[..n]);
            rest = &rest[n..];
        }
        assert_eq!(run_chunks(config(), &chunks), expected);
    }

    #[test]
    fn pull_one_byte_at_a_time() {
        let data = clean_stream();
        let mut demux = VbiDemux::new(config());
        let mut sliced = [Sliced::EMPTY; 16];
        let mut frames = vec![];
        let mut errors = vec![];
        for b in data.chunks(1) {
            let mut buf = b;
            loop {
                match demux.pull(&mut sliced, &mut buf) {
                    Ok(None) => break,
                    Ok(Some(done)) => frames.push(sliced[..done.lines].to_vec()),
                    Err(e) => errors.push(e),
                }
            }
        }
        if let Some(done) = demux.finish(&mut sliced) {
            frames.push(sliced[..done.lines].to_vec());
        }
        let expected = run(config(), &data);
        let expected_frames: Vec<Vec<Sliced>> =
            expected.frames.into_iter().map(|(s, _, _)| s).collect();
        assert_eq!(frames, expected_frames);
        assert_eq!(errors, expected.errors);
    }

    #[test]
    fn foreign_packets_filtered() {
        assert_eq!(run(config(), &dirty_stream()), run(config(), &clean_stream()));
    }

    #[test]
    fn reset_discards_partial_input() {
        let data = clean_stream();
        let mut demux = VbiDemux::new(config());
        let mut collect = Collect::default();
        demux.push(&data[..100], &mut collect);
        demux.reset();
        demux.push(&data[..], &mut collect);
        demux.flush(&mut collect);
        assert_eq!(collect, run(config(), &data));
    }

    #[test]
    fn empty_and_garbage_input() {
        let result = run(DemuxConfig::default(), &[]);
        assert_eq!(result, Collect::default());
        let garbage: Vec<u8> = (0..2000u32).map(|i| (i * 7 % 251) as u8).collect();
        assert_eq!(run(DemuxConfig::default(), &garbage), Collect::default());
    }

    #[test]
    fn config_builders() {
        let c = DemuxConfig::default();
        assert_eq!(c.system(), ScanningSystem::Lines625);
        assert_eq!(c.max_sliced_lines(), 64);
        assert_eq!(c.raw_lines_per_field(), None);
        assert_eq!(
            DemuxConfig::default()
                .with_raw_lines_per_field(100)
                .raw_lines_per_field(),
            Some(31)
        );
        assert_eq!(
            DemuxConfig::default()
                .with_raw_lines_per_field(0)
                .raw_lines_per_field(),
            Some(1)
        );
    }

    #[test]
    fn error_display() {
        let e = DemuxError::DataUnitLength {
            data_unit_id: 0xc5,
            length: 2,
        };
        assert_eq!(e.to_string(), "data unit 0xc5 length 2 too short");
    }
}
