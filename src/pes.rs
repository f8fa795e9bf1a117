//! Packetised Elementary Stream headers, as used to carry VBI data.
//!
//! VBI data (_ETSI EN 300 472_ Teletext and _ETSI EN 301 775_ VBI data) is carried in
//! `private_stream_1` PES packets with a fixed-size header: the _PES_header_data_length_ field
//! always has the value `0x24`, so that the first data unit of the packet payload is aligned at
//! a fixed offset after the header.

use std::fmt;

/// Values of the _stream_id_ field which follows the packet start code.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StreamId {
    /// `program_stream_map`
    ProgramStreamMap,
    /// `private_stream_1`, the stream type carrying VBI data
    PrivateStream1,
    /// `padding_stream`
    PaddingStream,
    /// `private_stream_2`
    PrivateStream2,
    /// ISO/IEC 13818-3 or ISO/IEC 11172-3 or ISO/IEC 13818-7 or ISO/IEC 14496-3 audio stream
    Audio(u8),
    /// ITU-T H.262, H.264, H.265 and related video streams
    Video(u8),
    /// Any of the remaining stream_id values `0xf0` to `0xff` (ECM, EMM, DSM-CC, H.222.1, etc)
    Other(u8),
    /// Values below `0xbc`.  These are start codes used _within_ elementary streams (e.g. video
    /// slice and sequence headers) or program stream pack headers, and are not followed by a
    /// _PES_packet_length_ field.
    Short(u8),
}
impl StreamId {
    /// True if this stream id is followed by a _PES_packet_length_ field, allowing the packet to
    /// be skipped over without inspecting its content.
    pub fn has_packet_length(self) -> bool {
        !matches!(self, StreamId::Short(_))
    }
}
impl From<u8> for StreamId {
    fn from(v: u8) -> Self {
        match v {
            0b1011_1100 => StreamId::ProgramStreamMap,
            0b1011_1101 => StreamId::PrivateStream1,
            0b1011_1110 => StreamId::PaddingStream,
            0b1011_1111 => StreamId::PrivateStream2,
            0b1100_0000..=0b1101_1111 => StreamId::Audio(v & 0b0001_1111),
            0b1110_0000..=0b1110_1111 => StreamId::Video(v & 0b0000_1111),
            0b1111_0000..=0b1111_1111 => StreamId::Other(v),
            _ => StreamId::Short(v),
        }
    }
}

/// The _data_identifier_ which is the first byte of the PES packet payload, and which determines
/// how the data units that follow are to be interpreted.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DataIdentifier {
    /// Values `0x10` to `0x1f`: _EN 300 472_ EBU Teletext carriage.  Only Teletext data units
    /// are defined.
    EbuTeletext(u8),
    /// Values `0x99` to `0x9b`: _EN 301 775_ EBU data, which may additionally carry VPS, WSS,
    /// Closed Caption and monochrome sample data units.
    EbuData(u8),
}
impl DataIdentifier {
    /// Returns `None` for values outside of the two ranges reserved for VBI data.
    pub fn from_u8(v: u8) -> Option<DataIdentifier> {
        match v {
            0x10..=0x1f => Some(DataIdentifier::EbuTeletext(v)),
            0x99..=0x9b => Some(DataIdentifier::EbuData(v)),
            _ => None,
        }
    }

    /// True if data unit types beyond EBU Teletext should be interpreted.
    pub fn allows_all_data_units(self) -> bool {
        matches!(self, DataIdentifier::EbuData(_))
    }
}

/// Detail about the formatting problem which prevented a [`Timestamp`](struct.Timestamp.html)
/// value being parsed.
#[derive(PartialEq, Eq, Debug)]
pub enum TimestampError {
    /// Parsing the timestamp failed because the 'prefix-bit' values within the timestamp did not
    /// have the expected values
    IncorrectPrefixBits {
        /// expected prefix-bits for this timestamp
        expected: u8,
        /// the actual, incorrect bits that were present
        actual: u8,
    },
    /// Parsing the timestamp failed because a 'marker-bit' value within the timestamp did not
    /// have the expected value
    MarkerBitNotSet {
        /// the bit-index of the bit which should have been 1, but was found to be 0
        bit_number: u8,
    },
}

/// A 33-bit Elementary Stream timestamp, used to represent PTS and DTS values which may appear in
/// a PES header.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default)]
pub struct Timestamp {
    val: u64,
}
impl Timestamp {
    /// The largest representable timestamp value before the timestamp wraps back around to zero.
    pub const MAX: Timestamp = Timestamp { val: (1 << 33) - 1 };

    const SIZE: usize = 5;

    /// Parse a Presentation Time Stamp value from the 5 bytes at the start of the given slice,
    /// where the PTS is not followed by a DTS
    ///
    /// Panics if fewer than 5 bytes given
    pub fn from_pts_bytes(buf: &[u8]) -> Result<Timestamp, TimestampError> {
        Timestamp::check_prefix(buf, 0b0010)?;
        Timestamp::from_bytes(buf)
    }
    /// Parse a Presentation Time Stamp value from the 5 bytes at the start of the given slice,
    /// where the PTS is followed by a DTS
    ///
    /// Panics if fewer than 5 bytes given
    pub fn from_pts_with_dts_bytes(buf: &[u8]) -> Result<Timestamp, TimestampError> {
        Timestamp::check_prefix(buf, 0b0011)?;
        Timestamp::from_bytes(buf)
    }
    /// Parse a Decode Time Stamp value from the 5 bytes at the start of the given slice
    ///
    /// Panics if fewer than 5 bytes given
    pub fn from_dts_bytes(buf: &[u8]) -> Result<Timestamp, TimestampError> {
        Timestamp::check_prefix(buf, 0b0001)?;
        Timestamp::from_bytes(buf)
    }
    fn check_prefix(buf: &[u8], expected: u8) -> Result<(), TimestampError> {
        assert!(expected <= 0b1111);
        let actual = buf[0] >> 4;
        if actual == expected {
            Ok(())
        } else {
            Err(TimestampError::IncorrectPrefixBits { expected, actual })
        }
    }
    fn check_marker_bit(buf: &[u8], bit_number: u8) -> Result<(), TimestampError> {
        let byte_index = bit_number / 8;
        let bit_index = bit_number % 8;
        let bit_mask = 1 << (7 - bit_index);
        if buf[byte_index as usize] & bit_mask != 0 {
            Ok(())
        } else {
            Err(TimestampError::MarkerBitNotSet { bit_number })
        }
    }
    /// Parse a Time Stamp value from the 5 bytes at the start of the given slice, without checking
    /// the 4-bit prefix for any particular value.
    ///
    /// Panics if fewer than 5 bytes given
    pub fn from_bytes(buf: &[u8]) -> Result<Timestamp, TimestampError> {
        Timestamp::check_marker_bit(buf, 7)?;
        Timestamp::check_marker_bit(buf, 23)?;
        Timestamp::check_marker_bit(buf, 39)?;
        Ok(Timestamp {
            val: (u64::from(buf[0] & 0b0000_1110) << 29)
                | u64::from(buf[1]) << 22
                | (u64::from(buf[2] & 0b1111_1110) << 14)
                | u64::from(buf[3]) << 7
                | u64::from(buf[4]) >> 1,
        })
    }
    /// Panics if the given val is greater than 2^33-1
    pub fn from_u64(val: u64) -> Timestamp {
        assert!(val <= Self::MAX.val);
        Timestamp { val }
    }
    /// produces the timestamp's value (only the low 33 bits are used)
    pub fn value(self) -> u64 {
        self.val
    }
}

/// The combination of PTS and DTS timestamps present in a PES header.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum PtsDts {
    /// There are no timestamps present
    None,
    /// Only Presentation Time Stamp is present
    PtsOnly(Timestamp),
    /// Both Presentation and Decode Time Stamps are present
    Both {
        /// Presentation Time Stamp
        pts: Timestamp,
        /// Decode Time Stamp
        dts: Timestamp,
    },
}
impl PtsDts {
    /// The Presentation Time Stamp, if present
    pub fn pts(&self) -> Option<Timestamp> {
        match *self {
            PtsDts::None => None,
            PtsDts::PtsOnly(pts) => Some(pts),
            PtsDts::Both { pts, .. } => Some(pts),
        }
    }
}

/// Reasons a PES packet was found not to be a VBI data packet.
#[derive(Debug, PartialEq, Eq)]
pub enum PesHeaderError {
    /// There is not enough data in the buffer to hold the fixed-size header
    NotEnoughData {
        /// the number of bytes required to hold the header
        requested: usize,
        /// the number of bytes actually remaining in the buffer
        available: usize,
    },
    /// The buffer did not start with `00 00 01 bd`
    NotPrivateStream1,
    /// The _PES_packet_length_ is too small to hold the fixed-size header
    PacketLength(u16),
    /// The two bits following _PES_packet_length_ did not have the value `0b10`
    CheckBits(u8),
    /// _PES_header_data_length_ did not have the value `0x24` required for VBI data
    HeaderDataLength(u8),
    /// The _PTS_DTS_flags_ field had the forbidden value `0b01`
    PtsDtsFlagsInvalid,
    /// A timestamp in the header was malformed
    Timestamp(TimestampError),
    /// The _data_identifier_ was not in a range reserved for VBI data
    DataIdentifier(u8),
}
impl From<TimestampError> for PesHeaderError {
    fn from(e: TimestampError) -> Self {
        PesHeaderError::Timestamp(e)
    }
}

/// The fixed-size header of a PES packet carrying VBI data, together with the _data_identifier_
/// byte that immediately follows it.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct VbiPesHeader {
    packet_length: u16,
    pts_dts: PtsDts,
    data_identifier: DataIdentifier,
}
impl VbiPesHeader {
    /// Value of _PES_header_data_length_ mandated for VBI data
    pub const HEADER_DATA_LENGTH: u8 = 0x24;
    /// Size of the start code prefix, _stream_id_ and _PES_packet_length_ fields
    pub const FIXED_HEADER_SIZE: usize = 6;
    /// Offset of the first data unit from the start of the packet
    pub const SIZE: usize = Self::FIXED_HEADER_SIZE + 3 + Self::HEADER_DATA_LENGTH as usize + 1;

    /// Parse and validate the header at the start of the given buffer, which must hold at least
    /// `VbiPesHeader::SIZE` bytes.
    pub fn from_bytes(buf: &[u8]) -> Result<VbiPesHeader, PesHeaderError> {
        if buf.len() < Self::SIZE {
            return Err(PesHeaderError::NotEnoughData {
                requested: Self::SIZE,
                available: buf.len(),
            });
        }
        if buf[0..3] != [0u8, 0, 1] || StreamId::from(buf[3]) != StreamId::PrivateStream1 {
            return Err(PesHeaderError::NotPrivateStream1);
        }
        let packet_length = u16::from(buf[4]) << 8 | u16::from(buf[5]);
        if usize::from(packet_length) + Self::FIXED_HEADER_SIZE < Self::SIZE {
            return Err(PesHeaderError::PacketLength(packet_length));
        }
        let check_bits = buf[6] >> 6;
        if check_bits != 0b10 {
            return Err(PesHeaderError::CheckBits(check_bits));
        }
        let header_data_length = buf[8];
        if header_data_length != Self::HEADER_DATA_LENGTH {
            return Err(PesHeaderError::HeaderDataLength(header_data_length));
        }
        let data_identifier = DataIdentifier::from_u8(buf[Self::SIZE - 1])
            .ok_or(PesHeaderError::DataIdentifier(buf[Self::SIZE - 1]))?;
        let ts = &buf[9..];
        let pts_dts = match buf[7] >> 6 {
            0b00 => PtsDts::None,
            0b01 => return Err(PesHeaderError::PtsDtsFlagsInvalid),
            0b10 => PtsDts::PtsOnly(Timestamp::from_pts_bytes(ts)?),
            0b11 => PtsDts::Both {
                pts: Timestamp::from_pts_with_dts_bytes(ts)?,
                dts: Timestamp::from_dts_bytes(&ts[Timestamp::SIZE..])?,
            },
            _ => unreachable!(),
        };
        Ok(VbiPesHeader {
            packet_length,
            pts_dts,
            data_identifier,
        })
    }

    /// The value of the _PES_packet_length_ field; the number of bytes in the packet following
    /// this field.
    pub fn packet_length(&self) -> u16 {
        self.packet_length
    }
    /// The total size of the packet including the start code, stream id and length fields.
    pub fn total_size(&self) -> usize {
        usize::from(self.packet_length) + Self::FIXED_HEADER_SIZE
    }
    /// Timestamps carried in the header
    pub fn pts_dts(&self) -> PtsDts {
        self.pts_dts
    }
    /// The _data_identifier_ following the header
    pub fn data_identifier(&self) -> DataIdentifier {
        self.data_identifier
    }
}

impl fmt::Display for PesHeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            PesHeaderError::NotEnoughData {
                requested,
                available,
            } => write!(
                f,
                "{} bytes needed for VBI PES header, {} available",
                requested, available
            ),
            PesHeaderError::NotPrivateStream1 => write!(f, "not a private_stream_1 packet"),
            PesHeaderError::PacketLength(l) => write!(f, "PES_packet_length {} too small", l),
            PesHeaderError::CheckBits(b) => {
                write!(f, "unexpected check-bits value {:#b}, expected 0b10", b)
            }
            PesHeaderError::HeaderDataLength(l) => write!(
                f,
                "PES_header_data_length {:#x}, expected {:#x}",
                l,
                VbiPesHeader::HEADER_DATA_LENGTH
            ),
            PesHeaderError::PtsDtsFlagsInvalid => write!(f, "invalid PTS_DTS_flags 0b01"),
            PesHeaderError::Timestamp(e) => write!(f, "bad timestamp: {:?}", e),
            PesHeaderError::DataIdentifier(d) => write!(f, "data_identifier {:#04x} not VBI", d),
        }
    }
}
