//! Locating the start of VBI PES packets within an unstructured byte stream.

use crate::pes::StreamId;

/// Result of scanning a window of bytes for a VBI PES packet start code.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Scan {
    /// `00 00 01 bd` was found at the given offset
    Found(usize),
    /// A start code for some other stream, one which carries a _PES_packet_length_, was found at
    /// `at`.  The whole packet, `length` bytes including its 6 byte prefix, may be skipped.
    Foreign { at: usize, length: usize },
    /// No start code found; the given number of bytes may be discarded.  Any bytes after this
    /// point may still be the beginning of a start code.
    NotFound(usize),
}

/// Search for a packet start code at every offset `i` of `buf` for which `buf[i..]` still holds
/// `lookahead` bytes.  `lookahead` must be at least 6, so that the _PES_packet_length_ of any
/// start code that is found is within the window.
pub(crate) fn scan(buf: &[u8], lookahead: usize) -> Scan {
    debug_assert!(lookahead >= 6);
    if buf.len() < lookahead {
        return Scan::NotFound(0);
    }
    let end = buf.len() - lookahead;
    let mut i = 0;
    while i <= end {
        if buf[i + 2] > 1 {
            // neither this, nor either of the next two offsets can begin '00 00 01'
            i += 3;
        } else if buf[i + 2] == 0 {
            i += 1;
        } else if buf[i] | buf[i + 1] != 0 {
            i += 3;
        } else {
            let stream_id = StreamId::from(buf[i + 3]);
            if stream_id == StreamId::PrivateStream1 {
                return Scan::Found(i);
            }
            if stream_id.has_packet_length() {
                let packet_length = usize::from(buf[i + 4]) << 8 | usize::from(buf[i + 5]);
                return Scan::Foreign {
                    at: i,
                    length: packet_length + 6,
                };
            }
            // the byte after a short start code may begin another start code
            i += 3;
        }
    }
    Scan::NotFound(i)
}
