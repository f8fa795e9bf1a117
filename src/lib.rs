//! Demultiplexer for VBI data (Teletext, VPS, WSS, Closed Caption and raw monochrome samples)
//! carried in MPEG-2 PES packets, per _ETSI EN 300 472_ and _ETSI EN 301 775_.
//!
//! # Design principals
//!
//!  * *Chunking is invisible*.  Input may be supplied in pieces of any size, down to single
//!    bytes, and the frames produced are exactly those that would result from supplying the whole
//!    stream at once.
//!  * *Avoid copying and allocating* where practical.  When the caller's buffer holds a complete
//!    packet, the packet is parsed in place.  Only packets spanning buffer boundaries are copied.
//!  * *No panics on bad input*.  Problems in the stream are either silently filtered (packets
//!    which are not VBI data at all) or reported as a recoverable
//!    [`DemuxError`](demux/enum.DemuxError.html).
//!  * *Transport Neutral*.  The APIs accept `&[u8]`, and the caller handles providing the data
//!    from wherever.
//!
//! # Example
//!
//! ```
//! use dvb_vbi_demux::demux::{DemuxConfig, VbiDemux};
//! use dvb_vbi_demux::service::Sliced;
//!
//! let mut demux = VbiDemux::new(DemuxConfig::default());
//! let mut sliced = [Sliced::EMPTY; 64];
//! # let data = [0u8; 0];
//! let mut buf = &data[..];
//! loop {
//!     match demux.pull(&mut sliced, &mut buf) {
//!         Ok(Some(frame)) => println!("{} lines at pts {}", frame.lines, frame.pts.value()),
//!         Ok(None) => break,
//!         Err(e) => eprintln!("{}", e),
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, future_incompatible, missing_docs)]

pub mod data_unit;
pub mod demux;
pub mod frame;
pub mod pes;
mod scan;
pub mod service;
pub mod wrap;

pub use crate::demux::{CompletedFrame, DemuxConfig, DemuxError, FrameConsumer, VbiDemux, VbiFrame};
pub use crate::service::{Field, ScanningSystem, Service, Sliced};
