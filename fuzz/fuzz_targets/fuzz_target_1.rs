#![no_main]

use dvb_vbi_demux::demux::{DemuxConfig, VbiDemux};
use dvb_vbi_demux::service::Sliced;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    // the first byte chooses the chunk size, the rest is the stream
    let chunk_size = usize::from(data[0]) + 1;
    let mut demux = VbiDemux::new(DemuxConfig::default().with_raw_lines_per_field(31));
    let mut sliced = [Sliced::EMPTY; 64];
    for chunk in data[1..].chunks(chunk_size) {
        let mut buf = chunk;
        loop {
            match demux.pull(&mut sliced, &mut buf) {
                Ok(None) => break,
                Ok(Some(frame)) => assert!(frame.lines <= sliced.len()),
                Err(_) => (),
            }
        }
    }
    let _ = demux.finish(&mut sliced);
});
