use dvb_vbi_demux::demux::{DemuxConfig, DemuxError, FrameConsumer, VbiDemux, VbiFrame};
use dvb_vbi_demux::service::ScanningSystem;
use hex_slice::AsHex;
use std::env;
use std::fs::File;
use std::io::Read;

struct DumpFrames {
    frame_count: usize,
    error_count: usize,
}
impl FrameConsumer for DumpFrames {
    fn frame(&mut self, frame: VbiFrame<'_>) {
        self.frame_count += 1;
        println!(
            "frame {} pts={} lines={} dropped={}",
            self.frame_count,
            frame.pts.value(),
            frame.sliced.len(),
            frame.dropped
        );
        for s in frame.sliced {
            println!("  {:?} line={} {:02x}", s.id, s.line, s.payload().as_hex());
        }
        if let Some(raw) = frame.raw {
            let samples = raw.samples().iter().filter(|&&s| s != 0).count();
            if samples > 0 {
                println!("  raw: {} non-zero samples", samples);
            }
        }
    }

    fn demux_error(&mut self, err: DemuxError) {
        self.error_count += 1;
        println!("  error: {}", err);
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // open input file named on command line,
    let name = env::args().nth(1).unwrap();
    let mut f = File::open(&name).unwrap_or_else(|_| panic!("file not found: {}", &name));

    // a second argument of '525' selects NTSC line numbering
    let system = match env::args().nth(2).as_deref() {
        Some("525") => ScanningSystem::Lines525,
        _ => ScanningSystem::Lines625,
    };
    let config = DemuxConfig::default()
        .with_system(system)
        .with_raw_lines_per_field(24);
    let mut demux = VbiDemux::new(config);
    let mut consumer = DumpFrames {
        frame_count: 0,
        error_count: 0,
    };

    // consume the input file,
    let mut buf = [0u8; 64 * 1024];
    loop {
        match f.read(&mut buf[..]).expect("read failed") {
            0 => break,
            n => demux.push(&buf[0..n], &mut consumer),
        }
    }
    demux.flush(&mut consumer);
    println!(
        "{} frames, {} errors",
        consumer.frame_count, consumer.error_count
    );
}
