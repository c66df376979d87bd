//! Probes a file and dumps its top-level packets.
//!
//! Registers a minimal RIFF chunk walker (AVI, WAV, WebP...) as the only input
//! format, so any RIFF file is accepted and every chunk after the form type is
//! reported as one packet.
//!
//! ```text
//! cargo run --example probe_file -- path/to/clip.avi
//! ```

use demuxio::av::{MediaType, Packet};
use demuxio::format::{DemuxContext, Demuxer, FormatParameters, InputFormat, ProbeData, SCORE_MAX};
use demuxio::{Context, DemuxError, Result};
use std::env;

struct RiffFormat;

struct RiffDemuxer {
    end: u64,
}

impl InputFormat for RiffFormat {
    fn name(&self) -> &str {
        "riff"
    }

    fn long_name(&self) -> &str {
        "RIFF chunk walker"
    }

    fn extensions(&self) -> Option<&str> {
        Some("avi,wav,webp")
    }

    fn probe(&self, data: &ProbeData) -> Option<u32> {
        Some(if data.buf.starts_with(b"RIFF") { SCORE_MAX } else { 0 })
    }

    fn new_demuxer(&self) -> Box<dyn Demuxer> {
        Box::new(RiffDemuxer { end: 0 })
    }
}

impl Demuxer for RiffDemuxer {
    fn read_header(&mut self, ctx: &mut DemuxContext, _params: &FormatParameters) -> Result<()> {
        let io = ctx.io();
        if &io.read_fourcc() != b"RIFF" {
            return Err(DemuxError::InvalidData("missing RIFF tag".into()));
        }
        let size = io.read_le32() as u64;
        let form = io.read_fourcc();
        self.end = 8 + size;

        let stream = ctx.new_stream(0)?;
        stream.codec.media_type = MediaType::Data;
        stream.codec.codec_tag = u32::from_le_bytes(form);
        stream.set_pts_info(32, 1, 1);
        Ok(())
    }

    fn read_packet(&mut self, ctx: &mut DemuxContext) -> Result<Packet> {
        let io = ctx.io();
        let pos = io.tell();
        if pos + 8 > self.end {
            return Err(DemuxError::EndOfStream);
        }
        let tag = io.read_fourcc();
        let size = io.read_le32() as usize;
        if io.eof() {
            return Err(DemuxError::EndOfStream);
        }

        let mut data = vec![0u8; size];
        let got = io.read(&mut data);
        data.truncate(got);
        // chunks are word aligned
        if size % 2 == 1 {
            io.skip(1)?;
        }

        Ok(Packet::new(data)
            .with_pts(i64::from(u32::from_le_bytes(tag)))
            .with_key_flag(true)
            .with_pos(pos))
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let path = match env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: probe_file <path>");
            std::process::exit(2);
        }
    };

    let mut ctx = Context::with_defaults();
    ctx.register_input_format(RiffFormat);

    let mut session = ctx.open_input_file(&path, None, 0, None)?;
    println!(
        "{}: {} ({}), {} stream(s), data at {}",
        path,
        session.format().name(),
        session.format().long_name(),
        session.streams().len(),
        session.data_offset()
    );

    let mut count = 0;
    loop {
        match session.read_packet() {
            Ok(packet) => {
                let tag = (packet.pts.unwrap_or(0) as u32).to_le_bytes();
                println!(
                    "  chunk {} at {:>8}: {} bytes",
                    String::from_utf8_lossy(&tag),
                    packet.pos.unwrap_or(0),
                    packet.size()
                );
                count += 1;
            }
            Err(e) if e.is_eof() => break,
            Err(e) => return Err(e.into()),
        }
    }
    println!("{} chunk(s)", count);

    session.close()?;
    Ok(())
}
