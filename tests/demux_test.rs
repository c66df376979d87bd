use demuxio::av::{IndexFlags, Packet, SeekFlags};
use demuxio::config::{Config, PROBE_BUF_LIMIT};
use demuxio::error::{DemuxError, Result};
use demuxio::format::{
    DemuxContext, Demuxer, FormatParameters, InputFormat, ProbeData, SeekOutcome, SCORE_MAX,
};
use demuxio::io::{OpenMode, Protocol, ProtocolContext, Whence};
use demuxio::Context;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const MAGIC: &[u8; 4] = b"DMX1";

#[derive(Clone, Default)]
struct Counters {
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl Counters {
    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Serves a fixed blob and counts opens and closes.
struct StubProtocol {
    data: Arc<Vec<u8>>,
    seekable: bool,
    counters: Counters,
}

struct StubContext {
    data: Arc<Vec<u8>>,
    offset: usize,
    seekable: bool,
    closes: Arc<AtomicUsize>,
}

impl Protocol for StubProtocol {
    fn name(&self) -> &str {
        "stub"
    }

    fn open(&self, _filename: &str, _mode: OpenMode) -> Result<Box<dyn ProtocolContext>> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubContext {
            data: self.data.clone(),
            offset: 0,
            seekable: self.seekable,
            closes: self.counters.closes.clone(),
        }))
    }
}

impl ProtocolContext for StubContext {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.data.len() - self.offset);
        buf[..n].copy_from_slice(&self.data[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        if !self.seekable {
            return Err(DemuxError::Unsupported("seek"));
        }
        let base = match whence {
            Whence::Set => 0,
            Whence::Current => self.offset as i64,
            Whence::End => self.data.len() as i64,
        };
        self.offset = (base + offset) as usize;
        Ok(self.offset as u64)
    }

    fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Chunked test container:
/// `"DMX1"`, le16 stream count, le32 id per stream, then packets of
/// le16 stream index, le32 pts, u8 key flag, le32 size, payload.
struct ChunkFormat {
    probes: Arc<AtomicUsize>,
    min_sample: usize,
    fail_header: bool,
}

impl ChunkFormat {
    fn new() -> Self {
        Self {
            probes: Arc::new(AtomicUsize::new(0)),
            min_sample: 0,
            fail_header: false,
        }
    }
}

struct ChunkDemuxer {
    fail_header: bool,
}

impl InputFormat for ChunkFormat {
    fn name(&self) -> &str {
        "chunk"
    }

    fn long_name(&self) -> &str {
        "chunked test container"
    }

    fn probe(&self, data: &ProbeData) -> Option<u32> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if data.buf.starts_with(MAGIC) && data.buf_size() >= self.min_sample {
            Some(SCORE_MAX)
        } else {
            Some(0)
        }
    }

    fn new_demuxer(&self) -> Box<dyn Demuxer> {
        Box::new(ChunkDemuxer {
            fail_header: self.fail_header,
        })
    }
}

impl Demuxer for ChunkDemuxer {
    fn read_header(&mut self, ctx: &mut DemuxContext, params: &FormatParameters) -> Result<()> {
        if &ctx.io().read_fourcc() != MAGIC || self.fail_header {
            return Err(DemuxError::InvalidData("not a chunk container".into()));
        }
        let count = ctx.io().read_le16();
        let rate = params.sample_rate.unwrap_or(1000) as i32;
        for _ in 0..count {
            let id = ctx.io().read_le32() as i32;
            ctx.new_stream(id)?.set_pts_info(32, 1, rate);
        }
        Ok(())
    }

    fn read_packet(&mut self, ctx: &mut DemuxContext) -> Result<Packet> {
        let pos = ctx.io().tell();
        let stream_index = ctx.io().read_le16() as usize;
        let pts = ctx.io().read_le32() as i64;
        let key = ctx.io().read_u8() != 0;
        let size = ctx.io().read_le32() as usize;
        if ctx.io().eof() {
            return Err(DemuxError::EndOfStream);
        }
        let mut data = vec![0u8; size];
        if ctx.io().read(&mut data) < size {
            return Err(DemuxError::EndOfStream);
        }
        Ok(Packet::new(data)
            .with_stream_index(stream_index)
            .with_pts(pts)
            .with_key_flag(key)
            .with_pos(pos))
    }
}

/// Extension-only format that never parses anything.
struct ExtOnly;

impl InputFormat for ExtOnly {
    fn name(&self) -> &str {
        "extonly"
    }

    fn extensions(&self) -> Option<&str> {
        Some("dmx,chk")
    }

    fn new_demuxer(&self) -> Box<dyn Demuxer> {
        Box::new(ChunkDemuxer { fail_header: true })
    }
}

fn chunk_file(stream_ids: &[u32], packets: &[(u16, u32, bool, usize)]) -> Vec<u8> {
    let mut data = MAGIC.to_vec();
    data.extend_from_slice(&(stream_ids.len() as u16).to_le_bytes());
    for id in stream_ids {
        data.extend_from_slice(&id.to_le_bytes());
    }
    for &(stream, pts, key, size) in packets {
        data.extend_from_slice(&stream.to_le_bytes());
        data.extend_from_slice(&pts.to_le_bytes());
        data.push(key as u8);
        data.extend_from_slice(&(size as u32).to_le_bytes());
        data.extend((0..size).map(|i| (i as u8).wrapping_add(pts as u8)));
    }
    data
}

fn stub_context(data: Vec<u8>, seekable: bool) -> (Context, Counters) {
    let counters = Counters::default();
    let mut ctx = Context::with_config(Config::default());
    ctx.register_protocol(StubProtocol {
        data: Arc::new(data),
        seekable,
        counters: counters.clone(),
    });
    (ctx, counters)
}

#[test]
fn test_probe_open_read_close() {
    let data = chunk_file(&[7, 9], &[(0, 0, true, 16), (1, 0, true, 8), (0, 40, false, 16)]);
    let (mut ctx, counters) = stub_context(data, true);
    ctx.register_input_format(ExtOnly);
    ctx.register_input_format(ChunkFormat::new());

    let mut session = ctx.open_input_file("stub:clip.dmx", None, 0, None).unwrap();
    assert_eq!(session.format().name(), "chunk");
    assert_eq!(session.streams().len(), 2);
    assert_eq!(session.streams()[1].id, 9);
    assert_eq!(session.streams()[0].time_base.den, 1000);
    assert_eq!(session.data_offset(), 14);

    let first = session.read_packet().unwrap();
    assert_eq!(first.pos, Some(14));
    assert_eq!(first.size(), 16);
    assert!(first.is_key);
    assert_eq!(session.read_packet().unwrap().stream_index, 1);
    assert_eq!(session.read_packet().unwrap().pts, Some(40));
    assert!(session.read_packet().unwrap_err().is_eof());

    session.close().unwrap();
    assert_eq!(counters.opens(), 1);
    assert_eq!(counters.closes(), 1);
}

#[test]
fn test_unseekable_source_is_reopened_while_probing() {
    let packets: Vec<_> = (0..64).map(|i| (0u16, i * 10, i % 8 == 0, 100)).collect();
    let data = chunk_file(&[1], &packets);
    let (mut ctx, counters) = stub_context(data, false);
    let mut format = ChunkFormat::new();
    format.min_sample = 4096;
    let probes = format.probes.clone();
    ctx.register_input_format(format);

    // 1 KiB window forces the 2 KiB sample past the buffer
    let mut session = ctx.open_input_file("stub:live", None, 1024, None).unwrap();
    assert_eq!(probes.load(Ordering::SeqCst), 2);
    assert_eq!(counters.opens(), 3);
    assert_eq!(counters.closes(), 2);

    let packet = session.read_packet().unwrap();
    assert_eq!(packet.pts, Some(0));
    session.close().unwrap();
    assert_eq!(counters.closes(), 3);
}

#[test]
fn test_probe_gives_up_after_bounded_growth() {
    let (mut ctx, counters) = stub_context(vec![0xAB; 300_000], true);
    let format = ChunkFormat::new();
    let probes = format.probes.clone();
    ctx.register_input_format(format);

    let err = ctx.open_input_file("stub:noise.bin", None, 0, None).unwrap_err();
    assert!(matches!(err, DemuxError::NoMatchingFormat));
    // 2048, 4096, ... 131072
    assert_eq!(probes.load(Ordering::SeqCst), 7);
    assert_eq!(counters.opens(), 1);
    assert_eq!(counters.closes(), 1);
}

#[test]
fn test_oversized_probe_cap_is_clamped() {
    let counters = Counters::default();
    let mut ctx = Context::with_config(Config {
        probe_buf_min: PROBE_BUF_LIMIT / 2,
        probe_buf_max: usize::MAX,
        ..Config::default()
    });
    assert_eq!(ctx.config().probe_buf_max, PROBE_BUF_LIMIT);
    ctx.register_protocol(StubProtocol {
        data: Arc::new(vec![0xAB; 100]),
        seekable: true,
        counters: counters.clone(),
    });
    let format = ChunkFormat::new();
    let probes = format.probes.clone();
    ctx.register_input_format(format);

    let err = ctx.open_input_file("stub:noise.bin", None, 0, None).unwrap_err();
    assert!(matches!(err, DemuxError::NoMatchingFormat));
    assert_eq!(probes.load(Ordering::SeqCst), 2);
    assert_eq!(counters.closes(), 1);
}

#[test]
fn test_signature_beats_matching_extension() {
    let data = chunk_file(&[1], &[(0, 0, true, 4)]);
    let (mut ctx, _) = stub_context(data, true);
    ctx.register_input_format(ExtOnly);
    ctx.register_input_format(ChunkFormat::new());

    let pd = ProbeData::new("clip.dmx", MAGIC.to_vec());
    assert_eq!(ctx.probe_input_format(&pd).unwrap().name(), "chunk");

    let pd = ProbeData::new("clip.chk", b"RIFF".to_vec());
    assert_eq!(ctx.probe_input_format(&pd).unwrap().name(), "extonly");
}

#[test]
fn test_header_failure_closes_source() {
    let data = chunk_file(&[1], &[]);
    let (mut ctx, counters) = stub_context(data, true);
    let mut format = ChunkFormat::new();
    format.fail_header = true;
    ctx.register_input_format(format);

    let err = ctx.open_input_file("stub:bad", None, 0, None).unwrap_err();
    assert!(matches!(err, DemuxError::InvalidData(_)));
    assert_eq!(counters.opens(), 1);
    assert_eq!(counters.closes(), 1);
}

#[test]
fn test_explicit_format_skips_probe() {
    let data = chunk_file(&[3], &[(0, 5, true, 2)]);
    let (mut ctx, counters) = stub_context(data, true);
    let format = ChunkFormat::new();
    let probes = format.probes.clone();
    ctx.register_input_format(format);

    let chunk = ctx.find_input_format("chunk").unwrap();
    let params = FormatParameters {
        sample_rate: Some(48000),
        ..Default::default()
    };
    let session = ctx
        .open_input_file("stub:clip", Some(chunk), 0, Some(&params))
        .unwrap();
    assert_eq!(probes.load(Ordering::SeqCst), 0);
    assert_eq!(session.streams()[0].time_base.den, 48000);

    drop(session);
    assert_eq!(counters.closes(), 1);
}

#[test]
fn test_unknown_protocol_is_io_error() {
    let mut ctx = Context::with_defaults();
    ctx.register_protocol(StubProtocol {
        data: Arc::new(Vec::new()),
        seekable: true,
        counters: Counters::default(),
    });
    ctx.register_input_format(ChunkFormat::new());

    let err = ctx.open_input_file("nope://host/clip", None, 0, None).unwrap_err();
    assert!(matches!(err, DemuxError::Io(_)));
}

#[test]
fn test_file_roundtrip_with_seek_index() {
    let packets: Vec<_> = (0..10u32).map(|i| (0u16, i * 40, i % 4 == 0, 64)).collect();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.dmx");
    std::fs::write(&path, chunk_file(&[1], &packets)).unwrap();

    let mut ctx = Context::with_defaults();
    ctx.register_input_format(ChunkFormat::new());
    let mut session = ctx
        .open_input_file(path.to_str().unwrap(), None, 256, None)
        .unwrap();

    let mut positions = Vec::new();
    while let Ok(packet) = session.read_packet() {
        let pos = packet.pos.unwrap();
        positions.push(pos);
        session
            .stream_mut(0)
            .unwrap()
            .add_index_entry(pos, packet.pts.unwrap(), packet.size() as u32, 0, packet.index_flags())
            .unwrap();
    }
    assert_eq!(positions.len(), 10);

    match session.seek_frame(0, 250, SeekFlags::BACKWARD).unwrap() {
        SeekOutcome::Indexed(entry) => {
            assert_eq!(entry.timestamp, 160);
            assert_eq!(entry.pos, positions[4]);
        }
        other => panic!("unexpected seek outcome {:?}", other),
    }
    assert_eq!(session.read_packet().unwrap().pts, Some(160));

    match session.seek_frame(0, 250, SeekFlags::ANY).unwrap() {
        SeekOutcome::Indexed(entry) => assert_eq!(entry.timestamp, 280),
        other => panic!("unexpected seek outcome {:?}", other),
    }

    assert_eq!(
        session.seek_frame(0, 330, SeekFlags::empty()).unwrap(),
        SeekOutcome::Rewound(10)
    );
    assert_eq!(session.read_packet().unwrap().pts, Some(0));

    let size = session.context().io().size().unwrap();
    assert_eq!(size, std::fs::metadata(&path).unwrap().len());
    assert_eq!(session.context().io().seek(0, Whence::Current).unwrap(), positions[1]);

    let index = session.streams()[0].index_entries();
    assert_eq!(index.len(), 10);
    assert!(index.get(8).unwrap().flags.contains(IndexFlags::KEYFRAME));
    session.close().unwrap();
}
