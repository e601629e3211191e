//! Criterion benchmarks for the decode hot path.
//!
//! Key metrics:
//! - Waveform packets per second for several trace lengths
//! - Scaler packets per second (32 rows per packet)
//! - Framing throughput of the packet reader
//!
//! Run with: cargo bench --bench decode_throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use orca_core::{CardInfo, RunHeader};
use orca_daq::config::{ByteOrder, StreamConfig};
use orca_daq::dispatch::{DiscardSink, DispatchLoop};
use orca_daq::stream::{encode_packets, PacketReader};
use orca_decoders::BufferCapacities;
use std::io::Cursor;

const WAVEFORM_ID: u32 = 1;
const SCALER_ID: u32 = 2;

const CAPACITIES: BufferCapacities = BufferCapacities {
    general: 1024,
    waveform: 128,
};

fn header(trace_length: i64) -> RunHeader {
    RunHeader::builder()
        .card(0, CardInfo::new("ORSIS3316Model", 5).with_trace_length(trace_length))
        .card(0, CardInfo::new("ORSIS3820Model", 3))
        .data_id("ORSIS3316Model", "Waveform", WAVEFORM_ID, "ORSIS3316WaveformDecoder")
        .data_id("ORSIS3820Model", "Counts", SCALER_ID, "ORSIS3820DecoderForCounts")
        .build()
}

fn waveform_packet(channel: u32, trace_length: usize) -> Vec<u32> {
    let mut words = vec![0u32; 27];
    words[1] = (5 << 16) | (channel << 8);
    words.extend((0..trace_length.div_ceil(2)).map(|i| i as u32 | 0x0100_0000));
    words[0] = (WAVEFORM_ID << 18) | words.len() as u32;
    words
}

fn scaler_packet() -> Vec<u32> {
    let mut words = vec![0, 3 << 16, 0, 0, 0, 0, 0];
    words.extend(0..32u32);
    words[0] = (SCALER_ID << 18) | words.len() as u32;
    words
}

/// Decode waveform packets across all 16 channels of one card.
fn waveform_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("waveform_decode");

    for trace_length in [256usize, 2048, 16384] {
        let mut dispatch = DispatchLoop::from_header(
            &header(trace_length as i64),
            CAPACITIES,
            DiscardSink,
        )
        .unwrap();
        let packets: Vec<Vec<u32>> = (0..16).map(|ch| waveform_packet(ch, trace_length)).collect();

        group.throughput(Throughput::Elements(packets.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("samples", trace_length),
            &packets,
            |b, packets| {
                b.iter(|| {
                    for (id, packet) in packets.iter().enumerate() {
                        dispatch.process_packet(black_box(packet), id as u32).unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn scaler_decode(c: &mut Criterion) {
    let mut dispatch =
        DispatchLoop::from_header(&header(64), CAPACITIES, DiscardSink).unwrap();
    let packet = scaler_packet();

    let mut group = c.benchmark_group("scaler_decode");
    group.throughput(Throughput::Elements(1));
    group.bench_function("packet", |b| {
        b.iter(|| dispatch.process_packet(black_box(&packet), 0).unwrap());
    });
    group.finish();
}

/// Packet framing alone, without decoding.
fn stream_framing(c: &mut Criterion) {
    let packets: Vec<Vec<u32>> = (0..1024).map(|ch| waveform_packet(ch % 16, 512)).collect();
    let bytes = encode_packets(packets.iter().map(Vec::as_slice), ByteOrder::Little);
    let config = StreamConfig::default();

    let mut group = c.benchmark_group("stream_framing");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("read_packet", |b| {
        b.iter(|| {
            let mut reader = PacketReader::new(Cursor::new(bytes.as_slice()), &config);
            let mut words = Vec::new();
            while reader.read_packet(&mut words).unwrap() {
                black_box(&words);
            }
        });
    });
    group.finish();
}

criterion_group!(benches, waveform_decode, scaler_decode, stream_framing);
criterion_main!(benches);
