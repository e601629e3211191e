//! End-to-end decoder behaviour: schema construction from a header, row
//! contents, buffer-full signalling and doubled waveform packets.

use orca_buffers::{BufferLibrary, Scalar};
use orca_core::{get_ccc, CardInfo, RunHeader, SchemaError};
use orca_decoders::{Decode, Decoder, HardwareKind, ScalerDecoder, Sis3316Decoder};
use proptest::prelude::*;

const WAVEFORM_ID: u32 = 1;
const SCALER_ID: u32 = 2;

// =============================================================================
// Packet builders
// =============================================================================

fn sis3316_header(crate_id: u32, card: u32, channel: u32, ts: u64) -> Vec<u32> {
    let mut words = vec![0u32; 27];
    words[1] = (crate_id << 21) | (card << 16) | (channel << 8);
    words[10] = ((ts >> 16) as u32) & 0xFFFF_0000;
    words[11] = ts as u32;
    words
}

/// Pack samples two per word, low half first.
fn pack(samples: &[u16]) -> Vec<u32> {
    samples
        .chunks(2)
        .map(|pair| u32::from(pair[0]) | (u32::from(*pair.get(1).unwrap_or(&0)) << 16))
        .collect()
}

fn finish(mut words: Vec<u32>, data_id: u32) -> Vec<u32> {
    words[0] = (data_id << 18) | words.len() as u32;
    words
}

fn waveform_packet(channel: u32, ts: u64, samples: &[u16]) -> Vec<u32> {
    let mut words = sis3316_header(0, 5, channel, ts);
    words.extend(pack(samples));
    finish(words, WAVEFORM_ID)
}

fn doubled_packet(first: (u32, u64, &[u16]), second: (u32, u64, &[u16])) -> Vec<u32> {
    let mut words = sis3316_header(0, 5, first.0, first.1);
    words.extend(pack(first.2));
    words.extend(sis3316_header(0, 5, second.0, second.1));
    words.extend(pack(second.2));
    finish(words, WAVEFORM_ID)
}

fn scaler_packet(crate_id: u32, card: u32, ts: u32, counts: &[u32; 32]) -> Vec<u32> {
    let mut words = vec![0, (crate_id << 21) | (card << 16) | 1, ts, 0, u32::MAX, 0, 0];
    words.extend_from_slice(counts);
    finish(words, SCALER_ID)
}

// =============================================================================
// Fixtures
// =============================================================================

fn waveform_setup(trace_length: i64, capacity: usize) -> (Sis3316Decoder, BufferLibrary) {
    let header = RunHeader::builder()
        .card(0, CardInfo::new("ORSIS3316Model", 5).with_trace_length(trace_length))
        .build();
    let mut decoder = Sis3316Decoder::new();
    decoder.build_schema(&header).unwrap();
    let mut buffers = BufferLibrary::new();
    buffers
        .allocate_all(decoder.schema(None).unwrap().all().unwrap(), capacity)
        .unwrap();
    (decoder, buffers)
}

fn scaler_setup(capacity: usize) -> (ScalerDecoder, BufferLibrary) {
    let header = RunHeader::builder()
        .card(1, CardInfo::new("ORSIS3820Model", 4))
        .build();
    let mut decoder = ScalerDecoder::new();
    decoder.build_schema(&header).unwrap();
    let mut buffers = BufferLibrary::new();
    buffers
        .allocate_all(decoder.schema(None).unwrap().all().unwrap(), capacity)
        .unwrap();
    (decoder, buffers)
}

// =============================================================================
// Schema construction
// =============================================================================

#[test]
fn test_schema_count_is_crates_times_cards_times_channels() {
    let mut builder = RunHeader::builder();
    for crate_id in 0..3 {
        for card in [2, 7] {
            builder = builder.card(
                crate_id,
                CardInfo::new("ORSIS3316Model", card).with_trace_length(64),
            );
        }
    }
    let header = builder.build();

    let mut decoder = Decoder::new(HardwareKind::Sis3316);
    assert!(matches!(
        decoder.key_list(),
        Err(SchemaError::SchemaNotBuilt { .. })
    ));
    assert_eq!(decoder.build_schema(&header).unwrap(), 3 * 2 * 16);

    let keys = decoder.key_list().unwrap();
    assert_eq!(keys.len(), 96);
    let mut sorted = keys.clone();
    sorted.dedup();
    assert_eq!(sorted.len(), 96, "keys collide across crates and cards");
}

#[test]
fn test_unknown_key_query() {
    let (decoder, _) = waveform_setup(16, 4);
    assert!(matches!(
        decoder.schema(Some(get_ccc(0, 6, 0))),
        Err(SchemaError::UnknownChannelKey { .. })
    ));
}

// =============================================================================
// Scaler
// =============================================================================

#[test]
fn test_scaler_writes_one_row_per_channel() {
    let (mut decoder, mut buffers) = scaler_setup(16);
    let counts: [u32; 32] = std::array::from_fn(|i| 1000 + i as u32 * 3);

    let full = decoder
        .decode_packet(&scaler_packet(1, 4, 1_700_000_123, &counts), 77, &mut buffers)
        .unwrap();

    assert!(!full);
    assert_eq!(buffers.total_rows(), 32);
    for (i, &count) in counts.iter().enumerate() {
        let buf = buffers.get(get_ccc(1, 4, i as u8)).unwrap();
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.scalar("channel", 0), Some(Scalar::U(i as u64)));
        assert_eq!(buf.scalar("counts", 0), Some(Scalar::U(u64::from(count))));
        assert_eq!(buf.scalar("timestamp", 0), Some(Scalar::U(1_700_000_123)));
        assert_eq!(buf.scalar("crate", 0), Some(Scalar::U(1)));
        assert_eq!(buf.scalar("card", 0), Some(Scalar::U(4)));
        assert_eq!(buf.scalar("packet_id", 0), Some(Scalar::U(77)));
    }
}

#[test]
fn test_scaler_returns_true_exactly_when_full() {
    let (mut decoder, mut buffers) = scaler_setup(3);
    let pkt = scaler_packet(1, 4, 1, &[1; 32]);

    assert!(!decoder.decode_packet(&pkt, 0, &mut buffers).unwrap());
    assert!(!decoder.decode_packet(&pkt, 1, &mut buffers).unwrap());
    assert!(decoder.decode_packet(&pkt, 2, &mut buffers).unwrap());
    assert_eq!(buffers.take_full().len(), 32);
    assert!(buffers.is_full(get_ccc(1, 4, 0)));
}

#[test]
fn test_unregistered_card_leaves_buffers_untouched() {
    let (mut decoder, mut buffers) = scaler_setup(4);
    let pkt = scaler_packet(1, 9, 1, &[5; 32]);

    assert!(!decoder.decode_packet(&pkt, 0, &mut buffers).unwrap());
    assert_eq!(buffers.total_rows(), 0);
    assert!(buffers.take_full().is_empty());
    assert_eq!(decoder.skipped_channels().len(), 32);
}

// =============================================================================
// Waveforms
// =============================================================================

#[test]
fn test_waveform_single_event() {
    let (mut decoder, mut buffers) = waveform_setup(6, 8);
    let samples = [10, 11, 12, 13, 14, 15];

    assert!(!decoder
        .decode_packet(&waveform_packet(3, 0xABCD_0000_0042, &samples), 4, &mut buffers)
        .unwrap());

    let buf = buffers.get(get_ccc(0, 5, 3)).unwrap();
    assert_eq!(buf.len(), 1);
    assert_eq!(buf.samples("waveform", 0), Some(&samples[..]));
    assert_eq!(buf.scalar("timestamp", 0), Some(Scalar::U(0xABCD_0000_0042)));
    assert_eq!(buf.scalar("channel", 0), Some(Scalar::U(3)));
}

#[test]
fn test_waveform_doubled_packet_gives_two_independent_rows() {
    let (mut decoder, mut buffers) = waveform_setup(6, 8);
    let first = [1, 2, 3, 4, 5, 6];
    let second = [7, 8, 9, 10, 11, 12];
    let pkt = doubled_packet((3, 100, &first), (3, 250, &second));

    assert!(!decoder.decode_packet(&pkt, 9, &mut buffers).unwrap());

    let buf = buffers.get(get_ccc(0, 5, 3)).unwrap();
    assert_eq!(buf.len(), 2);
    assert_eq!(buf.samples("waveform", 0), Some(&first[..]));
    assert_eq!(buf.samples("waveform", 1), Some(&second[..]));
    assert_eq!(buf.scalar("timestamp", 0), Some(Scalar::U(100)));
    assert_eq!(buf.scalar("timestamp", 1), Some(Scalar::U(250)));
    assert_eq!(decoder.dropped_second_events(), 0);
}

#[test]
fn test_waveform_odd_trace_length_doubled() {
    let (mut decoder, mut buffers) = waveform_setup(3, 8);
    // header(54) + 3 + header(54) + 3 half-words = 57 words
    let mut halves: Vec<u16> = Vec::new();
    for (channel, ts, samples) in [(1u32, 5u64, [1u16, 2, 3]), (2, 6, [4, 5, 6])] {
        for w in sis3316_header(0, 5, channel, ts) {
            halves.push((w & 0xFFFF) as u16);
            halves.push((w >> 16) as u16);
        }
        halves.extend(samples);
    }
    let pkt = finish(pack(&halves), WAVEFORM_ID);

    decoder.decode_packet(&pkt, 0, &mut buffers).unwrap();

    let buf = buffers.get(get_ccc(0, 5, 1)).unwrap();
    assert_eq!(buf.len(), 2);
    assert_eq!(buf.samples("waveform", 1), Some(&[4, 5, 6][..]));
    assert_eq!(buf.scalar("channel", 1), Some(Scalar::U(2)));
    assert_eq!(buf.scalar("timestamp", 1), Some(Scalar::U(6)));
}

#[test]
fn test_waveform_doubled_packet_at_capacity_minus_one() {
    let (mut decoder, mut buffers) = waveform_setup(4, 2);
    let key = get_ccc(0, 5, 0);
    let samples = [1, 2, 3, 4];

    assert!(!decoder
        .decode_packet(&waveform_packet(0, 1, &samples), 0, &mut buffers)
        .unwrap());
    assert_eq!(buffers.rows(key), Some(1));

    let pkt = doubled_packet((0, 2, &samples), (0, 3, &[9, 9, 9, 9]));
    assert!(decoder.decode_packet(&pkt, 1, &mut buffers).unwrap());

    let buf = buffers.get(key).unwrap();
    assert_eq!(buf.cursor(), buf.capacity());
    assert_eq!(buf.scalar("timestamp", 1), Some(Scalar::U(2)));
    assert_eq!(decoder.dropped_second_events(), 1);
}

#[test]
fn test_waveform_doubled_packet_missing_second_trace() {
    let (mut decoder, mut buffers) = waveform_setup(4, 8);
    let mut words = sis3316_header(0, 5, 0, 1);
    words.extend(pack(&[1, 2, 3, 4]));
    words.extend([0u32; 5]);
    let pkt = finish(words, WAVEFORM_ID);

    assert!(!decoder.decode_packet(&pkt, 0, &mut buffers).unwrap());
    assert_eq!(buffers.rows(get_ccc(0, 5, 0)), Some(1));
    assert_eq!(decoder.dropped_second_events(), 1);
}

#[test]
fn test_waveform_fill_signals_full() {
    let (mut decoder, mut buffers) = waveform_setup(2, 2);
    let pkt = doubled_packet((7, 1, &[1, 2]), (7, 2, &[3, 4]));

    assert!(decoder.decode_packet(&pkt, 0, &mut buffers).unwrap());
    assert_eq!(buffers.take_full(), vec![get_ccc(0, 5, 7)]);
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn unregistered_waveform_channel_changes_nothing(
        crate_id in 0u32..16,
        card in 0u32..32,
        channel in 0u32..256,
    ) {
        prop_assume!(!(crate_id == 0 && card == 5 && channel < 16));
        let (mut decoder, mut buffers) = waveform_setup(4, 4);
        let mut words = sis3316_header(crate_id, card, channel, 1);
        words.extend(pack(&[1, 2, 3, 4]));
        let pkt = finish(words, WAVEFORM_ID);

        prop_assert!(!decoder.decode_packet(&pkt, 0, &mut buffers).unwrap());
        prop_assert_eq!(buffers.total_rows(), 0);
        prop_assert!(buffers.iter().all(|(_, buf)| buf.cursor() == 0));
        prop_assert_eq!(decoder.skipped_channels().values().sum::<u64>(), 1);
    }
}
