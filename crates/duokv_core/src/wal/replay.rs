//! Corruption-tolerant log replay.
//!
//! Replay rebuilds state from the durable bytes of both logs:
//!
//! 1. Parse the completion log into an `intent_offset -> record` map,
//!    discarding records whose offset lies past the end of the intent log
//!    (the sentinel for garbage).
//! 2. Scan the intent log left to right, validating each header before
//!    trusting its lengths. The first structurally invalid record ends
//!    the scan; the tail is considered torn.
//!
//! Structural damage is **counted, never raised**: an engine must open
//! against any byte soup and report how much of it it refused.

use crate::wal::record::{
    crc16_update, CompletionRecord, CompletionStatus, IntentHeader, COMPLETION_RECORD_SIZE,
    INTENT_HEADER_SIZE, TIMESTAMP_SLACK_NS, VALUE_LEN_BOUND,
};
use crate::wal::Operation;
use std::collections::HashMap;

/// Scans both logs, invoking `visit(op, key, value, completed)` for every
/// recoverable intent record in file order. Returns the number of
/// structurally invalid records observed across both logs.
pub(crate) fn scan(
    intent_bytes: &[u8],
    completion_bytes: &[u8],
    now_ns: u64,
    visit: &mut dyn FnMut(Operation, &[u8], &[u8], bool),
) -> u64 {
    let mut corruption_count = 0u64;
    let completions = parse_completions(
        completion_bytes,
        intent_bytes.len() as u64,
        now_ns,
        &mut corruption_count,
    );

    let mut pos = 0usize;
    while pos < intent_bytes.len() {
        if pos + INTENT_HEADER_SIZE > intent_bytes.len() {
            // Torn header at the tail.
            corruption_count += 1;
            break;
        }

        let mut header_bytes = [0u8; INTENT_HEADER_SIZE];
        header_bytes.copy_from_slice(&intent_bytes[pos..pos + INTENT_HEADER_SIZE]);
        let header = IntentHeader::decode(&header_bytes);

        let Some(op) = header.operation() else {
            corruption_count += 1;
            break;
        };
        if header.value_len_high & 0xF0 != 0 || header.value_len() > VALUE_LEN_BOUND {
            corruption_count += 1;
            break;
        }
        if header.timestamp_ns == 0 || header.timestamp_ns > now_ns.saturating_add(TIMESTAMP_SLACK_NS)
        {
            corruption_count += 1;
            break;
        }

        let key_len = usize::from(header.key_len);
        let value_len = header.value_len() as usize;
        let payload_end = pos + INTENT_HEADER_SIZE + key_len + value_len;
        if payload_end > intent_bytes.len() {
            corruption_count += 1;
            break;
        }

        let key = &intent_bytes[pos + INTENT_HEADER_SIZE..pos + INTENT_HEADER_SIZE + key_len];
        let value = &intent_bytes[pos + INTENT_HEADER_SIZE + key_len..payload_end];

        let crc = crc16_update(crc16_update(crc16_update(0, &header_bytes[..14]), key), value);
        if crc != header.record_crc {
            corruption_count += 1;
            break;
        }

        let completed = completions
            .get(&(pos as u32))
            .map(|record| {
                record.status() == Some(CompletionStatus::Success)
                    && record.data_crc == crc16_update(crc16_update(0, key), value)
            })
            .unwrap_or(false);

        visit(op, key, value, completed);
        pos = payload_end;
    }

    corruption_count
}

/// Parses the completion log into an offset map. Later records for the
/// same intent offset override earlier ones.
fn parse_completions(
    bytes: &[u8],
    intent_file_size: u64,
    now_ns: u64,
    corruption_count: &mut u64,
) -> HashMap<u32, CompletionRecord> {
    let mut map = HashMap::new();
    let mut pos = 0usize;

    while pos < bytes.len() {
        if pos + COMPLETION_RECORD_SIZE > bytes.len() {
            // Torn record at the tail.
            *corruption_count += 1;
            break;
        }

        let mut record_bytes = [0u8; COMPLETION_RECORD_SIZE];
        record_bytes.copy_from_slice(&bytes[pos..pos + COMPLETION_RECORD_SIZE]);
        let record = CompletionRecord::decode(&record_bytes);

        if record.status().is_none() || record.padding != 0 {
            *corruption_count += 1;
            break;
        }
        if record.timestamp_ns == 0
            || record.timestamp_ns > now_ns.saturating_add(TIMESTAMP_SLACK_NS)
        {
            *corruption_count += 1;
            break;
        }

        // Offsets past the intent log are the sentinel for garbage;
        // discard without ending the scan.
        if u64::from(record.intent_offset) < intent_file_size {
            map.insert(record.intent_offset, record);
        }

        pos += COMPLETION_RECORD_SIZE;
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::record::{data_crc, encode_intent};

    const NOW: u64 = 1_700_000_000_000_000_000;

    fn completion(offset: u32, status: CompletionStatus, crc: u16) -> [u8; 16] {
        CompletionRecord::encode(offset, status, crc, NOW - 1)
    }

    fn run(intent: &[u8], completion: &[u8]) -> (Vec<(Operation, Vec<u8>, Vec<u8>, bool)>, u64) {
        let mut seen = Vec::new();
        let count = scan(intent, completion, NOW, &mut |op, key, value, done| {
            seen.push((op, key.to_vec(), value.to_vec(), done));
        });
        (seen, count)
    }

    #[test]
    fn empty_logs_are_clean() {
        let (seen, count) = run(&[], &[]);
        assert!(seen.is_empty());
        assert_eq!(count, 0);
    }

    #[test]
    fn completed_and_incomplete_intents() {
        let mut intent = encode_intent(Operation::Set, b"a", b"1", NOW - 5);
        let second_offset = intent.len() as u32;
        intent.extend(encode_intent(Operation::Set, b"b", b"2", NOW - 4));

        let completions = completion(0, CompletionStatus::Success, data_crc(b"a", b"1"));

        let (seen, count) = run(&intent, &completions);
        assert_eq!(count, 0);
        assert_eq!(seen.len(), 2);
        assert!(seen[0].3, "completed intent must replay as completed");
        assert!(!seen[1].3, "intent without completion must not");
        assert!(second_offset > 0);
    }

    #[test]
    fn non_success_status_is_not_completed() {
        let intent = encode_intent(Operation::Set, b"a", b"1", NOW - 5);
        for status in [
            CompletionStatus::IoError,
            CompletionStatus::ChecksumError,
            CompletionStatus::Timeout,
        ] {
            let completions = completion(0, status, data_crc(b"a", b"1"));
            let (seen, count) = run(&intent, &completions);
            assert_eq!(count, 0);
            assert!(!seen[0].3);
        }
    }

    #[test]
    fn mismatched_data_crc_is_not_completed() {
        let intent = encode_intent(Operation::Set, b"a", b"1", NOW - 5);
        let completions = completion(0, CompletionStatus::Success, 0xDEAD);
        let (seen, count) = run(&intent, &completions);
        assert_eq!(count, 0);
        assert!(!seen[0].3);
    }

    #[test]
    fn completion_past_intent_end_is_discarded() {
        let intent = encode_intent(Operation::Set, b"a", b"1", NOW - 5);
        // Sentinel offset far past the intent file.
        let completions = completion(u32::MAX, CompletionStatus::Success, 0);
        let (seen, count) = run(&intent, &completions);
        assert_eq!(count, 0);
        assert!(!seen[0].3);
    }

    #[test]
    fn later_completion_wins() {
        let intent = encode_intent(Operation::Set, b"a", b"1", NOW - 5);
        let mut completions = completion(0, CompletionStatus::IoError, 0).to_vec();
        completions
            .extend_from_slice(&completion(0, CompletionStatus::Success, data_crc(b"a", b"1")));

        let (seen, _) = run(&intent, &completions);
        assert!(seen[0].3);
    }

    #[test]
    fn torn_intent_tail_counts_once() {
        let mut intent = encode_intent(Operation::Set, b"a", b"1", NOW - 5);
        intent.extend_from_slice(&[0xAA; 7]); // partial header

        let (seen, count) = run(&intent, &[]);
        assert_eq!(seen.len(), 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn truncated_payload_counts_once() {
        let mut intent = encode_intent(Operation::Set, b"key", b"a longer value", NOW - 5);
        intent.truncate(intent.len() - 4);

        let (seen, count) = run(&intent, &[]);
        assert!(seen.is_empty());
        assert_eq!(count, 1);
    }

    #[test]
    fn bad_operation_bits_end_the_scan() {
        let mut intent = encode_intent(Operation::Set, b"a", b"1", NOW - 5);
        let tail = encode_intent(Operation::Set, b"b", b"2", NOW - 4);
        let tail_start = intent.len();
        intent.extend(tail);
        intent[tail_start + 13] = 0x03; // undefined operation

        let (seen, count) = run(&intent, &[]);
        assert_eq!(seen.len(), 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn zero_timestamp_is_corrupt() {
        let intent = encode_intent(Operation::Set, b"a", b"1", 0);
        let (seen, count) = run(&intent, &[]);
        assert!(seen.is_empty());
        assert_eq!(count, 1);
    }

    #[test]
    fn future_timestamp_is_corrupt() {
        let intent = encode_intent(Operation::Set, b"a", b"1", NOW + 2 * TIMESTAMP_SLACK_NS);
        let (seen, count) = run(&intent, &[]);
        assert!(seen.is_empty());
        assert_eq!(count, 1);
    }

    #[test]
    fn reserved_value_nibble_is_corrupt() {
        let mut intent = encode_intent(Operation::Set, b"a", b"1", NOW - 5);
        intent[12] = 0xF0;
        let (seen, count) = run(&intent, &[]);
        assert!(seen.is_empty());
        assert_eq!(count, 1);
    }

    #[test]
    fn crc_mismatch_ends_the_scan() {
        let mut intent = encode_intent(Operation::Set, b"a", b"1", NOW - 5);
        let good = encode_intent(Operation::Set, b"b", b"2", NOW - 4);
        intent.extend(good);
        // Flip one payload bit of the first record; the second becomes
        // unreachable tail by contract.
        intent[INTENT_HEADER_SIZE] ^= 0x01;

        let (seen, count) = run(&intent, &[]);
        assert!(seen.is_empty());
        assert_eq!(count, 1);
    }

    #[test]
    fn corrupt_completion_record_halts_completion_scan() {
        let mut intent = encode_intent(Operation::Set, b"a", b"1", NOW - 5);
        let second = intent.len() as u32;
        intent.extend(encode_intent(Operation::Set, b"b", b"2", NOW - 4));

        // First completion is damaged (bad padding); the second, though
        // well-formed, is past the halt point and must be ignored.
        let mut completions = completion(0, CompletionStatus::Success, data_crc(b"a", b"1")).to_vec();
        completions[15] = 0x55;
        completions.extend_from_slice(&completion(
            second,
            CompletionStatus::Success,
            data_crc(b"b", b"2"),
        ));

        let (seen, count) = run(&intent, &completions);
        assert_eq!(count, 1);
        assert!(!seen[0].3);
        assert!(!seen[1].3);
    }
}
