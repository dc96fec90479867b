//! Dual write-ahead log for durability and crash recovery.
//!
//! Every mutation appends an **intent record** (what is about to happen)
//! before it touches the index, and a **completion record** (how it went)
//! after. The two record streams live in independent logs, each staged in
//! a ring-reused in-memory buffer and flushed through its own I/O ring.
//!
//! ## On-disk layout
//!
//! ```text
//! intent log:     IntentHeader (16, LE) | key | value   ... packed, no padding
//! completion log: CompletionRecord (16, LE)             ... packed
//! ```
//!
//! ## Recovery policy
//!
//! Replay never raises on data-level damage. A structurally invalid
//! record ends the scan of its log and increments a single corruption
//! counter surfaced through the open result; the tail past it is treated
//! as torn. An intent replays as *completed* only when a successful
//! completion references its offset and the completion's data CRC matches
//! the intent payload - anything else (missing, failed, `checksum_error`,
//! stale CRC) leaves the intent invisible.
//!
//! ## Invariants
//!
//! - Within one log, records appear in append order
//! - An append is durable only after a successful [`DualWal::flush`]
//! - Replay is idempotent: scanning the same bytes yields the same visits

mod log;
mod record;
mod replay;

pub use log::DualWal;
pub use record::{
    crc16_arc, crc16_update, data_crc, encode_intent, CompletionRecord, CompletionStatus,
    IntentHeader, Operation, COMPLETION_RECORD_SIZE, INTENT_HEADER_SIZE, MAX_KEY_LEN,
    MAX_VALUE_LEN, TIMESTAMP_SLACK_NS, VALUE_LEN_BOUND,
};
