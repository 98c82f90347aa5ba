//! Snowflake-style identifiers for snapshots.

use parking_lot::Mutex;

/// First millisecond of 2015, the platform's snowflake epoch
const DISCORD_EPOCH: u64 = 1_420_070_400_000;

const SEQUENCE_BITS: u64 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const TIMESTAMP_SHIFT: u64 = 22;

struct Generator {
    last_ms: u64,
    sequence: u64,
}

static GENERATOR: Mutex<Generator> = parking_lot::const_mutex(Generator {
    last_ms: 0,
    sequence: 0,
});

/// Generate a new identifier. Identifiers are strictly increasing within a process.
pub fn generate() -> String {
    let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let mut state = GENERATOR.lock();

    let mut ms = now.saturating_sub(DISCORD_EPOCH).max(state.last_ms);
    if ms == state.last_ms {
        state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
        if state.sequence == 0 {
            // Sequence exhausted for this millisecond
            ms += 1;
        }
    } else {
        state.sequence = 0;
    }
    state.last_ms = ms;

    ((ms << TIMESTAMP_SHIFT) | state.sequence).to_string()
}
