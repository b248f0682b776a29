//! Additive tick-time jitter for the scheduler
//!
//! Every installation polling its receiver on the same round interval would
//! otherwise tick in lockstep after a fleet-wide restart. Each scheduled
//! delay gets a signed offset drawn from the system clock's sub-second
//! remainder, which is cheap and avoids pulling in a random-number crate.

/// Offset in `[-max_jitter_ms, +max_jitter_ms]`, pseudo-random per call.
pub fn signed_jitter_ms(max_jitter_ms: u64) -> i64 {
    if max_jitter_ms == 0 {
        return 0;
    }

    let span = 2 * max_jitter_ms + 1;
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    (nanos % span) as i64 - max_jitter_ms as i64
}
