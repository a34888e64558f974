/// Atomically appends one file entry to the pending-batch list and adds its
/// token count to the running total. If the new total has crossed the
/// threshold, resets both counters to empty/zero and returns the collected
/// batch; otherwise returns nil. Two workers racing this script can never
/// both observe a crossing for the same entries, because Redis executes
/// the whole script as a single atomic step (C5, §4.2/§9).
///
/// KEYS[1] = pending-entries list key
/// KEYS[2] = token-total counter key
/// ARGV[1] = JSON-encoded file entry to push
/// ARGV[2] = token count contributed by this entry
/// ARGV[3] = MAX_BATCH_TOKENS threshold
pub const BATCH_THRESHOLD_SWAP: &str = r#"
redis.call('RPUSH', KEYS[1], ARGV[1])
local total = redis.call('INCRBY', KEYS[2], ARGV[2])
if tonumber(total) >= tonumber(ARGV[3]) then
    local batch = redis.call('LRANGE', KEYS[1], 0, -1)
    redis.call('DEL', KEYS[1])
    redis.call('SET', KEYS[2], 0)
    return batch
else
    return false
end
"#;

/// Atomically increments the evidence counter for one relationship
/// fingerprint and reports whether this increment was the one that reached
/// the expected count. Using equality (not `>=`) against the expected count
/// means exactly one caller ever observes the crossing, even under
/// concurrent increments, satisfying "the reconciliation job for H is
/// enqueued exactly once after the N-th evidence arrives" (§8, C12).
///
/// KEYS[1] = evidence counter key for one (run_id, fingerprint)
/// ARGV[1] = expected evidence count for this fingerprint
pub const EVIDENCE_COUNTER_CHECK_AND_FETCH: &str = r#"
local count = redis.call('INCR', KEYS[1])
local expected = tonumber(ARGV[1])
if count == expected then
    return 1
else
    return 0
end
"#;
