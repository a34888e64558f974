use super::Id;

/// IdGenerator mints monotonically increasing [`Id`] values, shaped like a
/// Twitter-snowflake: a millisecond timestamp in the high bits, a 10-bit
/// shard identifying the generating process (so concurrently-running
/// workers never collide), and a low-order sequence counter that absorbs
/// multiple allocations within the same millisecond.
///
/// Collisions across processes are avoided by picking a random shard per
/// process rather than coordinating shard assignment; a run with a few
/// hundred concurrent workers has a negligible chance of choosing the same
/// shard twice within the same millisecond.
pub struct IdGenerator {
    shard: u64,
    last_millis: u64,
    sequence: u64,
}

const SHARD_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const SHARD_MASK: u64 = (1 << SHARD_BITS) - 1;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

impl IdGenerator {
    pub fn new(shard: u16) -> Self {
        Self {
            shard: shard as u64 & SHARD_MASK,
            last_millis: 0,
            sequence: 0,
        }
    }

    pub fn next(&mut self) -> Id {
        let mut millis = now_millis();

        if millis == self.last_millis {
            self.sequence = (self.sequence + 1) & SEQUENCE_MASK;
            if self.sequence == 0 {
                // Exhausted this millisecond's sequence space; spin until the clock ticks.
                while millis == self.last_millis {
                    millis = now_millis();
                }
            }
        } else {
            self.sequence = 0;
        }
        self.last_millis = millis;

        let value = (millis << (SHARD_BITS + SEQUENCE_BITS))
            | (self.shard << SEQUENCE_BITS)
            | self.sequence;

        Id::new(value.to_be_bytes())
    }
}

static GLOBAL: std::sync::LazyLock<std::sync::Mutex<IdGenerator>> = std::sync::LazyLock::new(|| {
    std::sync::Mutex::new(IdGenerator::new(rand::random()))
});

/// Mints an [`Id`] from a process-wide generator with a randomly chosen
/// shard. Convenient for call sites that only ever need one-off ids and
/// don't want to carry their own `IdGenerator`.
pub fn next_id() -> Id {
    GLOBAL.lock().expect("id generator mutex poisoned").next()
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is before the epoch")
        .as_millis() as u64
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_unique() {
        let mut gen = IdGenerator::new(7);
        let mut last = gen.next();
        for _ in 0..10_000 {
            let next = gen.next();
            assert!(next > last, "ids must strictly increase");
            last = next;
        }
    }

    #[test]
    fn shards_do_not_collide() {
        let mut a = IdGenerator::new(1);
        let mut b = IdGenerator::new(2);
        assert_ne!(a.next(), b.next());
    }
}
