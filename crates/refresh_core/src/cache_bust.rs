use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::CacheBusting;

/// Source of `rand` values for refresh URLs.
///
/// Consecutive values must differ so every assignment looks like a new
/// resource to browser and proxy caches.
pub trait CacheBuster: Send {
    fn next_value(&mut self) -> u64;
}

/// Random values drawn from v4 UUIDs.
#[derive(Debug, Default)]
pub struct RandomCacheBuster {
    last: Option<u64>,
}

impl RandomCacheBuster {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBuster for RandomCacheBuster {
    fn next_value(&mut self) -> u64 {
        loop {
            // low half: 62 random bits plus the variant marker
            let value = uuid::Uuid::new_v4().as_u128() as u64;
            if self.last != Some(value) {
                self.last = Some(value);
                return value;
            }
        }
    }
}

/// Monotonic counter.
#[derive(Debug)]
pub struct CounterCacheBuster {
    next: u64,
}

impl CounterCacheBuster {
    pub fn starting_at(first: u64) -> Self {
        CounterCacheBuster { next: first }
    }

    /// Counter seeded with the current unix time in milliseconds, so a
    /// restarted viewer does not replay URLs an upstream cache already holds.
    pub fn seeded_from_clock() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        Self::starting_at(millis)
    }
}

impl CacheBuster for CounterCacheBuster {
    fn next_value(&mut self) -> u64 {
        let value = self.next;
        self.next = self.next.wrapping_add(1);
        value
    }
}

pub fn for_strategy(strategy: CacheBusting) -> Box<dyn CacheBuster> {
    match strategy {
        CacheBusting::Random => Box::new(RandomCacheBuster::new()),
        CacheBusting::Counter => Box::new(CounterCacheBuster::seeded_from_clock()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_values_differ() {
        let mut buster = RandomCacheBuster::new();
        let mut previous = buster.next_value();
        for _ in 0..1000 {
            let value = buster.next_value();
            assert_ne!(value, previous);
            previous = value;
        }
    }

    #[test]
    fn test_random_values_are_spread() {
        let mut buster = RandomCacheBuster::new();
        let values: HashSet<u64> = (0..500).map(|_| buster.next_value()).collect();
        assert_eq!(values.len(), 500);
    }

    #[test]
    fn test_counter_is_monotonic() {
        let mut buster = CounterCacheBuster::starting_at(7);
        assert_eq!(buster.next_value(), 7);
        assert_eq!(buster.next_value(), 8);
        assert_eq!(buster.next_value(), 9);
    }

    #[test]
    fn test_clock_seeded_counter_starts_after_epoch() {
        let mut buster = CounterCacheBuster::seeded_from_clock();
        let first = buster.next_value();
        assert!(first > 0);
        assert_eq!(buster.next_value(), first + 1);
    }

    #[test]
    fn test_for_strategy() {
        let mut counter = for_strategy(CacheBusting::Counter);
        let first = counter.next_value();
        assert_eq!(counter.next_value(), first + 1);

        let mut random = for_strategy(CacheBusting::Random);
        assert_ne!(random.next_value(), random.next_value());
    }
}
