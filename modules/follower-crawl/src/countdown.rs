use std::sync::atomic::{AtomicU64, Ordering};

/// Followers still to be processed in this run.
///
/// Seeded once with the expected follower count and only ever decremented.
/// The value saturates at zero; decrements past zero are tallied separately
/// so a report can show that the graph yielded more ids than announced.
#[derive(Debug)]
pub struct Countdown {
    remaining: AtomicU64,
    surplus: AtomicU64,
}

impl Countdown {
    pub fn new(total: u64) -> Self {
        Self {
            remaining: AtomicU64::new(total),
            surplus: AtomicU64::new(0),
        }
    }

    /// Record one processed follower. Returns the value left afterwards.
    pub fn decrement(&self) -> u64 {
        match self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => {
                self.surplus.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    pub fn finished(&self) -> bool {
        self.remaining() == 0
    }

    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Acquire)
    }

    /// Decrements that arrived after the count had already reached zero.
    pub fn surplus(&self) -> u64 {
        self.surplus.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn counts_down_to_finished() {
        let c = Countdown::new(2);
        assert!(!c.finished());
        assert_eq!(c.decrement(), 1);
        assert!(!c.finished());
        assert_eq!(c.decrement(), 0);
        assert!(c.finished());
    }

    #[test]
    fn saturates_at_zero() {
        let c = Countdown::new(1);
        c.decrement();
        assert_eq!(c.decrement(), 0);
        assert_eq!(c.decrement(), 0);
        assert_eq!(c.remaining(), 0);
        assert_eq!(c.surplus(), 2);
    }

    #[test]
    fn empty_countdown_starts_finished() {
        assert!(Countdown::new(0).finished());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_decrements_are_exact() {
        let c = Arc::new(Countdown::new(1000));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = c.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..125 {
                    c.decrement();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(c.finished());
        assert_eq!(c.surplus(), 0);
    }
}
