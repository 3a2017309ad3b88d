use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out a fixed number of iterations to however many slots pull from it.
#[derive(Debug)]
pub struct IterationGate {
    counter: AtomicU64,
    iterations: u64,
}

impl IterationGate {
    pub fn new(iterations: u64) -> Self {
        Self {
            counter: AtomicU64::new(0),
            iterations,
        }
    }

    /// Claims the next iteration and returns its index, or `None` once all are claimed.
    pub fn next(&self) -> Option<u64> {
        let idx = self.counter.fetch_add(1, Ordering::Relaxed);
        (idx < self.iterations).then_some(idx)
    }

    pub fn is_exhausted(&self) -> bool {
        self.counter.load(Ordering::Relaxed) >= self.iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn every_iteration_is_claimed_once() {
        let gate = Arc::new(IterationGate::new(1_000));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                std::thread::spawn(move || {
                    let mut claimed = Vec::new();
                    while let Some(idx) = gate.next() {
                        claimed.push(idx);
                    }
                    claimed
                })
            })
            .collect();

        let mut all = Vec::new();
        for h in handles {
            match h.join() {
                Ok(v) => all.extend(v),
                Err(_) => panic!("claiming thread panicked"),
            }
        }
        all.sort_unstable();

        assert_eq!(all, (0..1_000).collect::<Vec<_>>());
        assert!(gate.is_exhausted());
    }

    #[test]
    fn zero_iterations_is_exhausted_immediately() {
        let gate = IterationGate::new(0);
        assert!(gate.is_exhausted());
        assert_eq!(gate.next(), None);
    }
}
