use parking_lot::{Condvar, Mutex};

/// A countdown: [`wait`](Latch::wait) blocks until
/// [`count_down`](Latch::count_down) has been called `count` times.
#[derive(Debug)]
pub(crate) struct Latch {
    remaining: Mutex<usize>,
    cv: Condvar,
}

impl Latch {
    pub(crate) fn new(count: usize) -> Self {
        Latch {
            remaining: Mutex::new(count),
            cv: Condvar::new(),
        }
    }

    pub(crate) fn count_down(&self) {
        let mut remaining = self.remaining.lock();
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.cv.notify_all();
        }
    }

    pub(crate) fn wait(&self) {
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            self.cv.wait(&mut remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Latch;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_zero_count_does_not_block() {
        Latch::new(0).wait();
    }

    #[test]
    fn test_waits_for_every_count() {
        let latch = Arc::new(Latch::new(4));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let latch = latch.clone();
                thread::spawn(move || latch.count_down())
            })
            .collect();
        latch.wait();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(*latch.remaining.lock(), 0);
    }
}
