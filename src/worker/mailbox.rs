use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Single-slot mailbox. A new item replaces an unread one; `put` never blocks
/// on the reader.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
    overwritten: AtomicU64,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
            overwritten: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        // The slot holds plain data, so a poisoned lock is still consistent.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store `item`. Returns true when an unread item was replaced.
    pub fn put(&self, item: T) -> bool {
        let replaced = self.lock().replace(item).is_some();
        if replaced {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        self.ready.notify_all();
        replaced
    }

    /// Take the latest item, if any.
    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    /// Take the latest item, waiting up to `timeout` for one to arrive.
    pub fn wait(&self, timeout: Duration) -> Option<T> {
        let guard = self.lock();
        let (mut guard, _) = self
            .ready
            .wait_timeout_while(guard, timeout, |slot| slot.is_none())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.take()
    }

    /// Items dropped because the reader had not taken them yet.
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn newer_item_overwrites_older() {
        let mailbox = Mailbox::new();
        assert!(!mailbox.put(1));
        assert!(mailbox.put(2));
        assert_eq!(mailbox.take(), Some(2));
        assert_eq!(mailbox.take(), None);
        assert_eq!(mailbox.overwritten(), 1);
    }

    #[test]
    fn reader_sees_increasing_sequence() {
        let mailbox = Arc::new(Mailbox::new());
        let writer = {
            let mailbox = mailbox.clone();
            thread::spawn(move || {
                for seq in 1..=500u64 {
                    mailbox.put(seq);
                }
            })
        };
        let mut last = 0;
        let mut seen = 0;
        while seen < 500 {
            match mailbox.wait(Duration::from_millis(200)) {
                Some(seq) => {
                    assert!(seq > last);
                    last = seq;
                    seen = seq;
                }
                None => break,
            }
        }
        writer.join().expect("writer thread");
        assert_eq!(last, 500);
    }

    #[test]
    fn wait_times_out_when_empty() {
        let mailbox: Mailbox<u8> = Mailbox::new();
        assert_eq!(mailbox.wait(Duration::from_millis(10)), None);
    }
}
