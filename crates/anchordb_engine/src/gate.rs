//! The single-writer gate.
//!
//! At most one write batch exists per store. Acquiring the gate blocks
//! until the current holder commits or drops its batch.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

#[derive(Debug, Default)]
pub(crate) struct WriterGate {
    busy: Mutex<bool>,
    released: Condvar,
}

impl WriterGate {
    pub(crate) fn acquire(self: &Arc<Self>) -> WriterPermit {
        let mut busy = self.busy.lock();
        while *busy {
            self.released.wait(&mut busy);
        }
        *busy = true;
        WriterPermit {
            gate: Arc::clone(self),
        }
    }

    pub(crate) fn try_acquire(self: &Arc<Self>) -> Option<WriterPermit> {
        let mut busy = self.busy.lock();
        if *busy {
            return None;
        }
        *busy = true;
        Some(WriterPermit {
            gate: Arc::clone(self),
        })
    }
}

/// Proof of holding the writer gate. Releases it on drop.
#[derive(Debug)]
pub(crate) struct WriterPermit {
    gate: Arc<WriterGate>,
}

impl Drop for WriterPermit {
    fn drop(&mut self) {
        *self.gate.busy.lock() = false;
        self.gate.released.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn second_writer_waits() {
        let gate = Arc::new(WriterGate::default());
        let permit = gate.acquire();
        assert!(gate.try_acquire().is_none());

        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                let _permit = gate.acquire();
            })
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        drop(permit);
        waiter.join().unwrap();
        assert!(gate.try_acquire().is_some());
    }
}
