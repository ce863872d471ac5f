//! A single-value blocking latch backing `b_put`/`b_get`.

use std::sync::{Arc, Condvar, Mutex};

pub(crate) struct Promise<D> {
    state: Mutex<Option<D>>,
    cvar: Condvar,
}

impl<D> Promise<D> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(None),
            cvar: Condvar::new(),
        })
    }

    pub(crate) fn set(&self, val: D) {
        let mut guard = self.state.lock().unwrap();
        *guard = Some(val);
        self.cvar.notify_one();
    }

    pub(crate) fn wait(&self) -> D {
        let mut guard = self.state.lock().unwrap();
        while guard.is_none() {
            guard = self.cvar.wait(guard).unwrap();
        }
        guard.take().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_blocks_until_set() {
        let p = Promise::new();
        let p2 = p.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            p2.set(42);
        });
        assert_eq!(p.wait(), 42);
    }
}
