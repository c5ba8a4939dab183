use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Time source for entry timestamps and cleanup ticks.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> SystemTime;

    /// Current Unix time in whole seconds.
    fn epoch(&self) -> i64;
}

/// Reads the system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn epoch(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        }
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    epoch: AtomicI64,
}

impl ManualClock {
    pub fn new(epoch: i64) -> Self {
        ManualClock {
            epoch: AtomicI64::new(epoch),
        }
    }

    pub fn set(&self, epoch: i64) {
        self.epoch.store(epoch, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.epoch.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        let epoch = self.epoch();
        if epoch >= 0 {
            UNIX_EPOCH + Duration::from_secs(epoch as u64)
        } else {
            UNIX_EPOCH - Duration::from_secs(epoch.unsigned_abs())
        }
    }

    fn epoch(&self) -> i64 {
        self.epoch.load(Ordering::SeqCst)
    }
}
