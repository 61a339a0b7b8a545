use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug, Default)]
struct Slot {
    /// Bumped by every `show`; an expiry only clears the notice it was
    /// started for.
    generation: u64,
    current: Option<Notice>,
}

/// One transient message at a time. A newer message replaces the old one and
/// restarts the clock; stale expiries are ignored.
#[derive(Debug, Clone)]
pub struct Notifier {
    slot: Arc<Mutex<Slot>>,
    timeout: Duration,
}

impl Notifier {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::default())),
            timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn show(&self, level: NoticeLevel, message: impl Into<String>) {
        let generation = {
            let mut slot = self.lock();
            slot.generation += 1;
            slot.current = Some(Notice {
                level,
                message: message.into(),
            });
            slot.generation
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("No runtime to expire notice {}; it stays until replaced", generation);
            return;
        };

        let slot = Arc::downgrade(&self.slot);
        let timeout = self.timeout;
        runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(slot) = slot.upgrade() {
                let mut slot = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if slot.generation == generation {
                    slot.current = None;
                }
            }
        });
    }

    pub fn show_info(&self, message: impl Into<String>) {
        self.show(NoticeLevel::Info, message);
    }

    pub fn show_error(&self, message: impl Into<String>) {
        self.show(NoticeLevel::Error, message);
    }

    pub fn current(&self) -> Option<Notice> {
        self.lock().current.clone()
    }

    pub fn clear(&self) {
        let mut slot = self.lock();
        slot.generation += 1;
        slot.current = None;
    }
}
