mod form;
mod list;
mod notice;
mod screen;

#[cfg(test)]
mod testing;

pub use form::FormState;
pub use notice::{Notice, NoticeLevel, Notifier};
pub use screen::{DeleteOutcome, Screen, WriteOutcome};
