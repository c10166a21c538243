use std::borrow::Cow;
use std::time::Instant;

use log::{self, Level};

/// Logs how long a scope took when dropped.
pub struct ScopedTimer {
    label: Option<Cow<'static, str>>,
    level: Level,
    start: Option<Instant>,
}

impl ScopedTimer {
    pub fn with_level(label: impl Into<Cow<'static, str>>, level: Level) -> Self {
        Self {
            label: Some(label.into()),
            level,
            start: Some(Instant::now()),
        }
    }

    pub fn info(label: impl Into<Cow<'static, str>>) -> Self {
        Self::with_level(label, Level::Info)
    }

    pub fn debug(label: impl Into<Cow<'static, str>>) -> Self {
        Self::with_level(label, Level::Debug)
    }

    /// Skips building the label entirely when debug logging is off.
    pub fn debug_lazy<F>(label_gen: F) -> Self
    where
        F: FnOnce() -> String,
    {
        if log::log_enabled!(Level::Debug) {
            Self {
                label: Some(Cow::Owned(label_gen())),
                level: Level::Debug,
                start: Some(Instant::now()),
            }
        } else {
            Self {
                label: None,
                level: Level::Debug,
                start: None,
            }
        }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        if let (Some(label), Some(start)) = (&self.label, self.start) {
            let duration = start.elapsed().as_millis();
            log::log!(self.level, "{} took {} ms", label, duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_drops_without_logger() {
        let timer = ScopedTimer::debug("noop");
        drop(timer);
        let lazy = ScopedTimer::debug_lazy(|| "noop".to_string());
        drop(lazy);
    }
}
