//! Progress handler trait and events

use std::time::Duration;

/// Events emitted while a scan runs
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Scan started
    Started { pkg: String, profile: String },

    /// Plugins configured, in the order their hooks run
    PluginsConfigured { plugins: Vec<String> },

    /// A pipeline phase started
    PhaseStarted { phase: String },

    /// A pipeline phase completed
    PhaseComplete { phase: String, duration: Duration },

    /// A hook finished; `rv` is its return value
    HookComplete {
        phase: String,
        hook: String,
        rv: i32,
        duration: Duration,
    },

    /// Scan completed, possibly with a non-zero exit code
    Completed { exit_code: i32, total_time: Duration },

    /// Scan aborted
    Failed { error: String },
}

/// Trait for handling progress events during a scan
pub trait ProgressHandler: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    impl ProgressHandler for CountingHandler {
        fn on_progress(&self, _event: &ProgressEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_noop_handler() {
        NoOpHandler.on_progress(&ProgressEvent::Started {
            pkg: "units".to_string(),
            profile: "default".to_string(),
        });
    }

    #[test]
    fn test_progress_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler {
            count: count.clone(),
        };

        handler.on_progress(&ProgressEvent::PhaseStarted {
            phase: "build".to_string(),
        });
        handler.on_progress(&ProgressEvent::PhaseComplete {
            phase: "build".to_string(),
            duration: Duration::from_millis(50),
        });
        handler.on_progress(&ProgressEvent::Completed {
            exit_code: 0,
            total_time: Duration::from_secs(5),
        });

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_event_debug() {
        let event = ProgressEvent::PluginsConfigured {
            plugins: vec!["gcc".to_string()],
        };
        let debug_str = format!("{:?}", event);
        assert!(debug_str.contains("PluginsConfigured"));
        assert!(debug_str.contains("gcc"));
    }
}
