//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { pkg, profile } => {
                info!(pkg = %pkg, profile = %profile, "Starting scan");
            }
            ProgressEvent::PluginsConfigured { plugins } => {
                info!(plugins = %plugins.join(","), "Plugins configured");
            }
            ProgressEvent::PhaseStarted { phase } => {
                info!(phase = %phase, "Starting phase");
            }
            ProgressEvent::PhaseComplete { phase, duration } => {
                info!(
                    phase = %phase,
                    duration_ms = duration.as_millis(),
                    "Phase complete"
                );
            }
            ProgressEvent::HookComplete {
                phase,
                hook,
                rv,
                duration,
            } => {
                if *rv == 0 {
                    debug!(
                        phase = %phase,
                        hook = %hook,
                        duration_ms = duration.as_millis(),
                        "Hook complete"
                    );
                } else {
                    warn!(phase = %phase, hook = %hook, rv, "Hook failed");
                }
            }
            ProgressEvent::Completed {
                exit_code,
                total_time,
            } => {
                info!(
                    exit_code,
                    total_time_ms = total_time.as_millis(),
                    "Scan complete"
                );
            }
            ProgressEvent::Failed { error } => {
                warn!(error = %error, "Scan failed");
            }
        }
    }
}
