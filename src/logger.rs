//! The `Logger` collaborator (spec §6).
//!
//! The coordination kernel reports what it did through an injectable
//! logger rather than hard-coding an output sink, so embedding
//! applications can redirect it. The default implementation forwards to
//! `tracing`, matching every other module in this crate.

/// A minimal logging interface, mirroring the spec's `info`/`warn`/
/// `error`/`debug` external collaborator.
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
    fn debug(&self, message: &str);
}

/// Default logger: forwards to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }

    fn debug(&self, message: &str) {
        tracing::debug!("{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default, Clone)]
    pub struct RecordingLogger(pub Arc<Mutex<Vec<String>>>);

    impl Logger for RecordingLogger {
        fn info(&self, message: &str) {
            self.0.lock().push(format!("INFO {message}"));
        }
        fn warn(&self, message: &str) {
            self.0.lock().push(format!("WARN {message}"));
        }
        fn error(&self, message: &str) {
            self.0.lock().push(format!("ERROR {message}"));
        }
        fn debug(&self, message: &str) {
            self.0.lock().push(format!("DEBUG {message}"));
        }
    }

    #[test]
    fn tracing_logger_does_not_panic() {
        let logger = TracingLogger;
        logger.info("hello");
        logger.warn("hello");
        logger.error("hello");
        logger.debug("hello");
    }

    #[test]
    fn recording_logger_captures_messages() {
        let logger = RecordingLogger::default();
        logger.info("a");
        logger.warn("b");
        assert_eq!(logger.0.lock().as_slice(), ["INFO a", "WARN b"]);
    }
}
