//! Echo of captured guest streams.
//!
//! The guest's stdout and stderr are captured in memory and returned with the
//! compile result. [`StreamLog`] additionally emits them through `tracing` so
//! they show up next to the runtime's own events.

use tracing::debug;

use playground_common::{STDERR_PATH, STDOUT_PATH};

/// Emits captured streams line by line at debug level.
pub struct StreamLog;

impl StreamLog {
    /// Echo both captured streams of one invocation.
    pub fn echo(stdout: &str, stderr: &str) {
        Self::echo_stream(STDOUT_PATH, stdout);
        Self::echo_stream(STDERR_PATH, stderr);
    }

    /// Echo one captured stream; empty streams emit nothing.
    pub fn echo_stream(stream: &str, text: &str) {
        for line in lines(text) {
            debug!(stream, guest_output = true, "{}", line);
        }
    }
}

/// Lines of `text`, without the empty remainder after a final newline.
pub fn lines(text: &str) -> impl Iterator<Item = &str> {
    let body = text.strip_suffix('\n').unwrap_or(text);
    (!body.is_empty()).then(|| body.split('\n')).into_iter().flatten()
}
