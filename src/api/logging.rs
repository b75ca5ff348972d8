use crate::api::stream::WireFormat;
use crate::util::parse_bool_str;
use std::fs::OpenOptions;
use std::sync::{Mutex, Once};
use tracing_subscriber::EnvFilter;

const LOG_FILTER_ENV: &str = "AGENT_STREAM_LOG";
const LOG_PATH_ENV: &str = "AGENT_STREAM_LOG_PATH";
const DEBUG_FRAMES_ENV: &str = "AGENT_STREAM_DEBUG_FRAMES";
const FRAME_PREVIEW_BYTES: usize = 96;

static INIT: Once = Once::new();

/// Installs the process-wide tracing subscriber. Safe to call repeatedly.
///
/// Logs go to `AGENT_STREAM_LOG_PATH` when set, otherwise to stderr so that
/// stdout stays reserved for transcript output.
pub fn init_logging() {
    INIT.call_once(|| {
        let filter = resolve_env_filter();
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact();

        if let Some(path) = resolve_log_path() {
            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => {
                    let _ = builder
                        .with_ansi(false)
                        .with_writer(Mutex::new(file))
                        .try_init();
                    return;
                }
                Err(err) => eprintln!("cannot open log file '{path}': {err}; logging to stderr"),
            }
        }

        let _ = builder.with_writer(std::io::stderr).try_init();
    });
}

fn resolve_env_filter() -> EnvFilter {
    if let Ok(level) = std::env::var(LOG_FILTER_ENV) {
        if let Ok(filter) = EnvFilter::try_new(level) {
            return filter;
        }
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn resolve_log_path() -> Option<String> {
    std::env::var(LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn frame_debug_enabled() -> bool {
    std::env::var(DEBUG_FRAMES_ENV)
        .ok()
        .and_then(|v| parse_bool_str(&v))
        .unwrap_or(false)
}

/// Logs a frame that failed to decode. The payload preview is only included
/// when frame debugging is switched on.
pub fn emit_frame_decode_error(format: WireFormat, frame: &[u8], error: &dyn std::fmt::Display) {
    if frame_debug_enabled() {
        tracing::warn!(
            format = format.as_str(),
            len = frame.len(),
            preview = %frame_preview(frame),
            "skipping undecodable frame: {error}"
        );
    } else {
        tracing::warn!(
            format = format.as_str(),
            len = frame.len(),
            "skipping undecodable frame: {error}"
        );
    }
}

fn frame_preview(frame: &[u8]) -> String {
    let head = &frame[..frame.len().min(FRAME_PREVIEW_BYTES)];
    match std::str::from_utf8(head) {
        Ok(text) => format!("{text:?}"),
        Err(_) => head.iter().map(|b| format!("{b:02x}")).collect::<String>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_debug_enabled_accepts_true_variants() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var(DEBUG_FRAMES_ENV, "1");
        assert!(frame_debug_enabled());
        std::env::set_var(DEBUG_FRAMES_ENV, "ON");
        assert!(frame_debug_enabled());
        std::env::set_var(DEBUG_FRAMES_ENV, "nope");
        assert!(!frame_debug_enabled());
        std::env::remove_var(DEBUG_FRAMES_ENV);
        assert!(!frame_debug_enabled());
    }

    #[test]
    fn test_resolve_log_path_ignores_blank_values() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var(LOG_PATH_ENV, "/tmp/agent-stream-test.log");
        assert_eq!(
            resolve_log_path().as_deref(),
            Some("/tmp/agent-stream-test.log")
        );
        std::env::set_var(LOG_PATH_ENV, "   ");
        assert_eq!(resolve_log_path(), None);
        std::env::remove_var(LOG_PATH_ENV);
    }

    #[test]
    fn test_frame_preview_prefers_text_then_hex() {
        assert_eq!(frame_preview(b"{bad"), "\"{bad\"");
        assert_eq!(frame_preview(&[0xff, 0x00, 0x10]), "ff0010");
    }
}
