// Process-wide tunables resolved from the environment once, at first use.
use std::sync::OnceLock;

use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Hard cap applied to incoming event frames.
    pub max_frame_bytes: usize,
}

impl RuntimeConfig {
    fn from_env() -> Self {
        Self {
            max_frame_bytes: read_usize_env(
                "ARMADA_MAX_FRAME_BYTES",
                armada_codec::DEFAULT_MAX_FRAME_BYTES,
            ),
        }
    }
}

static RUNTIME_CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

pub fn runtime_config() -> &'static RuntimeConfig {
    RUNTIME_CONFIG.get_or_init(RuntimeConfig::from_env)
}

fn read_usize_env(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<usize>() {
            Ok(value) if value > 0 => value,
            _ => {
                warn!(key, raw = %raw, "ignoring unparseable environment override");
                default
            }
        },
        Err(_) => default,
    }
}
