//! Configuration shared by all three binaries (SPEC_FULL.md §C). A `--flag
//! value` CLI argument takes precedence over an environment variable, the way
//! the teacher's `main.rs` resolves its database URL; neither is required
//! unless the binary in question needs it.

/// Looks up `--flag value` in `std::env::args()`, falling back to the env var
/// `env_name`, falling back to `None`.
pub fn resolve(flag: &str, env_name: &str) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    if let Some(v) = args
        .windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].clone())
    {
        return Some(v);
    }
    std::env::var(env_name).ok()
}

fn resolve_or(flag: &str, env_name: &str, default: &str) -> String {
    resolve(flag, env_name).unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bind_addr: String,
    pub scheduler_addr: Option<String>,
    pub objstore_addr: Option<String>,
    pub start_delivery_retries: u32,
    pub chunk_size: usize,
}

impl RuntimeConfig {
    /// `default_port` is baked in per-binary (scheduler/objstore/worker each
    /// listen on a different default), matching the teacher's pattern of a
    /// single hardcoded development default with an env/CLI override.
    pub fn from_env(default_bind_addr: &str) -> Self {
        Self {
            bind_addr: resolve_or("--bind", "RT_BIND_ADDR", default_bind_addr),
            scheduler_addr: resolve("--scheduler", "RT_SCHEDULER_ADDR"),
            objstore_addr: resolve("--objstore", "RT_OBJSTORE_ADDR"),
            start_delivery_retries: resolve("--transfer-retries", "RT_TRANSFER_RETRIES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            chunk_size: resolve("--chunk-size", "RT_CHUNK_SIZE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024),
        }
    }
}
