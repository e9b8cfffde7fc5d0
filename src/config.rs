//! Configuration constants and types for zilfs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Files strictly larger than this are archived as sparse placeholders (1 MiB).
pub const SPARSE_THRESHOLD: u64 = 1024 * 1024;

/// Upper bound of the clear-text header, terminator included.
pub const MAX_HEADER_SIZE: usize = 4096;

/// Separates the JSON header from the encrypted payload.
pub const HEADER_TERMINATOR: &[u8] = b"\n\n";

/// Header magic of a container whose payload was encrypted in one pass.
pub const BUFFERED_MAGIC: &str = "ZILANT";

/// Header magic of a container whose payload was encrypted as a stream.
pub const STREAM_MAGIC: &str = "ZSTR";

/// Current container format version.
pub const CONTAINER_VERSION: u32 = 1;

/// Pax extension key carrying the logical size of a sparse placeholder.
pub const SPARSE_SIZE_KEY: &str = "ZIL_SPARSE_SIZE";

/// Plaintext chunk size for streamed encryption (64 KiB).
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Environment switch: `1` selects streaming pack on teardown.
pub const STREAM_ENV_VAR: &str = "ZILANT_STREAM";

/// Environment variable naming the audit ledger file.
pub const AUDIT_LEDGER_ENV_VAR: &str = "ZILANT_AUDIT_LEDGER";

/// Argon2id parameters for key derivation.
pub mod argon2_params {
    /// Memory cost in KiB (64 MB).
    pub const MEMORY_COST: u32 = 65536;

    /// Time cost (iterations).
    pub const TIME_COST: u32 = 3;

    /// Parallelism factor.
    pub const PARALLELISM: u32 = 4;

    /// Output length in bytes (256 bits).
    pub const OUTPUT_LENGTH: usize = 32;

    /// Salt length in bytes.
    pub const SALT_LENGTH: usize = 32;
}

/// Configuration shared by the container codec and filesystem sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Size above which streamed packs store files as sparse placeholders.
    pub sparse_threshold: u64,

    /// Use the streaming transport when a session re-packs on teardown.
    pub stream_on_teardown: bool,

    /// Append-only audit ledger, if any.
    pub audit_ledger: Option<PathBuf>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            sparse_threshold: SPARSE_THRESHOLD,
            stream_on_teardown: false,
            audit_ledger: None,
        }
    }
}

impl ContainerConfig {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Self {
        Self {
            stream_on_teardown: std::env::var(STREAM_ENV_VAR)
                .map(|v| v.trim() == "1")
                .unwrap_or(false),
            audit_ledger: std::env::var_os(AUDIT_LEDGER_ENV_VAR)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            ..Self::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.sparse_threshold == 0 {
            return Err("Sparse threshold must be greater than 0".to_string());
        }
        if let Some(path) = &self.audit_ledger {
            if path.as_os_str().is_empty() {
                return Err("Audit ledger path must not be empty".to_string());
            }
        }
        Ok(())
    }
}
