//! Test utilities for npmi
//!
//! Helpers shared by unit tests and the `tests/` integration suite:
//! - in-memory package archives ([`fixtures::TarballBuilder`])
//! - a scriptable [`Fetcher`](crate::fetch::Fetcher) ([`fixtures::FakeFetcher`])
//! - stand-in native build tools ([`fixtures::fake_build_tool`])
//!
//! # Example
//!
//! ```rust,no_run
//! use npmi_cli::test_utils::fixtures::{FakeFetcher, TarballBuilder};
//!
//! let fetcher = FakeFetcher::new()
//!     .with_package("left-pad", "1.3.0", &TarballBuilder::package("left-pad", "1.3.0"));
//! assert_eq!(fetcher.fetch_count(), 0);
//! ```

pub mod fixtures;

pub use fixtures::{FakeFetcher, TarballBuilder};

use std::path::Path;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. Uses `level` when given, otherwise
/// `RUST_LOG` if set; with neither, logging stays off.
///
/// To enable logging in tests via environment variable:
/// ```bash
/// RUST_LOG=npmi=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// Write a `package.json` declaring `deps` (in order) into `dir`.
pub fn write_manifest(dir: &Path, deps: &[(&str, &str)]) {
    let body = deps
        .iter()
        .map(|(name, spec)| format!("    \"{name}\": \"{spec}\""))
        .collect::<Vec<_>>()
        .join(",\n");
    let content = format!(
        "{{\n  \"name\": \"fixture\",\n  \"version\": \"0.0.0\",\n  \"dependencies\": {{\n{body}\n  }}\n}}\n"
    );
    std::fs::create_dir_all(dir).expect("create manifest dir");
    std::fs::write(dir.join(crate::constants::MANIFEST_FILE), content).expect("write manifest");
}
