pub mod build_info;
pub mod persistence;

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Installs the global `fmt` subscriber, honouring `RUST_LOG` on top of `backup_core=info`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{filter::LevelFilter, fmt, EnvFilter};

        let filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .from_env_lossy()
            .add_directive("backup_core=info".parse().unwrap_or_else(|_| LevelFilter::INFO.into()));

        let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
    });
}
