//! # Observability & Tracing
//!
//! [`setup_tracing`] installs a compact `tracing-subscriber` formatter filtered by
//! `RUST_LOG` (default `info`).
//!
//! ## What Gets Traced
//!
//! - **Provisioning**: download size, extraction counts, rejected archive entries
//! - **Image cache**: pulls, shared leases, deferred and completed evictions
//! - **Launches**: a `launch` span per request (`request_id`, `image`) with one
//!   event per lifecycle step and the failing step on error
//! - **HTTP**: malformed bodies and dead launch workers
//!
//! ## Usage Examples
//!
//! ```bash
//! # Startup, launches and evictions
//! RUST_LOG=info daftlet
//!
//! # Every lifecycle step and archive entry
//! RUST_LOG=debug daftlet
//!
//! # Only the orchestrator
//! RUST_LOG=daftlet::orchestrator=debug daftlet
//! ```
//!
//! With `RUST_LOG=info` a launch reads:
//!
//! ```text
//! INFO launch: Launching reader request_id=1 image=reader:0
//! INFO Image pulled image=reader:0 leases=1
//! INFO launch: Reader finished container=reader-1 eviction=Evicted
//! ```

use tracing_subscriber::EnvFilter;

pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
