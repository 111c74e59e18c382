//! # Daftlet
//!
//! > **On-demand reader containers against a shared, pre-provisioned fixture dataset.**
//!
//! At startup the daemon downloads a fixture archive, unpacks it safely onto local
//! disk, and then serves an HTTP trigger. Every trigger runs one reader container
//! through its whole lifecycle (pull, create, start, stop, delete) and returns the
//! image to a shared cache that evicts it once no launch needs it.
//!
//! ## 🏗️ Design
//!
//! ### Provision once, read many
//! The fixture dataset is extracted exactly once, before the HTTP surface exists.
//! Launches receive a [`FixtureDataset`](model::FixtureDataset) handle, which only
//! a finished extraction produces, so no launch ever sees a partial tree.
//!
//! ### Zip slip is checked before anything is written
//! [`archive::extract`] resolves every entry against the destination first and
//! fails closed on any entry that escapes it.
//!
//! ### One owner for the image cache
//! The runtime's pulled-image store is the only shared mutable state. The
//! [`image_cache`] actor owns a lease count per image and serialises pulls and
//! evictions, so concurrent launches of the same image share one pull and the last
//! one out evicts.
//!
//! ### Explicit failure policy
//! Every lifecycle step's result is checked. The first failure aborts the launch,
//! names the failing step, and (by default) cleans up what the launch left behind.
//! See [`orchestrator`].
//!
//! ## 🗺️ Module Tour
//!
//! - [`config`]: every tunable in one [`DaftletConfig`](config::DaftletConfig).
//! - [`archive`]: traversal-safe zip extraction.
//! - [`storage`]: the [`ObjectStore`](storage::ObjectStore) trait and its backends.
//! - [`provision`]: download + extract at startup.
//! - [`runtime`]: the [`RuntimeClient`](runtime::RuntimeClient) trait, the Docker
//!   backend and an in-memory backend for tests.
//! - [`image_cache`]: the lease-counting image cache actor.
//! - [`orchestrator`]: the per-request lifecycle sequence.
//! - [`http`]: the `POST /launch-reader` trigger.
//! - [`lifecycle`]: system wiring, shutdown and tracing setup.
//!
//! ## 🚀 Running
//!
//! ```bash
//! RUST_LOG=info DAFTLET_CONFIG=daftlet.toml cargo run
//! curl -X POST localhost:8080/launch-reader -d '{"id": 1}'
//! ```

pub mod archive;
pub mod config;
pub mod http;
pub mod image_cache;
pub mod lifecycle;
pub mod model;
pub mod orchestrator;
pub mod provision;
pub mod runtime;
pub mod storage;
