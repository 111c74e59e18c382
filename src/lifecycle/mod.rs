//! # System Lifecycle
//!
//! Wiring and teardown of the long-lived parts of the daemon, plus tracing setup.
//!
//! ## Startup Order
//!
//! 1. [`setup_tracing`] once, before anything logs.
//! 2. Provision the fixture dataset ([`crate::provision`]). Fatal on error.
//! 3. [`DaftletSystem::new`]: spawn the image cache actor and build the
//!    orchestrator around it. Only possible with a provisioned dataset in hand.
//! 4. Serve the launch trigger ([`crate::http::serve`]).
//!
//! ## Graceful Shutdown
//!
//! [`DaftletSystem::shutdown`] drops the system's clients and waits for the cache
//! actor to drain. Every clone of the orchestrator (the router state, in-flight
//! launches) holds a cache client, so shut the HTTP server down first.

pub mod system;
pub mod tracing;

pub use system::*;
pub use self::tracing::*;
