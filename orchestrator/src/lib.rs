//! Check every session of every staked application and publish healthy nodes.
//!
//! # Overview
//!
//! A run obtains the applications to check and the chains they use from a
//! [registry::Registry], acquires a session for every (application, chain) pair (reusing a
//! cached one when a quorum of cache replicas agrees it is fresh) and runs the sync, chain and
//! merge checks of `warden-checks` against it. For each check, the public keys of the nodes
//! that passed are published to every cache replica under [keys::verdict], and the failure
//! mark of each of those nodes is erased.
//!
//! All outbound calls of a run share a single [limiter::Limiter], so the number of relays in
//! flight never exceeds the configured concurrency regardless of how many pairs are checked at
//! once.
//!
//! # Example
//!
//! ```no_run
//! use prometheus_client::registry::Registry;
//! use warden_cache::resp;
//! use warden_checks::metrics::Log;
//! use warden_orchestrator::{registry::File, Config, Orchestrator};
//! use warden_relay::http;
//!
//! # async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
//! let client = http::Client::new(config.relay())?;
//! let replicas = config
//!     .replicas
//!     .iter()
//!     .map(|address| resp::Client::new(config.replica(address)))
//!     .collect();
//! let orchestrator = Orchestrator::new(
//!     &config,
//!     client.clone(),
//!     client,
//!     Log,
//!     replicas,
//!     File::new("registry.yaml"),
//!     &mut Registry::default(),
//! );
//! let report = orchestrator.run().await?;
//! println!("published {} verdicts", report.verdicts);
//! # Ok(())
//! # }
//! ```

pub mod config;
mod engine;
mod error;
pub mod keys;
pub mod limiter;
pub mod registry;

pub use config::Config;
pub use engine::{Orchestrator, Report};
pub use error::Error;
