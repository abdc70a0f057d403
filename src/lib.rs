//! # Albatross
//!
//! Control-plane policy compiler for an nginx-based ingress/load-balancer.
//! Declarative routing intent (annotations on ingress-style resources plus
//! ALB/Frontend/Rule records) is compiled into a deterministic policy
//! document ([`types::NgxPolicy`]) for the data plane and into nginx
//! configuration text.
//!
//! The surrounding controller (resource watching, reference fetching,
//! atomic publication) is the embedding process's concern; this crate is a
//! pure, synchronous compiler. A typical pass:
//!
//! ```no_run
//! use albatross::config::CompilerConfig;
//! use albatross::pipeline::PolicyCompiler;
//! use albatross::types::{Alb, RefMap};
//!
//! # fn main() -> albatross::Result<()> {
//! let compiler = PolicyCompiler::new(CompilerConfig::from_env()?);
//! let alb = Alb::default(); // assembled by the watch layer
//! let wanted = compiler.collect_refs(&alb);
//! let refs = RefMap::default(); // fetched in bulk from `wanted`
//! # let _ = wanted;
//! let policy = compiler.compile(&alb, &refs)?;
//! let json = serde_json::to_string(&policy)?;
//! # let _ = json;
//! # Ok(())
//! # }
//! ```

pub mod annotations;
pub mod config;
pub mod errors;
pub mod ext;
pub mod observability;
pub mod pipeline;
pub mod render;
pub mod types;
pub mod varstring;

pub use errors::{Error, Result, RouteError};

/// Crate version, reported by embedders in their build info.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
