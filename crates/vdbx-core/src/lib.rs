//! VDBX Core: per-command execution context
//!
//! Every command the engine runs (query, procedure call, user function) gets
//! one [`ExecutionContext`]. It carries who is asking and against which VDB,
//! the data policies they hold, a seedable random stream for `RAND()`, the
//! listeners interested in the command's lifecycle, and the warnings the
//! client will see once the command finishes.
//!
//! ```
//! use vdbx_core::{ExecutionContext, VdbDescriptor};
//!
//! let ctx = ExecutionContext::builder()
//!     .user_name("alice")
//!     .connection_id("conn-1")
//!     .request_id("conn-1.0")
//!     .vdb(VdbDescriptor::new("sales", 1))
//!     .build()
//!     .unwrap();
//!
//! let first = ctx.next_random_seeded(42);
//! assert_eq!(ctx.next_random_seeded(42), first);
//!
//! ctx.add_warning(anyhow::anyhow!("source orders was unavailable"));
//! assert_eq!(ctx.take_warnings().len(), 1);
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod listener;
pub mod random;
pub mod runner;
pub mod stage;
pub mod telemetry;
pub mod warning;

pub use config::{EngineConfig, ServerTimeZone};
pub use context::{CommandContext, ExecutionContext, ExecutionContextBuilder};
pub use error::{ContextError, EngineError};
pub use identity::{FunctionTable, Session, Subject, UserFunction, VdbDescriptor, VdbResolver, VdbStatus};
pub use listener::{CommandEvent, CommandListener, ListenerRegistry};
pub use random::RandomSource;
pub use runner::{CommandOutcome, CommandRunner, StageReport};
pub use stage::{Row, Stage, StageError};
pub use warning::{CommandWarning, WarningAccumulator};

pub use vdbx_policy as policy;

/// Engine version
pub const VDBX_VERSION: &str = env!("CARGO_PKG_VERSION");
