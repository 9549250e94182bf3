//! # Routerprobe
//!
//! Async SSH failure-diagnosis automation for network routers.
//!
//! Routerprobe drives an interactive CLI session over SSH, issues a
//! configured sequence of commands, frames discrete results out of the
//! raw character stream by prompt recognition, and applies a declarative
//! rule set to decide whether an anomaly condition occurred — optionally
//! looping the whole sequence until the condition reproduces, then
//! collecting post-mortem output.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use routerprobe::{Commander, Router, SshConfig, runner};
//! use routerprobe::notify::EmailNotifier;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), routerprobe::Error> {
//!     let commander = Commander::load("repro.yaml")?;
//!     let config = SshConfig::with_password("core-1", 22, "admin", "secret");
//!
//!     let mut router = Router::connect("core-1", config, None).await?;
//!     let triggered = runner::run(&mut router, &commander, None::<&EmailNotifier>).await?;
//!     println!("triggered: {triggered}");
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod engine;
pub mod error;
pub mod extract;
pub mod framer;
pub mod locations;
pub mod logging;
pub mod model;
pub mod notify;
pub mod platform;
pub mod runner;
pub mod transport;

// Re-export main types for convenience
pub use device::{Device, Router};
pub use engine::{Evaluator, ValuesStore};
pub use error::Error;
pub use logging::SessionLog;
pub use model::{Command, CommandResult, Commander, Pattern, Test};
pub use notify::Notifier;
pub use platform::Inventory;
pub use transport::{AuthMethod, SshConfig};
