//! Vyshell is a set of agent-side execution modules for managing VyOS
//! routers, local hypervisors, and the host clock, built for
//! configuration-management minions that call into device plumbing and
//! expect clean results back.
//!
//! # Features
//!
//! * **Router command dispatch** - One-shot operational and
//!   configuration commands against the device CLI, each in its own
//!   pseudo-terminal session
//! * **Held-open router sessions** - Interactive sessions tracking
//!   operational/configuration mode and commit/save state
//! * **Hypervisor module** - List, start, stop, and reboot the local
//!   hypervisor's domains by regex, with failures collapsed to clean
//!   sentinels
//! * **Clock module** - Formatted timestamps and epoch seconds
//!
//! # Quick Start - Operational commands
//!
//! For one-shot status commands against the router:
//!
//! ```no_run
//! use vyshell::{router, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), vyshell::Error> {
//!     let config = RouterConfig::default();
//!
//!     let output = router::run_op_mode_command(&config, "show interfaces").await?;
//!     for line in &output.lines {
//!         println!("{line}");
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Quick Start - Configuration commands
//!
//! A configuration command is wrapped in the full config-mode bracket
//! (enter, commit, optionally save, exit) and runs as one unit:
//!
//! ```no_run
//! use vyshell::{router, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), vyshell::Error> {
//!     let config = RouterConfig::default();
//!
//!     let output = router::run_config_mode_command(
//!         &config,
//!         "set interfaces ethernet eth0 description uplink",
//!         true,
//!     )
//!     .await?;
//!     println!("{:?}", output.lines);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Held-open sessions
//!
//! For a sequence of changes with explicit commit and save control:
//!
//! ```no_run
//! use vyshell::{Router, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), vyshell::Error> {
//!     let mut session = Router::open(RouterConfig::default()).await?;
//!
//!     session.configure().await?;
//!     session.set("system host-name edge1").await?;
//!     session.commit().await?;
//!     session.save().await?;
//!     session.exit(false).await?;
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Hypervisor module
//!
//! The filtering functions work against any [`Hypervisor`] backend;
//! enable the `libvirt` cargo feature for the real one:
//!
//! ```no_run
//! use vyshell::hypervisor::{self, DomainState, Hypervisor};
//!
//! async fn running_web_guests(hv: &dyn Hypervisor) -> Option<Vec<String>> {
//!     hypervisor::list(hv, "^web", DomainState::Running).await
//! }
//! ```

pub mod clock;
pub mod error;
pub mod hypervisor;
pub mod router;
pub mod shell;

pub use error::{Error, ErrorCategory};
pub use router::{
    run_config_mode_command, run_op_mode_command, CommandOutput, Router, RouterConfig,
    SessionStatus,
};
pub use shell::{ShellConfig, ShellSession, Transport};

// Re-export the commonly used hypervisor types at the crate root for
// convenience.
pub use hypervisor::{DomainState, Hypervisor};

#[cfg(feature = "libvirt")]
pub use hypervisor::LibvirtHypervisor;
