//! fleetlog-exec — concrete transports for fleetlog.
//!
//! [`LocalTransport`] runs commands through `sh -c` on this machine,
//! [`SshTransport`] runs them on a remote host through the system `ssh`
//! binary, and [`RoutingTransport`] picks one of the two per host id,
//! resolving connection parameters through the host registry at call time.

mod process;

pub mod local;
pub mod routing;
pub mod ssh;

pub use local::LocalTransport;
pub use routing::RoutingTransport;
pub use ssh::{SshOptions, SshTransport};
