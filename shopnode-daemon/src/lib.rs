//! Daemon side of shop publication: provisioning the binary, supervising the
//! process, and talking to its HTTP API.

mod error;
pub mod client;
pub mod facade;
pub mod multipart;
pub mod paths;
pub mod platform;
pub mod provision;
mod runtime;
pub mod supervisor;

pub use client::{DaemonApi, DaemonClient, Identity};
pub use error::DaemonError;
pub use facade::{CoreApi, HttpCoreApi, StubCoreApi};
pub use platform::Platform;
pub use provision::{Located, Provisioner};
pub use runtime::{init_tracing, run_foreground, start_blocking};
pub use supervisor::{cid_base32, DaemonHandle, StartPolicy, Supervisor};
