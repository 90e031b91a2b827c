//! Conductor run orchestration: instance lock, progress store, directory
//! workers and the local status channel.

mod error;
pub mod lock;
pub mod paths;
pub mod pool;
pub mod process;
pub mod protocol;
mod runtime;
pub mod server;
pub mod store;
pub mod worker;

pub use error::RunnerError;
pub use lock::InstanceLock;
pub use protocol::{request_status, send_request, StatusDocument, StatusEntry};
pub use runtime::{run, start_blocking, RunOptions, RunSummary};
pub use store::StatusStore;
pub use worker::{DirectoryReport, DirectoryWorker};
