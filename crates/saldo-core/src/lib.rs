pub mod error;
pub mod metrics;
pub mod model;

pub use error::{ErrorKind, ExitCode, SaldoError, SaldoResult};
