#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod error;
pub mod executor;
pub mod report;
pub mod run;
mod scheduler;
pub mod store;

pub use error::Error;
pub use executor::HttpExecutor;
pub use report::{build_report, percentile, NoData};
pub use run::{await_completion, start_run, start_run_with, RunHandle};
pub use store::ResultStore;

pub use barrage_core::*;

pub mod prelude {
    pub use crate::report::{build_report, NoData};
    pub use crate::run::{await_completion, start_run, start_run_with, RunHandle};
    pub use barrage_core::{FailureKind, Report, RequestOutcome, RunConfig, RunResults};
}
