//! Asset pipelines for assetflow.
//!
//! Each pipeline selects its inputs by glob, delegates the transformation to a
//! library, and writes to a fixed output path. [`tasks`] names the pipelines
//! and composes them into series and parallel graphs.

pub mod config;
pub mod error;
pub mod fonts;
pub mod images;
pub mod package;
pub mod pages;
pub mod report;
pub mod scripts;
pub mod select;
pub mod sprite;
pub mod styles;
pub mod tasks;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use report::PipelineReport;
pub use tasks::{run_blocking, Task, TaskError, TaskFuture, TaskHandler, TaskName};
