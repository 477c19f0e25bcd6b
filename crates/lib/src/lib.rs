//! busy-lib: evaluation and building of BUSY build descriptions.
//!
//! The pipeline is:
//! - `syntax`: lexer and recursive descent parser producing a concrete tree
//! - `eval`: folds the trees of all modules into the declaration `model`
//! - `engine`: ref based facade over an evaluated session
//! - `builder`: turns the active products into fork grouped operations
//! - `execute`: runs the operations (`BuildJob`) or deletes their outputs (`CleanJob`)
//! - `project`: the host level API on top of all of the above

pub mod builder;
pub mod diag;
pub mod engine;
pub mod eval;
pub mod execute;
pub mod model;
pub mod platform;
pub mod project;
pub mod syntax;
pub mod util;

pub use diag::{CodeLocation, ErrorInfo, ErrorItem, LogLevel, Logger};
pub use engine::{Engine, ParseParams, ProductFilter, Ref};
pub use execute::{BuildJob, BuildOptions, CleanJob, JobEvent, JobResult};
pub use project::{LogSink, Module, Product, Project, SetupParams};
