#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod error;
mod generator;
pub mod output;
pub mod render;
pub mod report;
pub mod scope;
pub mod task;
pub mod trim;

#[cfg(feature = "cli")]
pub mod cli;

pub use crate::error::*;
pub use crate::generator::Generator;
pub use crate::output::Output;
pub use crate::render::{MiniJinjaRenderer, TemplateRenderer};
pub use crate::report::ExitStatus;
pub use crate::scope::ExecutionScope;
pub use crate::task::{Task, TaskKind};
pub use crate::trim::{TrimLevel, TrimMode, TrimPolicy};
