#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod core;
mod data;
pub mod doc;
mod engine;
mod error;
pub mod filter;
pub mod listing;
mod pattern;
mod stage;
mod utils;

pub use crate::core::{Args, Config, Environment, Hash32};
pub use crate::data::{Content, Data, KeyValue};
pub use crate::doc::{Doc, DocDef, DocKey};
pub use crate::engine::{
    Diagnostics, Hooks, Kind, Node, Runner, State, Step, TaskContext, TaskDef, TaskExecution,
    TaskGraph, TaskId, Walk,
};
pub use crate::error::{Error, Result};
pub use crate::filter::{Filter, FilterRegistry, RegistryBuilder};
pub use crate::listing::{FileLister, GlobLister, StaticLister};
pub use crate::pattern::{PatternDef, PatternDoc};
pub use crate::stage::{FilterStage, InitialStage, Source};

#[cfg(feature = "logging")]
pub use crate::utils::init_logging;
