#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate async_trait;
#[macro_use]
extern crate atomic_enum;

pub mod channel;
pub mod core;
pub mod functions;
pub mod metrics;
pub mod runtime;
pub mod storage;
pub mod utils;

pub use crate::core::error::{Error, Result};
