pub mod config;
pub mod element;
pub mod error;
pub mod function;
pub mod properties;
pub mod watermark;
pub mod window;

pub use error::{Error, Result};
