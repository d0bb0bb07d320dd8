pub mod aggregate;
pub mod sink;
pub mod watermark;
pub mod window;
