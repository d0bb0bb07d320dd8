pub mod date_time;
pub mod hash;
pub mod thread;
