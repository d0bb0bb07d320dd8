pub mod collect;
pub mod count;
pub mod sum;

pub use collect::Collect;
pub use count::Count;
pub use sum::Sum;
