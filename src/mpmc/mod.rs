mod bounded;
mod inspector;

pub use bounded::BoundedConcurrentQueue;
pub use bounded::MAX_CAPACITY;
pub use inspector::Inspector;
