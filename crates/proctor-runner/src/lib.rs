pub mod correlate;
pub mod mock;
pub mod monitor;
pub mod pool;
pub mod session;
