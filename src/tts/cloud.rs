pub mod cloud_tts;
pub mod pool;
pub mod structs;

pub use cloud_tts::CloudProvider;
pub use pool::{ConnectionPool, PoolConfig};
