//! Infrastructure Layer
//!
//! Cross-cutting concerns and infrastructure components.

pub mod connection_pool;
pub mod process_stats;
pub mod shutdown;

pub use connection_pool::{DbPool, PoolConfig, PooledConnection};
pub use process_stats::{collect_process_stats, ProcessSnapshot};
pub use shutdown::{shutdown_signal, ShutdownController};
