//! HTTP client backend implementations.

mod unix;
pub use unix::UnixSocketClient;
