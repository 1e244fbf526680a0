pub mod cache;
pub mod client;
pub mod protocol;
pub mod shared;
pub mod transport;

pub use cache::{Cached, ParameterCache};
pub use client::{LcrClient, LcrClientBuilder};
pub use shared::SharedClient;
pub use transport::{ConnectionConfig, TcpTransport, Transport};
