//! HTTP server module: middleware adapter and service wiring.

mod middleware;
mod server;

pub use middleware::enforce_rate_limit;
pub use server::HttpServer;
