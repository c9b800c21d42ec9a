//! HTTP liveness endpoint for hosting platforms that poll a port.

mod server;

pub use server::{start_health_server, HealthServerHandle};
