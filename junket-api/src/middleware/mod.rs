pub mod auth;
pub mod resiliency;

pub use auth::{auth_middleware, Claims};
pub use resiliency::circuit_breaker_middleware;
