mod admin;
mod health;
mod proxy;

pub use admin::{block, unblock};
pub use health::{health_check, readiness_check, stats};
pub use proxy::proxy;
