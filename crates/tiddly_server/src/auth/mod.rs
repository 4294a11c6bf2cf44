mod middleware;

pub use middleware::{AdminGate, Identity, RequireAdmin};
