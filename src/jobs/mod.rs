// Background work spawned off the request path
pub mod notify;

pub use notify::*;
