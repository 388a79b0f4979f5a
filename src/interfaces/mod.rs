pub mod http;
pub mod invoke;
pub mod runtime_api;
