pub mod application;
pub mod bridge;
pub mod domain;
pub mod interfaces;
pub mod manifest;
pub mod registry;
pub mod runtime;
pub mod session;
