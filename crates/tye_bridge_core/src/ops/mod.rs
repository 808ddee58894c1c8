pub mod application;
pub mod endpoints;
pub mod logs;
pub mod services;
pub mod shutdown;
