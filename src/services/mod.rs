pub mod cas_service;
pub mod proxy_callback;
pub mod ticket_factory;
pub mod validator;

pub use cas_service::*;
pub use proxy_callback::*;
pub use validator::*;
