pub mod collaborators;
pub mod common;
pub mod server;
pub mod services;
pub mod storage;
pub mod web;

#[allow(ambiguous_glob_reexports)]
pub use common::*;
#[allow(ambiguous_glob_reexports)]
pub use services::*;
#[allow(ambiguous_glob_reexports)]
pub use storage::*;
