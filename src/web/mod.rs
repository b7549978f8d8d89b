pub mod routes;
pub mod xml;

pub use routes::{router, AppState};
