pub mod engine;
pub mod entities;
pub mod errors;
pub mod services;

pub use engine::*;
pub use entities::*;
pub use errors::*;
pub use services::*;
