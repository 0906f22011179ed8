pub mod endpoint;
pub mod errors;
pub mod types;
