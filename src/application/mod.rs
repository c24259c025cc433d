pub mod builder;
pub mod errors;
pub mod gc;
pub mod ports;
pub mod services;
pub mod use_cases;

pub use errors::ErrorKind;
