pub mod config;
pub mod encode;

pub use self::config::*;
pub use self::encode::*;
