pub mod token;

pub use token::{TokenState, TokenStore};
