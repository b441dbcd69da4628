pub mod decoder;
pub mod listener;
pub mod role;

pub use decoder::{decode, DecodedAssertion, RoleAttribute};
