pub mod domain;
pub mod error;
pub mod offers;
pub mod protocol;
