pub mod hashing;
pub mod index;
pub mod metadata;

pub use hashing::*;
pub use index::*;
pub use metadata::*;
