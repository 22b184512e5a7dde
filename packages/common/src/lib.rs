pub mod diagnostics;
pub mod filesystem;
pub mod paths;

pub use diagnostics::*;
pub use filesystem::*;
