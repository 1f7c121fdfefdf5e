#![allow(dead_code)] // each test binary uses a different subset

pub mod builders;
pub mod strategies;

pub use builders::*;
pub use strategies::*;
