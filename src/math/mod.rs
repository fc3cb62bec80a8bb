pub mod point;
pub mod rect;
pub mod vec;

pub use point::*;
pub use rect::*;
pub use vec::*;
