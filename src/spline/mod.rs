mod arc_length;
mod catmull_rom;

pub use arc_length::*;
pub use catmull_rom::*;
