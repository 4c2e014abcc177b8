mod info;
mod live;

pub use info::*;
pub use live::*;
