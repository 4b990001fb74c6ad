mod domain;
mod event;
mod limits;
mod payload;
mod util;

pub use domain::*;
pub use event::*;
pub use limits::*;
pub use payload::*;
pub use util::*;
