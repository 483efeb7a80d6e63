mod feed;
pub mod stage;

pub use stage::*;
