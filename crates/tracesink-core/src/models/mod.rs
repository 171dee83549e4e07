//! Data models for TraceSink

mod item;
mod span;
mod trace;

pub use item::*;
pub use span::*;
pub use trace::*;
