//! Reply rendering into prose and table segments

pub mod table;

pub use table::{render_reply, RenderPlan, Segment};
