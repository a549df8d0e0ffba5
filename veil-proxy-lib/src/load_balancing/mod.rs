mod weighted;

pub use weighted::{pick, pick_at};
