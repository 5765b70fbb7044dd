pub mod progress;
pub mod source;
pub mod state;

pub use progress::{split_progress, waypoint_sample_indices, ProgressSplit, ProgressTracker};
pub use source::{PositionFix, PositionSource};
pub use state::{Arrival, NavState, NavigationSession};
