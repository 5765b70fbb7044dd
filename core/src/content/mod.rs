pub mod poller;
pub mod reconciler;

pub use poller::{spawn_content_poller, PollOutcome};
pub use reconciler::{append_follow_up, merge_remote, needs_polling, FollowUpRequest, MergeReport};
