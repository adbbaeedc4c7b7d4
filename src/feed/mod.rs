pub mod commands;
pub mod controller;
pub mod events;
pub mod proximity;
pub mod state;

pub use controller::FeedController;
pub use events::FeedEvent;
pub use proximity::{
    filter_within_radius, insertion_index, sort_by_distance, AnnotatedReport, NEARBY_RADIUS_KM,
};
pub use state::{
    EventOutcome, FeedPhase, FeedSnapshot, FeedView, InsertOutcome, LiveFeedStore, UpdateOutcome,
};
