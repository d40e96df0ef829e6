mod dedup;
mod job;

pub use dedup::{haversine_distance_m, Deduplicator, DEFAULT_MOVEMENT_THRESHOLD_M};
pub use job::{
    CycleDetail, CycleReport, DrainSummary, TrackingJob, LAST_CYCLE_KEY, LAST_SYNCED_KEY,
};
