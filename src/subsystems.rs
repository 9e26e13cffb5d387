//! Subsystem registration — centralizes all DB initialization functions.
//!
//! Adding a new subsystem: append one entry to `SUBSYSTEMS`.

use crate::core::error;
use crate::engine::{events, gamification, moderation, reviews, votes};
use std::path::Path;

pub(crate) struct SubsystemInit {
    /// Subsystem identifier (used for diagnostics).
    #[allow(dead_code)]
    pub name: &'static str,
    pub initialize_db: fn(&Path) -> Result<(), error::EngineError>,
}

/// All subsystems that require table initialization.
/// Order matters for first-open reliability — reviews creates the review
/// and content surfaces the others reference; sequential execution avoids
/// SQLite contention during bootstrap.
pub(crate) const SUBSYSTEMS: &[SubsystemInit] = &[
    SubsystemInit { name: "reviews", initialize_db: reviews::initialize_reviews_db },
    SubsystemInit { name: "votes", initialize_db: votes::initialize_votes_db },
    SubsystemInit { name: "gamification", initialize_db: gamification::initialize_gamification_db },
    SubsystemInit { name: "moderation", initialize_db: moderation::initialize_moderation_db },
    SubsystemInit { name: "events", initialize_db: events::initialize_events_db },
];

/// Initialize all subsystem tables sequentially.
pub(crate) fn initialize_all_dbs(data_root: &Path) -> Result<(), error::EngineError> {
    for sub in SUBSYSTEMS {
        (sub.initialize_db)(data_root)?;
    }
    Ok(())
}
