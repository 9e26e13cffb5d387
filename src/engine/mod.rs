//! Subsystem implementations: review ingestion, votes, rating aggregates,
//! gamification triggers, moderation, the event outbox, and the schema
//! repair layer they fall back on.

pub mod catalog;
pub mod events;
pub mod gamification;
pub mod moderation;
pub mod ratings;
pub mod reconcile;
pub mod reviews;
pub mod votes;
