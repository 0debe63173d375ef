//! Canonical event topic constants shared across the fleet services.
//!
//! Centralizing the strings keeps publishers and subscribers in sync.
//! Keep each section alphabetized and favor dot.case names.

// Incidents / hazards
pub const TOPIC_HAZARDS_UPDATED: &str = "hazards.updated";
pub const TOPIC_INCIDENTS_REPORTED: &str = "incidents.reported";

// AI audit jobs
pub const TOPIC_AI_JOBS_COMPLETED: &str = "ai.jobs.completed";
pub const TOPIC_AI_JOBS_CREATED: &str = "ai.jobs.created";
pub const TOPIC_AI_JOBS_FAILED: &str = "ai.jobs.failed";

// Policy ledger
pub const TOPIC_POLICY_SUGGESTION_APPLIED: &str = "policy.suggestion.applied";
pub const TOPIC_POLICY_SUGGESTION_RECORDED: &str = "policy.suggestion.recorded";

// Reputation
pub const TOPIC_REPUTATION_EVENT: &str = "reputation.event";

// Sandboxes
pub const TOPIC_SANDBOX_ADMITTED: &str = "sandbox.admitted";
pub const TOPIC_SANDBOX_EVICTED: &str = "sandbox.evicted";

// Webhooks
pub const TOPIC_WEBHOOKS_SUBSCRIBED: &str = "webhooks.subscribed";
