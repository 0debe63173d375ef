pub(crate) mod admin;
pub(crate) mod ai;
pub(crate) mod hazards;
pub(crate) mod meta;
pub(crate) mod policy;
pub(crate) mod reputation;
pub(crate) mod segments;
pub(crate) mod webhooks;
