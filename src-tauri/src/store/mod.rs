//! Client-side state containers. Each store mirrors a slice of backend state,
//! applies optimistic edits, and records the last failure as a display string.

pub mod agent;
pub mod conversation;
pub mod knowledge;

#[cfg(test)]
pub(crate) mod fake;
