//!
//! # Write actions
//!
//! Controllers queue these against a [`StoreContext`] instead of touching
//! the store directly; a per-kind dispatcher applies them in order. Spec
//! writes are not actions: they go through the checked `apply_spec` path
//! so the writer sees conflicts synchronously.
//!
//! [`StoreContext`]: crate::store::StoreContext

use std::fmt::{self, Display};

use flotilla_state_model::core::Spec;

/// write action against a single kind's store
#[derive(Debug, PartialEq, Clone)]
pub enum WSAction<S>
where
    S: Spec,
{
    /// replace observed state, leaving the spec and its generation alone
    UpdateStatus((S::IndexKey, S::Status)),
    /// remove a fully drained object from the store
    DeleteFinal(S::IndexKey),
}

impl<S> Display for WSAction<S>
where
    S: Spec,
    S::IndexKey: Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WSAction::UpdateStatus((key, _)) => write!(f, "{} Update Status: {}", S::LABEL, key),
            WSAction::DeleteFinal(key) => write!(f, "{} Delete Final: {}", S::LABEL, key),
        }
    }
}
