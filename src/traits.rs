use std::borrow::Cow;
use std::sync::{Arc, RwLock};

use crate::error::AuthorizationError;
use crate::types::PolicySet;

/// Where an engine gets its policies from. Storage and retrieval live
/// behind this trait; the engine only asks for the current set once per
/// call.
pub trait PolicySource: Send + Sync {
    /// The policy set to evaluate the next call against.
    fn policy_set(&self) -> Result<Cow<'_, PolicySet>, AuthorizationError>;
}

impl PolicySource for PolicySet {
    fn policy_set(&self) -> Result<Cow<'_, PolicySet>, AuthorizationError> {
        Ok(Cow::Borrowed(self))
    }
}

impl<S: PolicySource + ?Sized> PolicySource for Arc<S> {
    fn policy_set(&self) -> Result<Cow<'_, PolicySet>, AuthorizationError> {
        (**self).policy_set()
    }
}

/// A swappable set: readers get a snapshot, writers replace the whole set.
impl PolicySource for RwLock<PolicySet> {
    fn policy_set(&self) -> Result<Cow<'_, PolicySet>, AuthorizationError> {
        let guard = self.read()?;
        Ok(Cow::Owned(guard.clone()))
    }
}
