//! One-shot failure injection for loopback services.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use projector_common::error::{RemoteError, RemoteResult};

/// Failures armed per operation name; each fires once.
#[derive(Debug, Default)]
pub struct FaultPlan {
    armed: Mutex<HashMap<&'static str, RemoteError>>,
}

impl FaultPlan {
    pub fn arm(&self, operation: &'static str, error: RemoteError) {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(operation, error);
    }

    /// Fail with the armed error for `operation`, disarming it.
    pub fn check(&self, operation: &'static str) -> RemoteResult<()> {
        let armed = self
            .armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(operation);
        match armed {
            Some(error) => {
                tracing::debug!(operation, %error, "Injected remote failure");
                Err(error)
            }
            None => Ok(()),
        }
    }
}
