//! In-process app-ops service.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use projector_common::error::{RemoteError, RemoteResult};
use projector_platform_core::{AppOpMode, AppOpsService, PlatformFeatures};

use crate::fault::FaultPlan;

/// Highest op code known per API level; later ops do not exist yet.
const OP_CODE_LIMITS: [(u32, i32); 5] = [(28, 87), (29, 104), (32, 118), (33, 126), (34, 138)];

/// App-ops service that records modes in a table.
pub struct LoopbackAppOps {
    features: PlatformFeatures,
    modes: Mutex<HashMap<(i32, u32, String), AppOpMode>>,
    faults: FaultPlan,
}

impl LoopbackAppOps {
    pub(crate) fn new(features: PlatformFeatures) -> Self {
        Self {
            features,
            modes: Mutex::new(HashMap::new()),
            faults: FaultPlan::default(),
        }
    }

    /// Mode last set for `op_code` of (`uid`, `package`).
    pub fn mode(&self, op_code: i32, uid: u32, package: &str) -> Option<AppOpMode> {
        self.modes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(op_code, uid, package.to_string()))
            .copied()
    }

    /// Fail the next `setMode` call with `error`.
    pub fn fail_next(&self, error: RemoteError) {
        self.faults.arm("setMode", error);
    }

    fn max_op_code(&self) -> i32 {
        let level = self.features.api_level();
        OP_CODE_LIMITS
            .iter()
            .rev()
            .find(|(min_level, _)| level >= *min_level)
            .map_or(OP_CODE_LIMITS[0].1, |(_, max)| *max)
    }
}

impl AppOpsService for LoopbackAppOps {
    fn set_mode(
        &self,
        op_code: i32,
        uid: u32,
        package: &str,
        mode: AppOpMode,
    ) -> RemoteResult<()> {
        self.faults.check("setMode")?;

        if op_code < 0 || op_code > self.max_op_code() {
            return Err(RemoteError::Exception(format!(
                "IllegalArgumentException: unknown operation {op_code}"
            )));
        }
        self.modes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((op_code, uid, package.to_string()), mode);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ops_newer_than_api_level() {
        let ops = LoopbackAppOps::new(PlatformFeatures::from_api_level(33));
        assert!(ops.set_mode(119, 10_000, "pkg", AppOpMode::Allowed).is_ok());
        assert!(ops.set_mode(138, 10_000, "pkg", AppOpMode::Allowed).is_err());
        assert_eq!(ops.mode(119, 10_000, "pkg"), Some(AppOpMode::Allowed));
        assert_eq!(ops.mode(138, 10_000, "pkg"), None);
    }
}
