// ── Single-device lending state machine ──
//
// Transitions are driven by explicit operator action. Everything here is
// pure; the orchestrator decides when a transition also needs a directory
// mutation.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::LifecycleState;

/// An operator action on one device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum DeviceLifecycle {
    #[strum(serialize = "check out")]
    Checkout,
    #[strum(serialize = "request a signature for")]
    RequestSignature,
    #[strum(serialize = "sign for")]
    Sign,
    #[strum(serialize = "check in")]
    Checkin,
    #[strum(serialize = "reset")]
    Reset,
    #[strum(serialize = "return to service")]
    ReturnToService,
}

impl LifecycleState {
    /// The state reached by applying `action`, or `InvalidTransition`.
    pub fn apply(self, action: DeviceLifecycle) -> Result<Self, CoreError> {
        use DeviceLifecycle as A;
        use LifecycleState as S;

        let next = match (self, action) {
            (S::Available, A::Checkout) => S::CheckedOut,
            (S::CheckedOut, A::RequestSignature) => S::PendingSignature,
            (S::PendingSignature, A::Sign) => S::CheckedOutSigned,
            (S::CheckedOut | S::PendingSignature | S::CheckedOutSigned, A::Checkin) => S::Available,
            (_, A::Reset) => S::ResetWiped,
            (S::ResetWiped, A::ReturnToService) => S::Available,
            (from, action) => return Err(CoreError::InvalidTransition { from, action }),
        };
        Ok(next)
    }

    /// Whether `action` is allowed from this state.
    pub fn can(self, action: DeviceLifecycle) -> bool {
        self.apply(action).is_ok()
    }
}
