//! Lifecycle state machine for a single resource handle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`ResourceHandle`](crate::ResourceHandle).
///
/// ```text
/// Uninitialized ──> Initializing ──> Ready <──> Degraded
///       │                 │            │           │
///       │                 └──> Failed  └──> Closing <┘
///       └──────────────────────────────────> Closing ──> Closed
/// ```
///
/// Transitions are monotonic except the health-driven `Ready <-> Degraded`
/// pair. `Closed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    /// Handle exists but construction has not started.
    Uninitialized,
    /// The factory is building the native client.
    Initializing,
    /// Client is live and the last probe (if any) succeeded.
    Ready,
    /// Client is live but the last probe was slow or failing.
    Degraded,
    /// The client is being released.
    Closing,
    /// The client was released. Terminal.
    Closed,
    /// Construction failed; no client is held. Terminal.
    Failed,
}

impl ResourceState {
    /// Every state, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Uninitialized,
        Self::Initializing,
        Self::Ready,
        Self::Degraded,
        Self::Closing,
        Self::Closed,
        Self::Failed,
    ];

    /// States reachable in one step from `self`.
    #[must_use]
    pub fn next_states(self) -> &'static [Self] {
        match self {
            Self::Uninitialized => &[Self::Initializing, Self::Closing],
            Self::Initializing => &[Self::Ready, Self::Failed],
            Self::Ready => &[Self::Degraded, Self::Closing],
            Self::Degraded => &[Self::Ready, Self::Closing],
            Self::Closing => &[Self::Closed],
            Self::Closed | Self::Failed => &[],
        }
    }

    /// Whether `self -> target` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next_states().contains(&target)
    }

    /// `Closed` and `Failed` accept no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Whether the handle holds a usable client.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Ready | Self::Degraded)
    }

    /// Stable lowercase tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
