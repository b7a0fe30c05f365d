//! Session lifecycle state machine.
//!
//! ```text
//!  Created ──► Configured ──► SurfaceBound ──► Running
//!     │             │               │             │
//!     ▼             ▼               ▼             ▼
//!     └─────────────┴──────► Cleanup ◄────────────┘
//!                               │
//!                               ▼
//!                          Terminated
//! ```
//!
//! Every phase may fall into `Cleanup`; nothing leaves `Terminated`.

use std::time::{Duration, Instant};

use crate::error::MirrorError;

/// The current phase of one streaming session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Connection accepted, nothing acquired yet.
    #[default]
    Created,

    /// Encoder configured but not started.
    Configured,

    /// Input surface created and handed to the display mirror.
    SurfaceBound,

    /// Encoder started; the drain loop is live.
    Running {
        /// When the session entered `Running`.
        since: Instant,
    },

    /// Releasing the display binding and the encoder.
    Cleanup,

    /// All resources released; the next session may begin.
    Terminated,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Configured => write!(f, "Configured"),
            Self::SurfaceBound => write!(f, "SurfaceBound"),
            Self::Running { .. } => write!(f, "Running"),
            Self::Cleanup => write!(f, "Cleanup"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

impl SessionPhase {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// How long the session has been streaming. `None` outside `Running`.
    pub fn running_duration(&self) -> Option<Duration> {
        match self {
            Self::Running { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Created`.
    pub fn configured(&mut self) -> Result<(), MirrorError> {
        match self {
            Self::Created => {
                *self = Self::Configured;
                Ok(())
            }
            _ => Err(MirrorError::InvalidPhase(
                "cannot configure: not in Created phase",
            )),
        }
    }

    /// Valid from: `Configured`.
    pub fn surface_bound(&mut self) -> Result<(), MirrorError> {
        match self {
            Self::Configured => {
                *self = Self::SurfaceBound;
                Ok(())
            }
            _ => Err(MirrorError::InvalidPhase(
                "cannot bind surface: not in Configured phase",
            )),
        }
    }

    /// Valid from: `SurfaceBound`.
    pub fn running(&mut self) -> Result<(), MirrorError> {
        match self {
            Self::SurfaceBound => {
                *self = Self::Running {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(MirrorError::InvalidPhase(
                "cannot start: surface not bound",
            )),
        }
    }

    /// Valid from any phase except `Terminated`. Entering `Cleanup`
    /// twice is allowed.
    pub fn cleanup(&mut self) -> Result<(), MirrorError> {
        match self {
            Self::Terminated => Err(MirrorError::InvalidPhase(
                "cannot clean up: session already terminated",
            )),
            _ => {
                *self = Self::Cleanup;
                Ok(())
            }
        }
    }

    /// Valid from: `Cleanup`.
    pub fn terminated(&mut self) -> Result<(), MirrorError> {
        match self {
            Self::Cleanup => {
                *self = Self::Terminated;
                Ok(())
            }
            _ => Err(MirrorError::InvalidPhase(
                "cannot terminate: cleanup has not run",
            )),
        }
    }
}
