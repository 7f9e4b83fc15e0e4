//! Error type shared by boot-time setup and the control surface.
//!
//! Nothing on a recording or decode path returns one of these; those paths
//! degrade to no-ops instead.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// The physical range could not be reserved or mapped.
    #[error("failed to reserve {size:#x} bytes at {base:#x}")]
    AllocationFailure { base: u64, size: usize },

    /// The requested range overlaps an existing reservation.
    #[error("range {base:#x}+{size:#x} overlaps an existing reservation")]
    RegionOverlap { base: u64, size: usize },

    /// A control operation named a category that is not registered.
    #[error("unknown category")]
    UnknownCategory,

    /// The `ess_setup=` boot parameter could not be parsed.
    #[error("invalid boot parameter")]
    InvalidBootParam,

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("argument out of range")]
    InvalidArgument,

    #[error("list is full")]
    ListFull,

    #[error("entry not found")]
    NotFound,

    /// The engine has no region or was switched off.
    #[error("engine is disabled")]
    EngineDisabled,

    #[error("an engine is already installed")]
    AlreadyInstalled,

    /// The event arenas do not fit in the primary category.
    #[error("event arenas need {needed:#x} bytes but only {available:#x} are available")]
    LayoutOverflow { needed: usize, available: usize },
}

pub type Result<T> = core::result::Result<T, SnapshotError>;
