//! Backend selection module.
//!
//! Defines where kernel instances execute and provides functions to set and
//! get the current backend.
//!
//! # Supported Backends
//!
//! - `Host`: block programs run on the `rayon` pool (default).
//! - `Wgpu`: eligible GEMM instances run as WGSL compute shaders (requires
//!   the `wgpu` feature). Everything else stays on the host.
//!
//! The backend is stored globally using an `AtomicU8`, enabling fast
//! switching at runtime. Selection never looks at the backend: the same
//! instance is chosen either way.

use core::convert::TryFrom;
use core::sync::atomic::{AtomicU8, Ordering};

/// Enumeration of execution backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Backend {
    /// Host execution on the `rayon` pool (default).
    #[default]
    Host = 0,
    /// GPU execution through `wgpu`, falling back to the host per launch.
    Wgpu,
}

impl TryFrom<u8> for Backend {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Host),
            1 => Ok(Self::Wgpu),
            _ => Err(()),
        }
    }
}

/// Relaxed-change global state for the active backend.
static GLOBAL_BACKEND: AtomicU8 = AtomicU8::new(Backend::Host as u8);

/// Sets the active backend.
///
/// # Example
///
/// ```
/// use tile_kernels::backend::{get_backend, set_backend, Backend};
/// set_backend(Backend::Host);
/// assert_eq!(get_backend(), Backend::Host);
/// ```
pub fn set_backend(b: Backend) {
    GLOBAL_BACKEND.store(b as u8, Ordering::Release);
}

/// Returns the currently active backend.
///
/// If the stored value is invalid, defaults to [`Backend::Host`].
pub fn get_backend() -> Backend {
    Backend::try_from(GLOBAL_BACKEND.load(Ordering::Acquire)).unwrap_or_default()
}
