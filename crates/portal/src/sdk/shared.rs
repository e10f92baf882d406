//! Construct-once-per-process SDK handle.
//!
//! Several SDK instances in one process would each hold a session and a
//! listener, and could disagree about who is signed in. The handle builds
//! its SDK on first use and hands the same instance to every later caller.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use super::{IdentitySdk, SdkError};

/// Holds at most one SDK instance.
pub struct SdkHandle {
    cell: OnceLock<Arc<dyn IdentitySdk>>,
    // Serializes `build` so racing callers never construct a second SDK.
    building: Mutex<()>,
}

static SHARED: SdkHandle = SdkHandle::new();

/// The process-wide handle.
#[must_use]
pub fn shared() -> &'static SdkHandle {
    &SHARED
}

impl SdkHandle {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            building: Mutex::new(()),
        }
    }

    /// The existing instance, or one built by `build`.
    ///
    /// `build` runs at most once per successful initialization. Racing
    /// callers wait for the first build and then share its instance.
    ///
    /// # Errors
    ///
    /// Returns the error from `build`; nothing is stored in that case.
    pub fn get_or_try_init<F>(&self, build: F) -> Result<Arc<dyn IdentitySdk>, SdkError>
    where
        F: FnOnce() -> Result<Arc<dyn IdentitySdk>, SdkError>,
    {
        if let Some(existing) = self.cell.get() {
            tracing::debug!("Reusing existing identity SDK");
            return Ok(Arc::clone(existing));
        }

        let _building = self.building.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = self.cell.get() {
            return Ok(Arc::clone(existing));
        }

        let built = build()?;
        Ok(Arc::clone(self.cell.get_or_init(|| built)))
    }

    /// The instance, if one has been built.
    #[must_use]
    pub fn get(&self) -> Option<Arc<dyn IdentitySdk>> {
        self.cell.get().cloned()
    }
}

impl Default for SdkHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SdkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkHandle")
            .field("initialized", &self.cell.get().is_some())
            .finish()
    }
}
