//! Contains logic for resolving the foreground window in different
//! environments. [GenericSampleSource] is the main artifact of this module
//! that abstracts the operations.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::sync::Arc;

use anyhow::Result;

/// OS permissions the sampler is allowed to rely on, as the settings
/// collaborator reports them.
#[derive(Debug, Clone, Copy)]
pub struct SamplePermissions {
    pub accessibility: bool,
    pub screen_recording: bool,
}

impl Default for SamplePermissions {
    fn default() -> Self {
        Self {
            accessibility: true,
            screen_recording: true,
        }
    }
}

/// One point-in-time observation of the foreground window.
#[derive(Debug, Clone)]
pub struct ForegroundSnapshot {
    /// Platform the snapshot was taken on, for example "windows" or "linux".
    pub platform: Arc<str>,
    /// Foreign window id as reported by the windowing system.
    pub window_id: u32,
    /// Window title. For example 'bash in hello' or 'Vibing in YouTube -
    /// Chrome'
    pub title: Arc<str>,
    /// Full path to the owning executable. For example /usr/bin/nvim
    pub owner_path: Arc<str>,
    pub owner_process_id: u32,
    /// Executable name without the path.
    pub owner_name: Arc<str>,
    pub owner_bundle_id: Option<String>,
    /// URL the window is showing, when the platform can resolve one.
    pub url: Option<String>,
}

/// Contract every platform sampler implements. `Ok(None)` means no
/// foreground window could be resolved right now and the tick skips
/// silently.
#[cfg_attr(test, mockall::automock)]
pub trait SampleSource: Send + 'static {
    fn sample(&mut self, permissions: SamplePermissions) -> Result<Option<ForegroundSnapshot>>;
}

/// Recognizes OS permission denials by their diagnostic text, which is the
/// only shape such failures reliably share across sampler backends.
pub fn is_permission_denied(error: &anyhow::Error) -> bool {
    format!("{error:?}").to_lowercase().contains("permission")
}

/// Serves as a cross-compatible SampleSource implementation.
pub struct GenericSampleSource {
    inner: Box<dyn SampleSource>,
}

impl GenericSampleSource {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsSampleSource;
                Ok(Self {
                    inner: Box::new(WindowsSampleSource::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::X11SampleSource;
                Ok(Self {
                    inner: Box::new(X11SampleSource::new()?),
                })
            }
            else {
                // This runtime error is needed to allow the project to be compiled for during testing.
                unimplemented!("No sample source was specified")
            }
        }
    }
}

impl SampleSource for GenericSampleSource {
    fn sample(&mut self, permissions: SamplePermissions) -> Result<Option<ForegroundSnapshot>> {
        self.inner.sample(permissions)
    }
}
