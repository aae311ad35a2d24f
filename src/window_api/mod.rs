//! Contains logic for sampling the focused application in different environments.
//! [GenericFocusSampler] is the main artifact of this module that abstracts
//! the operations.

#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "x11")]
extern crate xcb;

use std::{sync::Arc, time::Duration};

use anyhow::Result;

/// What the user is focused on at one moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusSample {
    /// Name of the frontmost application. For example 'firefox' or 'nvim'
    pub app_name: Arc<str>,
    /// Title of its focused window. For example 'Vibing in YouTube - Mozilla Firefox'. May be
    /// empty.
    pub window_title: Arc<str>,
}

impl FocusSample {
    pub fn new(app_name: impl Into<Arc<str>>, window_title: impl Into<Arc<str>>) -> Self {
        Self {
            app_name: app_name.into(),
            window_title: window_title.into(),
        }
    }
}

/// Intended to serve as a contract every desktop environment must implement.
#[cfg_attr(test, mockall::automock)]
pub trait FocusSampler {
    /// Returns `None` when no frontmost application can be resolved.
    fn poll(&mut self) -> Result<Option<FocusSample>>;

    /// Time elapsed since the last keyboard or mouse input.
    fn idle_time(&mut self) -> Result<Duration>;
}

/// Serves as a cross-compatible FocusSampler implementation.
pub struct GenericFocusSampler {
    inner: Box<dyn FocusSampler>,
}

impl GenericFocusSampler {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "x11")] {
                use x11::X11FocusSampler;
                Ok(Self {
                    inner: Box::new(X11FocusSampler::new()?),
                })
            }
            else {
                Err(anyhow::anyhow!(
                    "No focus sampler backend was compiled in. Rebuild with `--features x11`"
                ))
            }
        }
    }
}

impl FocusSampler for GenericFocusSampler {
    fn poll(&mut self) -> Result<Option<FocusSample>> {
        self.inner.poll()
    }

    fn idle_time(&mut self) -> Result<Duration> {
        self.inner.idle_time()
    }
}
