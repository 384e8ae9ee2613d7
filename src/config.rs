//! Roiflow global configuration options.

use std::{num::NonZeroUsize, sync::OnceLock};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Global configuration options for the roiflow crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
///
/// # Request Configuration Options
///
/// ## Validate Request Bounds
///  > default: [`true`]
///
/// If enabled, an operator output rejects a region of interest that is not within the bounds of its shape with [`OperatorError::RoiOutOfBounds`](crate::operator::OperatorError::RoiOutOfBounds).
/// Otherwise the region is forwarded as is and any failure surfaces from an upstream source.
///
/// ## Concurrency Configuration Options
/// ## Request Concurrent Limit
/// > default: [`std::thread::available_parallelism`]`()`
///
/// The maximum number of requests of a [`RequestPool`](crate::slot::RequestPool) that are executed concurrently when the pool is waited on.
/// Operators with several independent sources (e.g. the stacker, the channel selector, and the merger) fan out through a request pool.
/// A limit of zero is treated as one.
#[derive(Debug)]
pub struct Config {
    validate_request_bounds: bool,
    request_concurrent_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            validate_request_bounds: true,
            request_concurrent_limit: std::thread::available_parallelism()
                .map_or(1, NonZeroUsize::get),
        }
    }
}

impl Config {
    /// Get the [validate request bounds](#validate-request-bounds) configuration.
    #[must_use]
    pub fn validate_request_bounds(&self) -> bool {
        self.validate_request_bounds
    }

    /// Set the [validate request bounds](#validate-request-bounds) configuration.
    pub fn set_validate_request_bounds(&mut self, validate_request_bounds: bool) {
        self.validate_request_bounds = validate_request_bounds;
    }

    /// Get the [request concurrent limit](#request-concurrent-limit) configuration.
    #[must_use]
    pub fn request_concurrent_limit(&self) -> usize {
        self.request_concurrent_limit
    }

    /// Set the [request concurrent limit](#request-concurrent-limit) configuration.
    pub fn set_request_concurrent_limit(&mut self, concurrent_limit: usize) {
        self.request_concurrent_limit = concurrent_limit;
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global roiflow configuration.
///
/// The global config must not be held by the current thread when calling [`global_config_mut`], otherwise it deadlocks.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG.get_or_init(|| RwLock::new(Config::default())).read()
}

/// Returns a mutable reference to the global roiflow configuration.
///
/// The global config must not be held by the current thread, otherwise it deadlocks.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG.get_or_init(|| RwLock::new(Config::default())).write()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = Config::default();
        assert!(config.validate_request_bounds());
        assert!(config.request_concurrent_limit() >= 1);
    }

    #[test]
    fn config_request_concurrent_limit() {
        let limit = global_config().request_concurrent_limit();
        global_config_mut().set_request_concurrent_limit(1);
        assert_eq!(global_config().request_concurrent_limit(), 1);
        global_config_mut().set_request_concurrent_limit(limit);
    }
}
