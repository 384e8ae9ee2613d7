use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rayon_iter_concurrent_limit::iter_concurrent_limit;

use crate::{config::global_config, operator::OperatorError};

use super::{Request, WriteRequest};

/// A unit of work that can be waited on.
pub trait Waitable: Send {
    /// The output of the work.
    type Output: Send;

    /// Execute the work.
    ///
    /// # Errors
    /// Returns an [`OperatorError`] if the work fails.
    fn wait(self) -> Result<Self::Output, OperatorError>;
}

impl Waitable for Request {
    type Output = Vec<u8>;

    fn wait(self) -> Result<Self::Output, OperatorError> {
        Request::wait(self)
    }
}

impl Waitable for WriteRequest<'_> {
    type Output = ();

    fn wait(self) -> Result<Self::Output, OperatorError> {
        WriteRequest::wait(self)
    }
}

/// A pool of independent requests that are executed concurrently and waited on jointly.
///
/// The number of requests executed concurrently is limited by the [request concurrent limit](crate::config::Config#request-concurrent-limit).
#[must_use]
pub struct RequestPool<R: Waitable> {
    requests: Vec<R>,
}

impl<R: Waitable> Default for RequestPool<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Waitable> RequestPool<R> {
    /// Create a new empty request pool.
    pub fn new() -> Self {
        Self {
            requests: Vec::new(),
        }
    }

    /// Add a request to the pool.
    pub fn add(&mut self, request: R) {
        self.requests.push(request);
    }

    /// Return the number of requests in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns true if the pool has no requests.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Execute all requests in the pool and wait for them to complete, releasing the pool.
    ///
    /// The outputs are returned in the order the requests were added.
    ///
    /// # Errors
    /// Returns the first [`OperatorError`] of a failed request.
    pub fn wait(self) -> Result<Vec<R::Output>, OperatorError> {
        let num_requests = self.requests.len();
        match num_requests {
            0 => Ok(vec![]),
            1 => self.requests.into_iter().map(Waitable::wait).collect(),
            _ => {
                let concurrent_limit = global_config().request_concurrent_limit().max(1);
                tracing::trace!(num_requests, concurrent_limit, "waiting on request pool");
                iter_concurrent_limit!(concurrent_limit, self.requests, map, Waitable::wait)
                    .collect()
            }
        }
    }
}
