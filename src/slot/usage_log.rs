//! A source decorator which logs requests.

use std::{io::Write, sync::Arc};

use parking_lot::Mutex;

use crate::{array::ArrayView, array::OutputMeta, operator::OperatorError, roi::Roi};

use super::{ArraySource, ArraySourceRef};

/// The usage log source. Logs requests to an inner [`ArraySource`].
///
/// It is intended to aid in debugging and optimising operator graphs by revealing request patterns.
///
/// ### Example (log to stdout)
/// ```rust
/// # use std::sync::Arc;
/// # use parking_lot::Mutex;
/// # use roiflow::{array::AxisTags, slot::{MemorySource, UsageLogSource}};
/// let source = Arc::new(MemorySource::from_elements(vec![4], AxisTags::from_keys("x"), vec![0u8; 4])?);
/// let log_writer = Arc::new(Mutex::new(std::io::stdout()));
/// let source = UsageLogSource::new(source, log_writer, || "[usage] ".to_string());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// Retrieving through the above [`UsageLogSource`] prints outputs like:
/// ```text
/// [usage] retrieve_into([0..2]) -> Ok(len=2)
/// [usage] retrieve_into([2..6]) -> Err(the region [2..6] is out of bounds for shape [4])
/// ```
pub struct UsageLogSource {
    source: ArraySourceRef,
    handle: Arc<Mutex<dyn Write + Send>>,
    prefix_func: fn() -> String,
}

impl std::fmt::Debug for UsageLogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "usage log")
    }
}

impl UsageLogSource {
    /// Create a new usage log source wrapping `source`.
    pub fn new(
        source: ArraySourceRef,
        handle: Arc<Mutex<dyn Write + Send>>,
        prefix_func: fn() -> String,
    ) -> Self {
        Self {
            source,
            handle,
            prefix_func,
        }
    }
}

impl ArraySource for UsageLogSource {
    fn meta(&self) -> Arc<OutputMeta> {
        self.source.meta()
    }

    fn retrieve_into(&self, roi: &Roi, view: &mut ArrayView) -> Result<(), OperatorError> {
        let result = self.source.retrieve_into(roi, view);
        let outcome = match &result {
            Ok(()) => format!("Ok(len={})", roi.num_elements()),
            Err(err) => format!("Err({err})"),
        };
        tracing::debug!(roi = %roi, %outcome, "retrieve_into");
        // The log is best effort, a failed write does not fail the request
        let _ = writeln!(
            self.handle.lock(),
            "{}retrieve_into({roi}) -> {outcome}",
            (self.prefix_func)(),
        );
        result
    }
}
