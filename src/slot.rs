//! Slots connect operators.
//!
//! An [`ArraySource`] is anything that answers region of interest queries: an operator output ([`OperatorOutput`](crate::operator::OperatorOutput)), an in-memory array ([`MemorySource`]), or a decorator of another source ([`UsageLogSource`]).
//!
//! Operators receive sources through their input slots:
//!  - an [`InputSlot`] holds zero or one upstream source,
//!  - a [`ValueSlot`] holds a parameter value, and
//!  - a [`SlotList`] holds an ordered list of sub-slots that can be inserted and removed while observers are notified.
//!
//! Data is fetched by issuing a [`Request`] for a region of interest on a slot and waiting on it, optionally into an [`ArrayView`] with [`Request::write_into`].
//! Independent requests can be added to a [`RequestPool`] and waited on jointly.

mod memory_source;
mod request_pool;
mod slot_list;
mod usage_log;

use std::sync::Arc;

use parking_lot::RwLock;

pub use self::{
    memory_source::MemorySource,
    request_pool::{RequestPool, Waitable},
    slot_list::{SlotList, SlotListId, SlotListObserver},
    usage_log::UsageLogSource,
};

use crate::{
    array::{ArrayElements, ArrayView, Element, IncompatibleElementTypeError, OutputMeta},
    operator::OperatorError,
    roi::Roi,
};

/// A source of array data that answers region of interest queries.
pub trait ArraySource: Send + Sync {
    /// Return the current metadata of the source.
    fn meta(&self) -> Arc<OutputMeta>;

    /// Retrieve the elements of the source within `roi` into `view`.
    ///
    /// The elements are written in C order of `roi` into the C order positions of the region of `view`.
    /// `view` must have the same number of elements as `roi` and the element size of the source data type.
    ///
    /// # Errors
    /// Returns an [`OperatorError`] if the source is not ready, `roi` is invalid for the source, or computing the data fails.
    fn retrieve_into(&self, roi: &Roi, view: &mut ArrayView) -> Result<(), OperatorError>;
}

/// A shared [`ArraySource`].
pub type ArraySourceRef = Arc<dyn ArraySource>;

/// Convenience methods for retrieving data from an [`ArraySource`].
pub trait ArraySourceExt: ArraySource {
    /// Retrieve the bytes of the source within `roi` in C order.
    ///
    /// # Errors
    /// See [`ArraySource::retrieve_into`].
    fn retrieve(&self, roi: &Roi) -> Result<Vec<u8>, OperatorError> {
        let meta = self.meta();
        let element_size = meta.data_type.size();
        let num_bytes = usize::try_from(roi.num_elements())
            .ok()
            .and_then(|num_elements| num_elements.checked_mul(element_size))
            .ok_or_else(|| OperatorError::InvalidRoi(roi.clone(), "too many elements".to_string()))?;
        let mut bytes = vec![0u8; num_bytes];
        let mut view = ArrayView::new_full(&mut bytes, roi.shape(), element_size)?;
        self.retrieve_into(roi, &mut view)?;
        Ok(bytes)
    }

    /// Retrieve the elements of the source within `roi` in C order.
    ///
    /// # Errors
    /// See [`ArraySource::retrieve_into`].
    fn retrieve_elements(&self, roi: &Roi) -> Result<ArrayElements, OperatorError> {
        let data_type = self.meta().data_type;
        Ok(ArrayElements::from_bytes(data_type, &self.retrieve(roi)?)?)
    }

    /// Retrieve the elements of the source within `roi` as a vector of `T`.
    ///
    /// # Errors
    /// Returns [`OperatorError::IncompatibleElementType`] if `T` does not match the data type of the source.
    /// See also [`ArraySource::retrieve_into`].
    fn retrieve_typed<T: Element>(&self, roi: &Roi) -> Result<Vec<T>, OperatorError> {
        let data_type = self.meta().data_type;
        if data_type != T::DATA_TYPE {
            return Err(IncompatibleElementTypeError::new(T::DATA_TYPE, data_type).into());
        }
        Ok(bytemuck::pod_collect_to_vec(&self.retrieve(roi)?))
    }

    /// Retrieve the elements of the source within `roi` into an [`ndarray::ArrayD`].
    ///
    /// # Errors
    /// See [`ArraySourceExt::retrieve_typed`].
    #[cfg(feature = "ndarray")]
    fn retrieve_ndarray<T: Element>(&self, roi: &Roi) -> Result<ndarray::ArrayD<T>, OperatorError> {
        let elements = self.retrieve_typed::<T>(roi)?;
        Ok(crate::array::elements_to_ndarray(&roi.shape(), elements)?)
    }
}

impl<T: ArraySource + ?Sized> ArraySourceExt for T {}

/// An input slot with zero or one upstream [`ArraySource`].
///
/// An input slot is itself an [`ArraySource`] forwarding to its upstream, so slots can be shared between operators and slot lists.
pub struct InputSlot {
    name: &'static str,
    upstream: RwLock<Option<ArraySourceRef>>,
}

impl std::fmt::Debug for InputSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputSlot")
            .field("name", &self.name)
            .field("connected", &self.connected())
            .finish()
    }
}

impl InputSlot {
    /// Create a new unconnected input slot.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            upstream: RwLock::new(None),
        }
    }

    /// Create a new input slot connected to `upstream`.
    #[must_use]
    pub fn new_connected(name: &'static str, upstream: ArraySourceRef) -> Self {
        Self {
            name,
            upstream: RwLock::new(Some(upstream)),
        }
    }

    /// Return the name of the slot.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Connect the slot to `upstream`, replacing any existing connection.
    pub fn connect(&self, upstream: ArraySourceRef) {
        *self.upstream.write() = Some(upstream);
    }

    /// Disconnect the slot.
    pub fn disconnect(&self) {
        *self.upstream.write() = None;
    }

    /// Return the upstream source of the slot.
    #[must_use]
    pub fn upstream(&self) -> Option<ArraySourceRef> {
        self.upstream.read().clone()
    }

    /// Returns true if the slot is connected.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.upstream.read().is_some()
    }

    /// Returns true if the slot is connected and its upstream is ready.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.upstream().is_some_and(|upstream| upstream.meta().ready)
    }

    /// Create a request for the elements of the upstream source within `roi`.
    ///
    /// # Errors
    /// Returns [`OperatorError::SlotNotConnected`] if the slot is not connected.
    pub fn request(&self, roi: Roi) -> Result<Request, OperatorError> {
        let source = self
            .upstream()
            .ok_or(OperatorError::SlotNotConnected(self.name))?;
        Ok(Request::new(source, roi))
    }
}

impl ArraySource for InputSlot {
    /// Return the metadata of the upstream source, or not ready metadata if the slot is not connected.
    fn meta(&self) -> Arc<OutputMeta> {
        self.upstream()
            .map_or_else(|| Arc::new(OutputMeta::not_ready()), |upstream| upstream.meta())
    }

    fn retrieve_into(&self, roi: &Roi, view: &mut ArrayView) -> Result<(), OperatorError> {
        self.upstream()
            .ok_or(OperatorError::SlotNotConnected(self.name))?
            .retrieve_into(roi, view)
    }
}

/// An input slot holding a parameter value.
pub struct ValueSlot<T> {
    name: &'static str,
    value: RwLock<Option<T>>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for ValueSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueSlot")
            .field("name", &self.name)
            .field("value", &*self.value.read())
            .finish()
    }
}

impl<T: Clone> ValueSlot<T> {
    /// Create a new value slot without a value.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            value: RwLock::new(None),
        }
    }

    /// Create a new value slot with `value`.
    #[must_use]
    pub fn with_value(name: &'static str, value: T) -> Self {
        Self {
            name,
            value: RwLock::new(Some(value)),
        }
    }

    /// Return the name of the slot.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Set the value.
    pub fn set(&self, value: T) {
        *self.value.write() = Some(value);
    }

    /// Clear the value.
    pub fn clear(&self) {
        *self.value.write() = None;
    }

    /// Returns true if the slot has a value.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.value.read().is_some()
    }

    /// Return the value, if set.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.value.read().clone()
    }

    /// Return the value.
    ///
    /// # Errors
    /// Returns [`OperatorError::SlotNotReady`] if the slot has no value.
    pub fn value(&self) -> Result<T, OperatorError> {
        self.get().ok_or(OperatorError::SlotNotReady(self.name))
    }
}

/// A request for the elements of an [`ArraySource`] within a region of interest.
///
/// A request is lazy, nothing is computed until it is waited on.
#[must_use]
pub struct Request {
    source: ArraySourceRef,
    roi: Roi,
}

impl Request {
    /// Create a new request for the elements of `source` within `roi`.
    pub fn new(source: ArraySourceRef, roi: Roi) -> Self {
        Self { source, roi }
    }

    /// Return the region of interest of the request.
    #[must_use]
    pub fn roi(&self) -> &Roi {
        &self.roi
    }

    /// Direct the request to write into `view` rather than a new buffer.
    pub fn write_into(self, view: ArrayView<'_>) -> WriteRequest<'_> {
        WriteRequest {
            source: self.source,
            roi: self.roi,
            view,
        }
    }

    /// Execute the request and return the bytes of the region in C order.
    ///
    /// # Errors
    /// See [`ArraySource::retrieve_into`].
    pub fn wait(self) -> Result<Vec<u8>, OperatorError> {
        self.source.retrieve(&self.roi)
    }

    /// Execute the request and return the elements of the region in C order.
    ///
    /// # Errors
    /// See [`ArraySource::retrieve_into`].
    pub fn wait_elements(self) -> Result<ArrayElements, OperatorError> {
        self.source.retrieve_elements(&self.roi)
    }
}

/// A [`Request`] writing into an [`ArrayView`].
#[must_use]
pub struct WriteRequest<'a> {
    source: ArraySourceRef,
    roi: Roi,
    view: ArrayView<'a>,
}

impl WriteRequest<'_> {
    /// Execute the request, filling the view.
    ///
    /// # Errors
    /// See [`ArraySource::retrieve_into`].
    pub fn wait(mut self) -> Result<(), OperatorError> {
        self.source.retrieve_into(&self.roi, &mut self.view)
    }
}

/// A changed region of an input or output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirtyRegion {
    /// The entire array changed.
    Full,
    /// The region of interest changed.
    Roi(Roi),
}

impl From<Roi> for DirtyRegion {
    fn from(roi: Roi) -> Self {
        Self::Roi(roi)
    }
}

/// A notification that a region of an operator output is dirty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirtyNotification {
    /// The name of the output slot.
    pub slot: &'static str,
    /// The index of the sub-output within the output slot, empty for a single output.
    pub subindex: Vec<usize>,
    /// The dirty region of the output.
    pub region: DirtyRegion,
}

impl DirtyNotification {
    /// Create a notification that the entire output is dirty.
    #[must_use]
    pub fn full(slot: &'static str, subindex: Vec<usize>) -> Self {
        Self {
            slot,
            subindex,
            region: DirtyRegion::Full,
        }
    }

    /// Create a notification that `roi` of the output is dirty.
    #[must_use]
    pub fn roi(slot: &'static str, subindex: Vec<usize>, roi: Roi) -> Self {
        Self {
            slot,
            subindex,
            region: DirtyRegion::Roi(roi),
        }
    }
}
