use super::client::{LcrClient, WriteConfirmation};
use super::transport::{TcpTransport, Transport};
use crate::error::LcrError;
use crate::quantity::Quantity;
use crate::types::MeasurementSet;
use parking_lot::Mutex;
use std::sync::Arc;

/// Cloneable handle to one instrument session.
///
/// The instrument processes one command at a time, so every operation holds
/// the session lock from its first write to its last read.
pub struct SharedClient<T: Transport = TcpTransport> {
    inner: Arc<Mutex<LcrClient<T>>>,
}

impl<T: Transport> Clone for SharedClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> SharedClient<T> {
    pub fn new(client: LcrClient<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(client)),
        }
    }

    /// Run `f` with exclusive access to the session.
    pub fn with<R>(&self, f: impl FnOnce(&mut LcrClient<T>) -> R) -> R {
        let mut client = self.inner.lock();
        f(&mut client)
    }

    pub fn perform_measurement<I>(&self, quantities: I) -> Result<MeasurementSet, LcrError>
    where
        I: IntoIterator<Item = Quantity>,
    {
        self.with(|client| client.perform_measurement(quantities))
    }

    pub fn read_measurement(&self) -> Result<MeasurementSet, LcrError> {
        self.with(|client| client.read_measurement())
    }

    pub fn set_verified(
        &self,
        command: &str,
        value: impl Into<super::client::ParamValue>,
        rounding: Option<u32>,
    ) -> Result<WriteConfirmation, LcrError> {
        self.with(|client| client.set_verified(command, value, rounding))
    }
}
