use super::cache::{Cached, ParameterCache};
use super::protocol;
use super::transport::{ConnectionConfig, TcpTransport, Transport};
use crate::error::LcrError;
use log::debug;
use std::time::Duration;

pub mod common;
pub mod measurement;
pub mod parameters;
pub mod verified;

pub use common::{Identity, SelfTest, SessionOptions};
pub use verified::{DelayEscalation, ParamValue, VerifyPolicy, WriteConfirmation};

/// Default LAN command port of the IM3536
pub const DEFAULT_PORT: u16 = 3500;

/// Builder for constructing a TCP-connected [`LcrClient`].
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use rusty_lcr::LcrClient;
///
/// let client = LcrClient::builder()
///     .address("192.168.1.1")
///     .port(3500)
///     .read_timeout(Duration::from_secs(30))
///     .build()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Default)]
pub struct LcrClientBuilder {
    address: Option<String>,
    port: Option<u16>,
    config: ConnectionConfig,
    policy: VerifyPolicy,
}

impl LcrClientBuilder {
    pub fn address(mut self, addr: &str) -> Self {
        self.address = Some(addr.to_string());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the full connection configuration
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Default retry policy for verified parameter writes
    pub fn verify_policy(mut self, policy: VerifyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Result<LcrClient<TcpTransport>, LcrError> {
        let address = self
            .address
            .ok_or_else(|| LcrError::InvalidCommand("Address must be specified".to_string()))?;
        let port = self.port.unwrap_or(DEFAULT_PORT);

        let transport = TcpTransport::connect(&address, port, &self.config)?;
        debug!("Connected to instrument at {address}:{port}");

        Ok(LcrClient::with_transport(transport).with_policy(self.policy))
    }
}

/// Session with one IM3536 LCR meter.
///
/// Every operation is a blocking round trip; the client must not be used
/// from more than one place at a time (see [`SharedClient`](crate::SharedClient)
/// for a lock-guarded handle).
///
/// ```no_run
/// use rusty_lcr::{LcrClient, Quantity};
///
/// let mut client = LcrClient::new("192.168.1.1", 3500)?;
/// client.set_frequency(10_000.0)?;
///
/// let values = client.perform_measurement([Quantity::Impedance, Quantity::ImpedancePhaseAngle])?;
/// println!("|Z| = {:?}", values.get(Quantity::Impedance));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct LcrClient<T: Transport = TcpTransport> {
    transport: T,
    policy: VerifyPolicy,
    cache: ParameterCache,
}

impl LcrClient<TcpTransport> {
    pub fn new(addr: &str, port: u16) -> Result<Self, LcrError> {
        Self::builder().address(addr).port(port).build()
    }

    pub fn builder() -> LcrClientBuilder {
        LcrClientBuilder::default()
    }
}

impl<T: Transport> LcrClient<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            policy: VerifyPolicy::default(),
            cache: ParameterCache::default(),
        }
    }

    pub fn with_policy(mut self, policy: VerifyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &VerifyPolicy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: VerifyPolicy) {
        self.policy = policy;
    }

    pub fn cache(&self) -> &ParameterCache {
        &self.cache
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Send a raw command line.
    pub fn write(&mut self, command: &str) -> Result<(), LcrError> {
        debug!(">> {command}");
        self.transport.write(command)
    }

    /// Send a raw query and return the trimmed reply.
    pub fn ask(&mut self, command: &str) -> Result<String, LcrError> {
        debug!(">> {command}");
        let reply = self.transport.ask(command)?;
        debug!("<< {reply}");
        Ok(reply.trim().to_string())
    }

    /// Return the cached value, or query `command?` and cache the parsed reply.
    fn cached_or_query<V, F>(
        &mut self,
        field: fn(&mut ParameterCache) -> &mut Cached<V>,
        command: &str,
        parse: F,
    ) -> Result<V, LcrError>
    where
        V: Clone,
        F: Fn(&str) -> Option<V>,
    {
        if let Some(value) = field(&mut self.cache).get() {
            return Ok(value.clone());
        }

        let reply = self.ask(&protocol::query(command))?;
        let value = parse(&reply).ok_or_else(|| protocol::invalid_response(command, &reply))?;
        field(&mut self.cache).set(value.clone());
        Ok(value)
    }
}
