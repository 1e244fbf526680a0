use super::LcrClient;
use crate::error::LcrError;
use crate::hioki::protocol::{self, invalid_response};
use crate::hioki::transport::Transport;
use log::info;
use serde::{Deserialize, Serialize};

/// Fields of the `*IDN?` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,
}

impl Identity {
    pub fn parse(reply: &str) -> Result<Self, LcrError> {
        let fields = protocol::split_fields(reply);
        match fields.as_slice() {
            [manufacturer, model, serial, firmware, ..] => Ok(Self {
                manufacturer: manufacturer.to_string(),
                model: model.to_string(),
                serial: serial.to_string(),
                firmware: firmware.to_string(),
            }),
            _ => Err(invalid_response(protocol::IDENTIFY, reply)),
        }
    }
}

/// Outcome of `*TST?`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfTest {
    pub code: i32,
    pub message: String,
}

impl SelfTest {
    pub fn passed(&self) -> bool {
        self.code == 0
    }
}

/// What [`LcrClient::initialize`] does when a session opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Check that the `*IDN?` model starts with `expected_model`
    pub id_query: bool,
    pub expected_model: String,
    /// Send `*RST`
    pub reset: bool,
    /// Send `:PRES` to return to the preset state
    pub preset: bool,
    /// Turn reply headers off so replies carry bare values
    pub disable_headers: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            id_query: true,
            expected_model: "IM3536".to_string(),
            reset: false,
            preset: true,
            disable_headers: true,
        }
    }
}

impl<T: Transport> LcrClient<T> {
    /// Bring a freshly opened session into a known state.
    pub fn initialize(&mut self, options: &SessionOptions) -> Result<(), LcrError> {
        if options.id_query {
            let identity = self.identify()?;
            if !identity.model.starts_with(&options.expected_model) {
                return Err(LcrError::IdentityMismatch {
                    expected: options.expected_model.clone(),
                    actual: identity.model,
                });
            }
            info!(
                "Connected to {} {} (firmware {})",
                identity.manufacturer, identity.model, identity.firmware
            );
        }

        if options.reset {
            self.reset()?;
        }

        if options.preset {
            self.preset()?;
        }

        if options.disable_headers {
            self.write(&format!("{} OFF", protocol::HEADER))?;
        }

        Ok(())
    }

    /// Query `*IDN?`, served from the cache once read.
    pub fn identify(&mut self) -> Result<Identity, LcrError> {
        self.cached_or_query(
            |c| &mut c.identity,
            protocol::IDENTIFY,
            |reply| Identity::parse(reply).ok(),
        )
    }

    /// `*RST`. Every cached parameter is forgotten.
    pub fn reset(&mut self) -> Result<(), LcrError> {
        self.write(protocol::RESET)?;
        self.write(protocol::CLEAR_STATUS)?;
        self.cache.invalidate_all();
        Ok(())
    }

    /// `:PRES`, the instrument's factory preset. Every cached parameter is forgotten.
    pub fn preset(&mut self) -> Result<(), LcrError> {
        self.write(protocol::PRESET)?;
        self.cache.invalidate_all();
        Ok(())
    }

    pub fn clear_status(&mut self) -> Result<(), LcrError> {
        self.write(protocol::CLEAR_STATUS)
    }

    /// Run `*TST?`; the instrument answers `0` on pass.
    pub fn self_test(&mut self) -> Result<SelfTest, LcrError> {
        let reply = self.ask(protocol::SELF_TEST)?;
        let code = protocol::split_fields(&reply)
            .first()
            .and_then(|field| field.parse::<i32>().ok())
            .ok_or_else(|| invalid_response(protocol::SELF_TEST, &reply))?;

        let message = if code == 0 {
            "Self test passed"
        } else {
            "Self test failed"
        };
        Ok(SelfTest {
            code,
            message: message.to_string(),
        })
    }

    /// Block until the instrument has finished processing earlier commands.
    ///
    /// Single `*OPC?` query; the only timeout is the transport's read timeout.
    pub fn wait_operation_complete(&mut self) -> Result<(), LcrError> {
        let reply = self.ask(protocol::OPERATION_COMPLETE)?;
        if reply == "1" {
            Ok(())
        } else {
            Err(invalid_response(protocol::OPERATION_COMPLETE, &reply))
        }
    }
}
