pub mod config;
pub mod correlator;
pub mod error;
pub mod hioki;
pub mod logger;
pub mod measurement_items;
pub mod quantity;
pub mod types;
pub mod utils;

pub use config::{load_config, load_config_or_default, AppConfig, InstrumentSettings};
pub use correlator::correlate;
pub use error::LcrError;
pub use hioki::client::{
    DelayEscalation, Identity, ParamValue, SelfTest, SessionOptions, VerifyPolicy,
    WriteConfirmation,
};
pub use hioki::{
    Cached, ConnectionConfig, LcrClient, LcrClientBuilder, ParameterCache, SharedClient,
    TcpTransport, Transport,
};
pub use logger::RecordLog;
pub use measurement_items::{decode, encode, encode_names};
pub use quantity::Quantity;
pub use types::{
    Averaging, CanonicalOrder, EnableMask, LevelMode, MeasurementMode, MeasurementRecord,
    MeasurementSet, Speed, Switch,
};
