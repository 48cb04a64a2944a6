//! Built-in annotation source variants.
//!
//! | source id    | where it runs            | gate                   |
//! |--------------|--------------------------|------------------------|
//! | `local-model`| on device, larger model  | model downloaded       |
//! | `on-device`  | on device, patterns      | none                   |
//! | `cloud`      | remote annotation API    | network reachable      |
//! | `none`       | nowhere (no-op)          | explicit selection only|

pub mod cloud;
pub mod disabled;
pub mod local_model;
pub mod on_device;

pub use cloud::{CloudSource, CloudSourceConfig};
pub use disabled::DisabledSource;
pub use local_model::{
    decode_bio, InferenceBackend, LocalModelSource, ProcessBackend, ProcessBackendConfig,
    TokenPrediction,
};
pub use on_device::{Gazetteer, OnDeviceSource};

/// Source id of the on-device pattern model
pub const ON_DEVICE_ID: &str = "on-device";

/// Source id of the downloaded local model
pub const LOCAL_MODEL_ID: &str = "local-model";

/// Source id of the remote annotation API
pub const CLOUD_ID: &str = "cloud";

/// Source id of the no-op source
pub const DISABLED_ID: &str = "none";
