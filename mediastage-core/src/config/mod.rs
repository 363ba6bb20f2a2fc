//! Configuration module for mediastage.
//!
//! Holds provisioner settings and their JSON persistence.

mod settings;

pub use settings::{
    load_config_from, save_config_to, IntegrityCheck, ProvisionerConfig, DEFAULT_RESOURCE_PREFIX,
    DEFAULT_TOOL_NAME, DEFAULT_VERSION_TAG,
};
