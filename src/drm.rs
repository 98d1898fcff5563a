//! Key provider interface
//!
//! License exchange and key derivation live outside this crate. The pipeline
//! only needs a [`KeyProvider`] that turns a selected stream into one content
//! key per track.

use crate::config::DrmConfig;
use crate::error::KeyError;
use crate::types::{DecryptionKeys, StreamInfo};
use async_trait::async_trait;
use std::path::PathBuf;

/// Device used for license requests
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceCredential {
    /// A device file supplied by the user
    File(PathBuf),
    /// The built-in default device shipped with the key provider
    BuiltinDefault,
}

/// Credentials handed to the key provider on every request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialContext {
    /// Device used for the license exchange
    pub device: DeviceCredential,
}

impl CredentialContext {
    /// Build from configuration
    ///
    /// Falling back to the built-in device is logged so it is never silent.
    pub fn from_config(config: &DrmConfig) -> Self {
        let device = match &config.device_path {
            Some(path) => DeviceCredential::File(path.clone()),
            None => {
                tracing::info!("no device file configured, using the built-in default device");
                DeviceCredential::BuiltinDefault
            }
        };
        Self { device }
    }

    /// Whether the built-in default device is in use
    pub fn is_builtin_default(&self) -> bool {
        self.device == DeviceCredential::BuiltinDefault
    }
}

/// Produces content keys for a stream
///
/// Implementations own the license exchange. Keys returned here are held
/// only until the item's decrypt step finishes.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Acquire keys for every track of `stream`
    async fn get_key(
        &self,
        stream: &StreamInfo,
        credentials: &CredentialContext,
    ) -> Result<DecryptionKeys, KeyError>;
}
