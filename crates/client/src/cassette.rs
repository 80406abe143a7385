//! Recorded HTTP interactions ("cassettes") for replaying API traffic in tests.

use crate::error::ApiError;
use crate::transport::{ApiRequest, ApiResponse, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub request: ApiRequest,
    pub response: ApiResponse,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cassette {
    #[serde(default)]
    pub interactions: Vec<Interaction>,
}

impl Cassette {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ApiError::Cassette(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ApiError> {
        serde_yaml::from_str(content)
            .map_err(|e| ApiError::Cassette(format!("Invalid cassette YAML: {}", e)))
    }

    pub fn to_yaml(&self) -> Result<String, ApiError> {
        serde_yaml::to_string(self)
            .map_err(|e| ApiError::Cassette(format!("Failed to encode cassette: {}", e)))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ApiError> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }
}

struct Slot {
    interaction: Interaction,
    played: bool,
}

/// Replays a cassette instead of talking to the network.
///
/// A request consumes the first unplayed interaction with the same method and
/// path. Request bodies are not compared.
pub struct CassetteTransport {
    slots: Mutex<Vec<Slot>>,
}

impl CassetteTransport {
    pub fn new(cassette: Cassette) -> Self {
        let slots = cassette
            .interactions
            .into_iter()
            .map(|interaction| Slot {
                interaction,
                played: false,
            })
            .collect();
        Self {
            slots: Mutex::new(slots),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        Ok(Self::new(Cassette::load(path)?))
    }

    /// Interactions not yet replayed.
    pub fn remaining(&self) -> usize {
        self.slots.lock().iter().filter(|slot| !slot.played).count()
    }
}

#[async_trait]
impl Transport for CassetteTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut slots = self.slots.lock();
        let slot = slots
            .iter_mut()
            .find(|slot| {
                !slot.played
                    && slot.interaction.request.method == request.method
                    && slot.interaction.request.path == request.path
            })
            .ok_or_else(|| {
                ApiError::Cassette(format!(
                    "No recorded interaction left for {} {}",
                    request.method, request.path
                ))
            })?;

        slot.played = true;
        debug!(
            "replayed {} {} -> {}",
            request.method, request.path, slot.interaction.response.status
        );
        Ok(slot.interaction.response.clone())
    }

    fn name(&self) -> &str {
        "cassette"
    }
}

/// Wraps a transport and records every completed exchange.
pub struct RecordingTransport<T> {
    inner: T,
    recorded: Mutex<Vec<Interaction>>,
}

impl<T: Transport> RecordingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            recorded: Mutex::new(Vec::new()),
        }
    }

    pub fn cassette(&self) -> Cassette {
        Cassette {
            interactions: self.recorded.lock().clone(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ApiError> {
        self.cassette().save(path)
    }
}

#[async_trait]
impl<T: Transport> Transport for RecordingTransport<T> {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let response = self.inner.execute(request.clone()).await?;
        self.recorded.lock().push(Interaction {
            request,
            response: response.clone(),
        });
        Ok(response)
    }

    fn name(&self) -> &str {
        "recording"
    }
}
