//! Gateway shared state.

use std::sync::Arc;

use voxrelay_core::config::{Config, SessionConfig};
use voxrelay_media::speech::{SpeechAdapter, Synthesizer};
use voxrelay_media::transmit::ChunkTransmitter;
use voxrelay_providers::Generator;

use crate::registry::SessionRegistry;

/// Shared gateway state accessible from all connections and handlers.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub registry: SessionRegistry,
    pub generator: Arc<dyn Generator>,
    pub speech: SpeechAdapter,
    pub settings: SessionConfig,
}

impl GatewayState {
    pub fn new(
        config: Arc<Config>,
        generator: Arc<dyn Generator>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        let settings = config.session();
        Self {
            config,
            registry: SessionRegistry::new(),
            generator,
            speech: SpeechAdapter::new(synthesizer),
            settings,
        }
    }

    /// Transmitter configured from the session settings.
    pub fn transmitter(&self) -> ChunkTransmitter {
        ChunkTransmitter::new(self.settings.chunk_size, self.settings.chunk_pacing())
    }
}
