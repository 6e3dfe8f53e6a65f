//! Owns the single active audio source and routes its chunks into the session.

use sentinel_audio::{AudioError, AudioSource, ChunkSink};
use std::sync::Arc;
use tracing::info;

/// At most one source feeds the sink at a time; switching stops the previous
/// source before the next one starts.
pub struct Monitor {
    sink: Arc<dyn ChunkSink>,
    active: Option<Box<dyn AudioSource>>,
}

impl Monitor {
    pub fn new(sink: Arc<dyn ChunkSink>) -> Self {
        Self { sink, active: None }
    }

    pub async fn switch_to(&mut self, mut source: Box<dyn AudioSource>) -> Result<(), AudioError> {
        self.stop().await;
        source.start(self.sink.clone()).await?;
        info!(source = source.name(), "Audio source active");
        self.active = Some(source);
        Ok(())
    }

    pub async fn stop(&mut self) {
        if let Some(mut source) = self.active.take() {
            source.stop().await;
            info!(source = source.name(), "Audio source stopped");
        }
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref().map(|source| source.name())
    }
}
