use tandem_bridge::BridgeError;
use thiserror::Error;

/// Errors raised synchronously by the coordinator.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The 2D stage cannot be driven by the bridge.
    #[error("renderer '{renderer}' does not conform: {reason}")]
    NonConformingRenderer {
        renderer: &'static str,
        reason: &'static str,
    },
    #[error("unknown effect kind '{0}' (expected scene, sprite or tertiary)")]
    UnknownEffectKind(String),
    #[error("{operation} failed: {source}")]
    Renderer {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    #[error("export pass failed: {0}")]
    Export(#[source] BridgeError),
    #[error("frame sink failed to finalize: {0}")]
    Finalize(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("audio reactivity is already connected")]
    AudioAlreadyConnected,
}

impl EngineError {
    pub(crate) fn renderer(operation: &'static str, err: anyhow::Error) -> Self {
        EngineError::Renderer {
            operation,
            source: err.into(),
        }
    }
}
