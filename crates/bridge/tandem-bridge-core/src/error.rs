use thiserror::Error;

/// Errors surfaced synchronously by the bridge.
///
/// Hook and callback faults are never returned here; they are logged and the
/// frame continues.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("unknown hook set '{0}' (expected onBeforeUpdate, onUpdate or onAfterUpdate)")]
    UnknownHookSet(String),
    #[error("an external ticker is already attached")]
    TickerAlreadyAttached,
    #[error("frame progress failed at frame {frame}: {source}")]
    Progress {
        /// 1-based index of the frame whose progress callback failed.
        frame: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl BridgeError {
    pub(crate) fn progress(frame: u32, err: anyhow::Error) -> Self {
        BridgeError::Progress {
            frame,
            source: err.into(),
        }
    }
}
