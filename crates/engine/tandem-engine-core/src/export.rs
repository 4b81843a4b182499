//! Deterministic export plumbing between the bridge and a capture sink.

use serde::{Deserialize, Serialize};
use tandem_bridge::{FrameInfo, FrameProgress};

/// One rendered frame handed to a [`FrameSink`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapturedFrame {
    /// 1-based position in the export pass.
    pub index: u32,
    pub frame: u64,
    pub time_ms: f64,
    pub delta_ms: f64,
    /// Tertiary effects are being reconstructed through fallback replay.
    pub fallback_active: bool,
}

/// Consumer of exported frames (compositor, encoder, muxer).
///
/// `capture` may take as long as it likes; the next frame is not rendered
/// until it completes.
#[allow(async_fn_in_trait)]
pub trait FrameSink {
    async fn capture(&mut self, frame: CapturedFrame) -> anyhow::Result<()>;

    async fn finalize(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub frames: u32,
    /// Simulation time covered by the pass.
    pub duration_ms: f64,
    pub fallback_used: bool,
}

pub(crate) struct SinkProgress<'a, S> {
    pub(crate) sink: &'a mut S,
    pub(crate) fallback_active: bool,
}

impl<S: FrameSink> FrameProgress for SinkProgress<'_, S> {
    async fn on_frame(&mut self, index: u32, frame: FrameInfo) -> anyhow::Result<()> {
        log::debug!("captured frame {index} at {:.3} ms", frame.time_ms);
        self.sink
            .capture(CapturedFrame {
                index,
                frame: frame.frame,
                time_ms: frame.time_ms,
                delta_ms: frame.delta_ms,
                fallback_active: self.fallback_active,
            })
            .await
    }
}
