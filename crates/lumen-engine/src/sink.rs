use lumen_core::PixelBuffer;

/// Where finished frames and failures go.
///
/// Implementations are called from worker tasks, never from the thread
/// that issued the request. A frame is delivered at most once per
/// request; superseded and cancelled requests deliver nothing.
pub trait DisplaySink: Send + Sync {
    fn on_frame(&self, frame: PixelBuffer);

    /// Called once per failed request. The previously displayed frame
    /// remains valid; sinks should keep showing it.
    fn on_error(&self, message: &str);
}
