use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use netarch_core::{CompletionError, TextStream};

/// How a caller observes and interrupts a stream while it is drained.
#[derive(Clone, Debug, Default)]
pub struct StreamControl {
    pub cancel: CancellationToken,
    /// Receives every chunk as it arrives, for progressive rendering.
    pub progress: Option<mpsc::UnboundedSender<String>>,
}

impl StreamControl {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel, progress: None }
    }

    pub fn with_progress(mut self, progress: mpsc::UnboundedSender<String>) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Consume the stream to completion and return the concatenated text.
///
/// The first error item aborts the drain, as does the cancellation token.
/// Partial text is discarded in both cases.
pub async fn drain(mut stream: TextStream, control: &StreamControl) -> Result<String, CompletionError> {
    let mut text = String::new();
    let mut chunks = 0usize;
    loop {
        let next = tokio::select! {
            biased;
            () = control.cancel.cancelled() => {
                debug!(chunks, "stream drain cancelled");
                return Err(CompletionError::Cancelled);
            }
            next = stream.next() => next,
        };
        match next {
            Some(Ok(chunk)) => {
                chunks += 1;
                if let Some(progress) = &control.progress {
                    // A dropped receiver only means nobody is watching.
                    let _ = progress.send(chunk.clone());
                }
                text.push_str(&chunk);
            }
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }
    debug!(chunks, bytes = text.len(), "stream drained");
    Ok(text)
}
