// Stream relay engine
//
// Takes the upstream byte stream, splits it into logical SSE lines, and
// produces the outbound frame stream: one re-framed `data:` frame per
// upstream payload, pass-through for everything else, and one summary
// frame covering the trailing window when upstream finishes.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::parser::{SseLine, SseLineParser};
use super::recent::RecentEvents;
use crate::envelope::Formatter;
use crate::forward::UpstreamError;

/// Carried into the outbound body stream when the upstream read fails
/// mid-relay. Surfaces to the client as abnormal stream termination —
/// once SSE headers are committed no JSON error body can follow.
#[derive(Debug, thiserror::Error)]
#[error("upstream stream failed: {0}")]
pub struct RelayError(pub String);

/// Drives one streaming proxy session: upstream bytes in, framed SSE out.
///
/// The parser state and the recent-event window live inside the pump task
/// and belong to exactly one session.
pub struct RelayEngine {
    formatter: Formatter,
    channel_capacity: usize,
}

impl RelayEngine {
    pub fn new(formatter: Formatter, channel_capacity: usize) -> Self {
        Self {
            formatter,
            channel_capacity,
        }
    }

    /// Spawn the pump task and return the outbound frame stream.
    ///
    /// Frames leave in the exact order their source lines were read; the
    /// bounded channel is the backpressure seam between the upstream read
    /// and the client write. A failed channel send means the client went
    /// away — the task returns, and dropping the upstream stream cancels
    /// the in-flight read.
    pub fn relay(
        &self,
        mut upstream: impl Stream<Item = Result<Bytes, UpstreamError>> + Unpin + Send + 'static,
    ) -> ReceiverStream<Result<Bytes, RelayError>> {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let formatter = self.formatter.clone();

        tokio::spawn(async move {
            let mut parser = SseLineParser::new();
            let mut recent = RecentEvents::new();

            while let Some(read) = upstream.next().await {
                let chunk = match read {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        tracing::warn!(error = %e, "upstream read failed mid-relay; aborting");
                        let _ = tx.send(Err(RelayError(e.to_string()))).await;
                        return;
                    }
                };

                for line in parser.feed(&chunk) {
                    if forward_line(line, &formatter, &mut recent, &tx).await.is_err() {
                        return; // client disconnected
                    }
                }
            }

            // Upstream end-of-data: one summary frame over the trailing
            // window, then close. An empty window emits nothing extra.
            if !recent.is_empty() {
                let envelope = formatter.final_chunk(&recent.snapshot());
                match serde_json::to_string(&envelope) {
                    Ok(json) => {
                        let _ = tx.send(Ok(data_frame(&json))).await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to format summary frame");
                    }
                }
            }
        });

        ReceiverStream::new(rx)
    }
}

/// Emit one outbound frame for one upstream line.
///
/// Err means the receiving side is gone and the relay must stop.
async fn forward_line(
    line: SseLine,
    formatter: &Formatter,
    recent: &mut RecentEvents,
    tx: &mpsc::Sender<Result<Bytes, RelayError>>,
) -> Result<(), ()> {
    match line {
        SseLine::Data(payload) => {
            recent.push(payload.clone());
            let envelope = formatter.chunk(&payload);
            match serde_json::to_string(&envelope) {
                Ok(json) => tx.send(Ok(data_frame(&json))).await.map_err(|_| ()),
                Err(e) => {
                    // One bad event never ends the relay.
                    tracing::warn!(error = %e, "failed to format stream event; skipping");
                    Ok(())
                }
            }
        }
        SseLine::Other(raw) => tx
            .send(Ok(Bytes::from(format!("{raw}\n"))))
            .await
            .map_err(|_| ()),
    }
}

fn data_frame(json: &str) -> Bytes {
    Bytes::from(format!("data: {json}\n\n"))
}
