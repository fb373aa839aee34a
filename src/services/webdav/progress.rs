//! Progress-reporting transfers.
//!
//! A transfer runs as its own task and publishes lifecycle events (progress,
//! load, error, abort) for the outbound and inbound body into a single-slot
//! watch channel. The slot only ever holds the latest state: the producer never
//! waits for the consumer, and a slow consumer skips straight to the most
//! recent observation.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH};
use reqwest::{Body, Client, Method};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};
use url::Url;

use crate::errors::WebDAVError;
use crate::models::{ProgressTermination, TransferHandle, TransferProgress, INDETERMINATE};

/// Size of the pieces a request body is handed to the HTTP layer in
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Asynchronous sequence of progress snapshots for one transfer
pub type ProgressStream = BoxStream<'static, TransferProgress>;

#[derive(Debug, Clone)]
struct TransferState {
    upload_complete: bool,
    download_complete: bool,
    upload: f64,
    download: f64,
    error: Option<Arc<WebDAVError>>,
}

impl TransferState {
    fn snapshot(&self, handle: &TransferHandle) -> TransferProgress {
        TransferProgress {
            upload: if self.upload_complete { 1.0 } else { self.upload },
            download: self.download,
            done: self.download_complete,
            error: self.error.clone(),
            handle: handle.clone(),
        }
    }
}

/// Producer side: every event replaces the slot content and wakes the consumer
#[derive(Clone)]
struct EventSink {
    tx: Arc<watch::Sender<TransferState>>,
}

impl EventSink {
    fn upload_progress(&self, fraction: f64) {
        self.tx.send_modify(|s| {
            s.upload = fraction;
            s.error = None;
        });
    }

    fn upload_load(&self) {
        self.tx.send_modify(|s| {
            s.upload_complete = true;
            s.upload = 1.0;
            s.error = None;
        });
    }

    fn download_progress(&self, fraction: f64) {
        self.tx.send_modify(|s| {
            s.download = fraction;
            s.error = None;
        });
    }

    fn download_load(&self, error: Option<WebDAVError>) {
        self.tx.send_modify(|s| {
            s.download_complete = true;
            s.download = 1.0;
            s.error = error.map(Arc::new);
        });
    }

    fn error(&self, error: WebDAVError) {
        self.tx.send_modify(|s| s.error = Some(Arc::new(error)));
    }
}

/// Everything needed to dispatch the request once the stream is first advanced
struct PendingRequest {
    client: Client,
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
}

enum Phase {
    Start(PendingRequest),
    Dispatch(PendingRequest),
    Running(watch::Receiver<TransferState>),
    Finished,
}

/// Builds the progress stream for one request.
///
/// The first item is an initial all-zero snapshot, yielded before the request
/// is sent. After that one snapshot is yielded per observed state change until
/// the download completes, or per `termination` after an error.
pub fn progress_stream(
    client: Client,
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
    termination: ProgressTermination,
) -> ProgressStream {
    let handle = TransferHandle::new();
    let pending = PendingRequest {
        client,
        method,
        url,
        headers,
        body,
    };

    stream::unfold(Phase::Start(pending), move |phase| {
        let handle = handle.clone();
        async move {
            match phase {
                Phase::Start(pending) => Some((
                    TransferProgress::initial(handle.clone()),
                    Phase::Dispatch(pending),
                )),
                Phase::Dispatch(pending) => {
                    let (tx, rx) = watch::channel(TransferState {
                        upload_complete: pending.body.is_none(),
                        download_complete: false,
                        upload: 0.0,
                        download: 0.0,
                        error: None,
                    });
                    let sink = EventSink { tx: Arc::new(tx) };
                    tokio::spawn(run_transfer(pending, sink, handle.clone()));
                    next_snapshot(rx, &handle, termination).await
                }
                Phase::Running(rx) => next_snapshot(rx, &handle, termination).await,
                Phase::Finished => None,
            }
        }
    })
    .boxed()
}

async fn next_snapshot(
    mut rx: watch::Receiver<TransferState>,
    handle: &TransferHandle,
    termination: ProgressTermination,
) -> Option<(TransferProgress, Phase)> {
    // Err means the transfer task is gone and nothing further will be reported
    rx.changed().await.ok()?;
    let state = rx.borrow_and_update().clone();
    let snapshot = state.snapshot(handle);

    let finished = state.download_complete
        || (termination == ProgressTermination::CompleteOrError && state.error.is_some());
    let next = if finished {
        Phase::Finished
    } else {
        Phase::Running(rx)
    };
    Some((snapshot, next))
}

async fn run_transfer(pending: PendingRequest, sink: EventSink, handle: TransferHandle) {
    let PendingRequest {
        client,
        method,
        url,
        mut headers,
        body,
    } = pending;

    debug!("📤 Starting {} transfer to: {}", method, url);

    let mut request = client.request(method.clone(), url.clone());
    if let Some(body) = body {
        let total = body.len();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(total));

        if total == 0 {
            sink.upload_load();
            request = request.body(body);
        } else {
            request = request.body(counting_body(body, sink.clone()));
        }
    }
    request = request.headers(headers);

    let response = tokio::select! {
        _ = handle.cancellation().cancelled() => {
            warn!("⛔ {} transfer to {} aborted before response", method, url);
            sink.error(WebDAVError::Aborted);
            return;
        }
        result = request.send() => result,
    };

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            warn!("❌ {} transfer to {} failed: {}", method, url, e);
            sink.error(WebDAVError::Http(e));
            return;
        }
    };

    let status = response.status();
    handle.set_status(status.as_u16());
    debug!("📥 {} transfer response: {}", method, status);

    // The server may answer before consuming the whole body
    if !sink.tx.borrow().upload_complete {
        sink.upload_load();
    }

    let failure = (!status.is_success()).then(|| WebDAVError::from_response(&response));
    let total = response.content_length();
    let mut received: u64 = 0;
    let mut buffer = BytesMut::new();
    let mut chunks = Box::pin(response.bytes_stream());

    loop {
        let chunk = tokio::select! {
            _ = handle.cancellation().cancelled() => {
                warn!("⛔ {} transfer from {} aborted after {} bytes", method, url, received);
                sink.error(WebDAVError::Aborted);
                return;
            }
            chunk = chunks.next() => chunk,
        };

        match chunk {
            Some(Ok(chunk)) => {
                received += chunk.len() as u64;
                buffer.extend_from_slice(&chunk);
                sink.download_progress(fraction(received, total));
            }
            Some(Err(e)) => {
                warn!("❌ {} transfer from {} failed after {} bytes: {}", method, url, received, e);
                sink.error(WebDAVError::Http(e));
                return;
            }
            None => break,
        }
    }

    debug!("✅ {} transfer complete: {} bytes received", method, received);
    handle.set_body(buffer.freeze());

    sink.download_load(failure);
}

/// Wraps an upload body so each chunk handed to the HTTP layer reports progress
fn counting_body(body: Bytes, sink: EventSink) -> Body {
    let total = body.len();
    let chunks: Vec<Bytes> = (0..total)
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| body.slice(start..(start + UPLOAD_CHUNK_SIZE).min(total)))
        .collect();

    let mut sent = 0usize;
    let chunks = stream::iter(chunks).map(move |chunk| {
        sent += chunk.len();
        if sent >= total {
            sink.upload_load();
        } else {
            sink.upload_progress(sent as f64 / total as f64);
        }
        Ok::<Bytes, std::io::Error>(chunk)
    });

    Body::wrap_stream(chunks)
}

fn fraction(done: u64, total: Option<u64>) -> f64 {
    match total {
        Some(0) => 1.0,
        Some(total) => (done as f64 / total as f64).min(1.0),
        None => INDETERMINATE,
    }
}
