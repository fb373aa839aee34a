use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

use crate::errors::WebDAVError;

/// Fraction value reported when the transfer size is unknown
pub const INDETERMINATE: f64 = -1.0;

/// When a progress stream stops yielding.
///
/// A transfer that fails before its response body has been read never
/// reaches `done`, so waiting for completion alone can leave a consumer
/// waiting on a transfer that is already over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressTermination {
    /// Errors are reported in-band and the stream keeps going until the
    /// download completes or the transport has nothing more to report
    DownloadComplete,
    /// Like `DownloadComplete`, but the stream also ends right after the
    /// first snapshot carrying an error
    #[default]
    CompleteOrError,
}

/// One observation of an in-flight transfer
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Upload fraction in `[0, 1]`, or [`INDETERMINATE`]
    pub upload: f64,
    /// Download fraction in `[0, 1]`, or [`INDETERMINATE`]
    pub download: f64,
    /// Set on the final snapshot of a completed transfer
    pub done: bool,
    pub error: Option<Arc<WebDAVError>>,
    pub handle: TransferHandle,
}

impl TransferProgress {
    pub(crate) fn initial(handle: TransferHandle) -> Self {
        Self {
            upload: 0.0,
            download: 0.0,
            done: false,
            error: None,
            handle,
        }
    }

    pub fn upload_fraction(&self) -> Option<f64> {
        known_fraction(self.upload)
    }

    pub fn download_fraction(&self) -> Option<f64> {
        known_fraction(self.download)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

fn known_fraction(value: f64) -> Option<f64> {
    if value < 0.0 {
        None
    } else {
        Some(value)
    }
}

/// Handle on the request behind a progress stream.
///
/// Cheap to clone; every snapshot of a transfer carries the same handle.
#[derive(Debug, Clone, Default)]
pub struct TransferHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug, Default)]
struct HandleInner {
    cancel: CancellationToken,
    status: OnceLock<u16>,
    body: OnceLock<Bytes>,
}

impl TransferHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Cancels the transfer. The stream reports it as an aborted error.
    pub fn abort(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// HTTP status of the response, once headers have arrived
    pub fn status(&self) -> Option<u16> {
        self.inner.status.get().copied()
    }

    /// The complete response body, once the download has finished
    pub fn response_body(&self) -> Option<&Bytes> {
        self.inner.body.get()
    }

    /// The response body as text, replacing invalid UTF-8 sequences
    pub fn response_text(&self) -> Option<String> {
        self.response_body()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub(crate) fn set_status(&self, status: u16) {
        let _ = self.inner.status.set(status);
    }

    pub(crate) fn set_body(&self, body: Bytes) {
        let _ = self.inner.body.set(body);
    }
}
