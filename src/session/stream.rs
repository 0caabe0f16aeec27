//! Client side of a stream session

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;

use super::error::SessionError;
use super::state::SessionState;

/// Byte chunks produced by a supervised encoder
///
/// Dropping the stream is the disconnect signal: the pump task notices the
/// closed channel and tears the encoder group down.
pub struct SessionStream {
    chunks: ReceiverStream<Result<Bytes, SessionError>>,
    content_type: &'static str,
    state: watch::Receiver<SessionState>,
}

impl SessionStream {
    pub(crate) fn new(
        rx: mpsc::Receiver<Result<Bytes, SessionError>>,
        content_type: &'static str,
        state: watch::Receiver<SessionState>,
    ) -> Self {
        Self {
            chunks: ReceiverStream::new(rx),
            content_type,
            state,
        }
    }

    /// HTTP content type of the chunks
    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    /// Copy of the current session state
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Session id
    pub fn id(&self) -> u64 {
        self.state.borrow().id
    }

    /// Watch handle on the session state
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }
}

impl Stream for SessionStream {
    type Item = Result<Bytes, SessionError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().chunks).poll_next(cx)
    }
}

impl std::fmt::Debug for SessionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStream")
            .field("id", &self.id())
            .field("content_type", &self.content_type)
            .finish()
    }
}
