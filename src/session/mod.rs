//! Encoder-backed stream sessions
//!
//! A session is created per client request and never shared. The
//! [`StreamSupervisor`] spawns the external encoder against the source's
//! cached URL, gates on the first output chunk, and hands back a
//! [`SessionStream`]. Behind it a pump task relays chunks, restarts the
//! encoder after unexpected exits (up to a cap), and kills the encoder's
//! process group when the stream is dropped.
//!
//! ```text
//!   open_stream() ─► snapshot ─► permit ─► spawn ─► first chunk?
//!                                                     │
//!                        ┌────────────────────────────┘
//!                        ▼
//!                  [pump task] ── mpsc ──► SessionStream ──► HTTP body
//!                    │    ▲
//!              EOF / │    │ restart after backoff
//!              error ▼    │ (fresh snapshot)
//!                  terminate group
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod process;
pub mod state;
pub mod stream;
pub mod supervisor;

pub use config::{EncoderCommand, SupervisorConfig};
pub use error::SessionError;
pub use format::SinkFormat;
pub use process::EncoderProcess;
pub use state::{SessionEnd, SessionPhase, SessionState};
pub use stream::SessionStream;
pub use supervisor::StreamSupervisor;
