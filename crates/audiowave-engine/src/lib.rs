//! Period-synchronized raw PCM capture and playback.
//!
//! A session moves headerless interleaved PCM between a file and a sound card
//! one period at a time. [`stream::run_session`] is the usual entry point:
//!
//! ```no_run
//! # #[cfg(target_os = "linux")]
//! # fn main() -> Result<(), audiowave_engine::StreamError> {
//! use audiowave_engine::{AlsaBackend, CancellationFlag, StreamSession, run_session};
//!
//! let cancel = CancellationFlag::new();
//! let session = StreamSession::capture("take.raw", 44_100, 16, 2);
//! let report = run_session(&session, &AlsaBackend, &cancel)?;
//! println!("{} frames", report.frames);
//! # Ok(())
//! # }
//! # #[cfg(not(target_os = "linux"))]
//! # fn main() {}
//! ```

#[cfg(target_os = "linux")]
pub mod alsa;
pub mod cancel;
pub mod config;
pub mod device;
pub mod error;
pub mod format;
pub mod mock;
pub mod negotiate;
pub mod report;
pub mod session;
pub mod stream;

/// Device used when none is named.
pub const DEFAULT_DEVICE: &str = "plughw:0,0";

#[cfg(target_os = "linux")]
pub use alsa::AlsaBackend;
pub use cancel::{CancellationFlag, install_interrupt_handler};
pub use config::NegotiationPolicy;
pub use device::{Direction, PcmBackend, PcmDevice};
pub use error::{ErrorKind, StreamError};
pub use format::{BitDepth, ByteOrder, HardwareFormat, SampleEncoding, resolve_format};
pub use negotiate::{NegotiatedParams, negotiate};
pub use report::{SessionReport, StopReason, format_elapsed};
pub use session::{SessionHandles, StreamSession, acquire};
pub use stream::{run, run_session};
