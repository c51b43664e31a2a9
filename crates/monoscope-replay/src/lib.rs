//! Replay event buffering and delivery.

pub mod buffer;
pub mod delivery;
pub mod payload;
pub mod recorder;
pub mod transport;

pub use buffer::{BufferLimits, EventBuffer, PushOutcome};
pub use delivery::{DeliveryController, DeliveryStats, FlushMode, FlushOutcome};
pub use payload::{ReplayEndpoint, ReplayPayload};
pub use recorder::{RecordOptions, Recorder, RecorderError, RecorderSink, RecordingHandle};
pub use transport::{BeaconTransport, HttpTransport, ReplayTransport, TransportError};
