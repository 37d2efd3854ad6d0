//! # wop-optimizer
//!
//! Client side of a remote ask/tell optimization service.
//!
//! An [`OptimizationSession`] creates an optimization on the service, uploads
//! the observations told so far and polls for the next point to evaluate.
//! The solver itself runs remotely; this crate only carries the protocol,
//! the session state and the constraint-aware selection of the best
//! observed point.

mod filter;
mod http;
mod session;
mod transport;

pub use filter::{BestPoint, ConstraintFilter};
pub use http::{ClientConfig, HttpTransport, DEFAULT_BASE_URL};
pub use session::{AskResult, OptimizationSession, PollSettings, RemoteBest};
pub use transport::{Envelope, HistoryUpload, RemoteId, RemoteOutputs, Transport};
