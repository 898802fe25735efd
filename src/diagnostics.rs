//! Structured, non-fatal run observations and the event-callback hook.
//!
//! `log` covers free-text diagnostics aimed at a human reading a log
//! stream; [`Diagnostics`] covers the subset of those observations a caller
//! needs to branch on programmatically (e.g. "did PCA fall back to an
//! identity rotation because the cloud was planar?").

use serde_derive::{Deserialize, Serialize};

/// Machine-checkable flags raised during a [`crate::registration::register`]
/// call. All fields default to `false`/empty on a clean run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// PCA's covariance eigenvalues were too close together (or too close to
    /// zero) to fix a unique coarse-alignment basis; an identity rotation
    /// was used instead.
    pub degenerate_axes: bool,
    /// RANSAC never reached `target_inlier_ratio` within `max_iterations`
    /// and returned its best hypothesis found so far.
    pub ransac_exhausted: bool,
    /// ICP stopped because `max_iterations` was reached rather than because
    /// the convergence tolerance was satisfied.
    pub icp_hit_iteration_cap: bool,
    /// The registration call observed a cancelled [`crate::cancel::CancelToken`]
    /// and returned the best result found before the cancellation point.
    pub cancelled: bool,
}

/// A caller-supplied callback for structured per-stage events, invoked in
/// addition to (not instead of) the crate's `log` output. Intended for
/// callers that want to stream ICP iteration traces to something other than
/// a log sink, e.g. a UI progress bar.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: Event);
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    PcaCompleted { degenerate_axes: bool },
    RansacIteration { iteration: usize, inlier_count: usize },
    IcpIteration { iteration: usize, rmse: f64 },
    Converged { iterations: usize },
}

/// An [`EventSink`] that discards every event; the default when a caller
/// passes no sink.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn on_event(&self, _event: Event) {}
}
