//! Admission queue and the caller-side admission handle.
//!
//! Each [`AdmissionRequest`] owns the sending half of a oneshot channel; the
//! caller holds the receiving half wrapped in an [`Admission`] future.
//! Dropping the `Admission` closes the channel, which the scheduler treats as
//! cancellation when the request reaches the head of the queue.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use k4_core::error::K4Error;
use tokio::sync::oneshot;

/// Proof of admission handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Admitted {
    /// Zero-based admission ordinal within the throttler.
    pub sequence: u64,
    /// Clock reading at the moment of admission.
    pub at_ms: f64,
    /// Cost charged for this admission.
    pub cost: f64,
}

/// A pending request: its cost and the handle to resolve once admitted.
#[derive(Debug)]
pub struct AdmissionRequest {
    cost: f64,
    completion: oneshot::Sender<Admitted>,
}

impl AdmissionRequest {
    pub fn new(cost: f64) -> (Self, Admission) {
        let (tx, rx) = oneshot::channel();
        (Self { cost, completion: tx }, Admission { rx })
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// The caller dropped or cancelled its [`Admission`].
    pub fn is_abandoned(&self) -> bool {
        self.completion.is_closed()
    }

    /// Resolve the caller's handle. Returns `false` if the caller went away
    /// in the meantime.
    pub fn resolve(self, sequence: u64, at_ms: f64) -> bool {
        let cost = self.cost;
        self.completion.send(Admitted { sequence, at_ms, cost }).is_ok()
    }
}

/// Strict FIFO of pending requests.
#[derive(Debug, Default)]
pub struct AdmissionQueue {
    pending: VecDeque<AdmissionRequest>,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: AdmissionRequest) {
        self.pending.push_back(request);
    }

    pub fn head(&self) -> Option<&AdmissionRequest> {
        self.pending.front()
    }

    pub fn pop(&mut self) -> Option<AdmissionRequest> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Future resolving once the scheduler admits the request.
///
/// Drop it (or call [`cancel`](Admission::cancel)) to abandon the request;
/// an abandoned request is discarded without being charged. Wrap it in
/// `tokio::time::timeout` for a caller-side deadline.
#[derive(Debug)]
#[must_use = "an admission does nothing unless awaited; dropping it cancels the request"]
pub struct Admission {
    rx: oneshot::Receiver<Admitted>,
}

impl Admission {
    /// Abandon the request explicitly.
    pub fn cancel(mut self) {
        self.rx.close();
    }
}

impl Future for Admission {
    type Output = Result<Admitted, K4Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|res| res.map_err(|_| K4Error::ThrottlerClosed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut q = AdmissionQueue::new();
        let mut handles = Vec::new();
        for cost in [1.0, 2.0, 3.0] {
            let (req, adm) = AdmissionRequest::new(cost);
            q.push(req);
            handles.push(adm);
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.head().map(|r| r.cost()), Some(1.0));
        assert_eq!(q.pop().map(|r| r.cost()), Some(1.0));
        assert_eq!(q.pop().map(|r| r.cost()), Some(2.0));
        assert_eq!(q.pop().map(|r| r.cost()), Some(3.0));
        assert!(q.is_empty());
    }

    #[test]
    fn dropped_handle_marks_abandoned() {
        let (req, adm) = AdmissionRequest::new(1.0);
        assert!(!req.is_abandoned());
        drop(adm);
        assert!(req.is_abandoned());
        assert!(!req.resolve(0, 0.0));
    }

    #[test]
    fn cancel_marks_abandoned() {
        let (req, adm) = AdmissionRequest::new(1.0);
        adm.cancel();
        assert!(req.is_abandoned());
    }

    #[tokio::test]
    async fn resolves_with_metadata() {
        let (req, adm) = AdmissionRequest::new(2.5);
        assert!(req.resolve(7, 123.0));
        let admitted = adm.await.unwrap();
        assert_eq!(admitted, Admitted { sequence: 7, at_ms: 123.0, cost: 2.5 });
    }

    #[tokio::test]
    async fn dropped_sender_is_an_error() {
        let (req, adm) = AdmissionRequest::new(1.0);
        drop(req);
        assert_eq!(adm.await, Err(K4Error::ThrottlerClosed));
    }
}
