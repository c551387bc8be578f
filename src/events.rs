//! # Test Lifecycle Events and the Recorder Fan-Out
//!
//! Every test run produces a single ordered stream of lifecycle events:
//! the test starts, requests are dispatched and complete, and the test
//! ends. The scheduler is the sole producer; it pushes events into a
//! bounded channel (the event bus) and a drain loop invokes every
//! registered [`Recorder`] for each event, in registration order.
//!
//! The bus is bounded (`--buffer`) to cap memory. When recorders fall
//! behind, the scheduler blocks on the push rather than dropping events.
//!
//! ## Ordering guarantees
//!
//! - `StartTest` precedes all request events; `EndTest` follows all.
//! - A request's `StartRequest` is emitted strictly before its
//!   `EndRequest`, with the same `start` timestamp.
//! - Between distinct requests no ordering is guaranteed; a request
//!   dispatched later may complete first.
//! - Recorders observe events in bus insertion order.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::tester::RequestError;

/// Monotonic nanoseconds counted from the current test's epoch.
pub type Nanos = u64;

/// A lifecycle event emitted by the scheduler during a test.
///
/// `R` is the protocol request type and `S` the protocol response type;
/// the core never inspects either beyond handing them to recorders.
#[derive(Debug)]
pub enum Event<R, S> {
    /// The test is about to dispatch its first request. Recorders should
    /// reset any per-test state.
    StartTest,
    /// All requests have completed; `end` is the total elapsed time.
    EndTest {
        /// Test epoch offset, always zero.
        start: Nanos,
        /// Time at which the last request completed.
        end: Nanos,
    },
    /// Advisory: the scheduler is about to sleep before the next dispatch.
    Wait(Duration),
    /// A request has been handed to the executor.
    StartRequest {
        /// Dispatch time.
        time: Nanos,
        /// The request being executed.
        request: R,
    },
    /// A request has completed, successfully or not.
    EndRequest {
        /// Dispatch time of the matching `StartRequest`.
        start: Nanos,
        /// Completion time.
        end: Nanos,
        /// The executor's outcome. Errors are data, not test failures.
        outcome: Result<S, RequestError>,
    },
}

/// An event consumer invoked once per event, in registration order.
///
/// Recorders are plain state machines over the event stream; anything a
/// `FnMut(&Event<R, S>)` closure can express is a recorder.
pub trait Recorder<R, S>: Send {
    fn record(&mut self, event: &Event<R, S>);
}

impl<R, S, F> Recorder<R, S> for F
where
    F: FnMut(&Event<R, S>) + Send,
{
    fn record(&mut self, event: &Event<R, S>) {
        self(event)
    }
}

/// A recorder registered on the options and shared across tests.
pub type BoxRecorder<R, S> = Box<dyn Recorder<R, S>>;

/// Creates the bounded event bus for a single test.
pub fn bus<R, S>(buffer: usize) -> (mpsc::Sender<Event<R, S>>, mpsc::Receiver<Event<R, S>>) {
    mpsc::channel(buffer)
}

/// Drains the event bus, fanning each event out to the recorders in
/// order. Returns once the producer side has been dropped and all
/// buffered events have been delivered.
pub async fn record<R, S>(
    mut events: mpsc::Receiver<Event<R, S>>,
    recorders: &mut [&mut dyn Recorder<R, S>],
) {
    while let Some(event) = events.recv().await {
        for recorder in recorders.iter_mut() {
            recorder.record(&event);
        }
    }
}
