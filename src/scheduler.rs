//! # Request Scheduler
//!
//! Turns a desired load level into an actual stream of dispatched
//! requests, in one of two disciplines:
//!
//! - **Throughput** ([`run_throughput`]): a rate-paced loop. The runner
//!   materialises a finite request stream; the dispatcher sleeps by one
//!   interval draw per request, then executes it on a freshly spawned
//!   task. The call returns once every dispatched request has completed.
//! - **Concurrency** ([`run_concurrency`]): a semaphore-bounded loop
//!   over an unbounded request stream. Exactly as many requests as the
//!   semaphore holds tokens are in flight; the stream is closed by the
//!   runner's duration timer, after which in-flight requests drain
//!   naturally.
//!
//! Each dispatched request records `StartRequest` before and
//! `EndRequest` after the executor call. Executor errors are recorded,
//! never propagated; a test cannot be aborted by its own requests.

use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::events::{Event, Nanos};
use crate::intervals::IntervalGenerator;
use crate::semaphore::WorkerSemaphore;
use crate::tester::Executor;

/// Monotonic clock anchored at the test epoch.
#[derive(Clone, Copy, Debug)]
pub struct TestClock {
    epoch: Instant,
}

impl TestClock {
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Nanoseconds elapsed since the epoch.
    pub fn now(&self) -> Nanos {
        self.epoch.elapsed().as_nanos() as Nanos
    }
}

/// Runs the rate-paced dispatch loop over a finite request stream.
///
/// Consumes `requests` until the producer closes it, pacing dispatches
/// with `intervals`. Returns once all spawned requests have completed
/// and the terminal `EndTest` event has been pushed.
pub async fn run_throughput<R, S>(
    mut intervals: IntervalGenerator,
    mut requests: mpsc::Receiver<R>,
    executor: Executor<R, S>,
    events: mpsc::Sender<Event<R, S>>,
) where
    R: Clone + Send + Sync + 'static,
    S: Send + Sync + 'static,
{
    let clock = TestClock::start();
    events.send(Event::StartTest).await.ok();

    let mut tasks = JoinSet::new();
    while let Some(request) = requests.recv().await {
        let wait = intervals.next_interval();
        events.send(Event::Wait(wait)).await.ok();
        tokio::time::sleep(wait).await;
        tasks.spawn(dispatch(
            clock,
            request,
            executor.clone(),
            events.clone(),
        ));
    }

    while tasks.join_next().await.is_some() {}
    events
        .send(Event::EndTest {
            start: 0,
            end: clock.now(),
        })
        .await
        .ok();
}

/// Runs the semaphore-bounded dispatch loop over an unbounded request
/// stream.
///
/// Each dispatch first acquires a worker token and returns it on
/// completion, so the number of in-flight executor calls never exceeds
/// the signalled token count. Returns once the request stream closes
/// and the in-flight tail has drained.
pub async fn run_concurrency<R, S>(
    semaphore: WorkerSemaphore,
    mut requests: mpsc::Receiver<R>,
    executor: Executor<R, S>,
    events: mpsc::Sender<Event<R, S>>,
) where
    R: Clone + Send + Sync + 'static,
    S: Send + Sync + 'static,
{
    let clock = TestClock::start();
    events.send(Event::StartTest).await.ok();

    let mut tasks = JoinSet::new();
    loop {
        semaphore.acquire().await;
        let Some(request) = requests.recv().await else {
            // Closed stream; the token we hold is no longer needed.
            break;
        };
        let semaphore = semaphore.clone();
        let executor = executor.clone();
        let events = events.clone();
        tasks.spawn(async move {
            dispatch(clock, request, executor, events).await;
            semaphore.release();
        });
    }

    while tasks.join_next().await.is_some() {}
    events
        .send(Event::EndTest {
            start: 0,
            end: clock.now(),
        })
        .await
        .ok();
}

/// Executes one request, bracketing it with its lifecycle events.
async fn dispatch<R, S>(
    clock: TestClock,
    request: R,
    executor: Executor<R, S>,
    events: mpsc::Sender<Event<R, S>>,
) where
    R: Clone + Send + Sync + 'static,
    S: Send + Sync + 'static,
{
    let start = clock.now();
    events
        .send(Event::StartRequest {
            time: start,
            request: request.clone(),
        })
        .await
        .ok();
    let outcome = executor.execute(clock.now(), request).await;
    events
        .send(Event::EndRequest {
            start,
            end: clock.now(),
            outcome,
        })
        .await
        .ok();
}
