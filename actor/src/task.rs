// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Cancellable tasks
//!
//! A handler is written as a sequence of explicit steps. The actor runner drives the steps one
//! at a time; between two steps it delivers new-message notifications and checks whether
//! cancellation was requested. A step that has started always runs to its end, so cancellation
//! is strictly cooperative.
//!

use crate::{Actor, ActorContext, Error};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use std::future::Future;

/// Result of running one step of a task.
#[derive(Debug)]
pub enum Step<R> {
    /// The task has more steps to run.
    Next,
    /// The task finished.
    Done(Result<R, Error>),
}

/// Handler body for one message, expressed as a sequence of steps.
///
/// Each call to `step` runs one step with exclusive access to the actor state. Implementors
/// usually keep a small stage field to know which step comes next.
///
/// ```ignore
/// struct OpenRoom { room: String, greeting: Option<String> }
///
/// #[async_trait]
/// impl Task<Switcher> for OpenRoom {
///     async fn step(&mut self, actor: &mut Switcher, ctx: &mut ActorContext<Switcher>) -> Step<()> {
///         match self.greeting.take() {
///             None => {
///                 self.greeting = Some(open(&self.room).await);
///                 Step::Next
///             }
///             Some(greeting) => {
///                 actor.notify(greeting);
///                 Step::Done(Ok(()))
///             }
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Task<A: Actor>: Send {
    /// Runs the next step.
    async fn step(
        &mut self,
        actor: &mut A,
        ctx: &mut ActorContext<A>,
    ) -> Step<A::Response>;
}

/// Boxed task, as returned by handlers.
pub type BoxedTask<A> = Box<dyn Task<A>>;

/// How a task settled.
#[derive(Debug, PartialEq)]
pub enum Outcome<R> {
    /// The task finished successfully.
    Ok(R),
    /// The task failed. The error is always a handler error.
    Err(Error),
    /// The task was cancelled before finishing.
    Cancelled,
}

impl<R> Outcome<R> {
    /// Converts the outcome into a result, mapping cancellation to `Error::Cancelled`.
    pub fn into_result(self) -> Result<R, Error> {
        match self {
            Outcome::Ok(value) => Ok(value),
            Outcome::Err(error) => Err(error),
            Outcome::Cancelled => Err(Error::Cancelled),
        }
    }
}

/// One handler invocation with a cancellation flag.
pub struct CancellableTask<A: Actor> {
    task: BoxedTask<A>,
    token: CancellationToken,
    settled: bool,
}

impl<A: Actor> CancellableTask<A> {
    /// Wraps a task.
    pub fn new(task: BoxedTask<A>) -> Self {
        Self {
            task,
            token: CancellationToken::new(),
            settled: false,
        }
    }

    /// Token observed by the task. Cancelling it has the same effect as `cancel`.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Requests cancellation. Idempotent; has no effect once the task settled.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once the task settled.
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Runs the next step unless cancellation was requested.
    ///
    /// Returns the outcome when the task settles, `None` when more steps remain. After the
    /// task settled, further calls return `None` without running anything.
    pub async fn advance(
        &mut self,
        actor: &mut A,
        ctx: &mut ActorContext<A>,
    ) -> Option<Outcome<A::Response>> {
        if self.settled {
            return None;
        }
        let outcome = if self.token.is_cancelled() {
            Outcome::Cancelled
        } else {
            match self.task.step(actor, ctx).await {
                Step::Next => return None,
                Step::Done(Ok(value)) => Outcome::Ok(value),
                Step::Done(Err(Error::Cancelled)) => Outcome::Cancelled,
                Step::Done(Err(error)) => {
                    Outcome::Err(error.into_handler_error())
                }
            }
        };
        self.settled = true;
        Some(outcome)
    }
}

/// Task that settles at its first step with the given result.
pub fn ready<A: Actor>(result: Result<A::Response, Error>) -> BoxedTask<A> {
    Box::new(Ready::<A::Response>(Some(result)))
}

struct Ready<R>(Option<Result<R, Error>>);

#[async_trait]
impl<A: Actor> Task<A> for Ready<A::Response> {
    async fn step(
        &mut self,
        _actor: &mut A,
        _ctx: &mut ActorContext<A>,
    ) -> Step<A::Response> {
        match self.0.take() {
            Some(result) => Step::Done(result),
            None => Step::Done(Err(Error::Handler(
                "task already settled".to_owned(),
            ))),
        }
    }
}

/// Task made of one step awaiting `future`, which does not touch the actor state.
pub fn from_future<A, F>(future: F) -> BoxedTask<A>
where
    A: Actor,
    F: Future<Output = Result<A::Response, Error>> + Send + 'static,
{
    Box::new(FromFuture(Some(Box::pin(future))))
}

type PinnedFuture<R> =
    std::pin::Pin<Box<dyn Future<Output = Result<R, Error>> + Send>>;

struct FromFuture<R>(Option<PinnedFuture<R>>);

#[async_trait]
impl<A: Actor> Task<A> for FromFuture<A::Response> {
    async fn step(
        &mut self,
        _actor: &mut A,
        _ctx: &mut ActorContext<A>,
    ) -> Step<A::Response> {
        match self.0.take() {
            Some(future) => Step::Done(future.await),
            None => Step::Done(Err(Error::Handler(
                "task already settled".to_owned(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use crate::{ActorSystem, Address, Config, Handler, Message};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Tick;

    impl Message for Tick {
        fn message_type(&self) -> &'static str {
            "tick"
        }
    }

    #[derive(Default)]
    struct Ticker {
        ticks: u32,
    }

    #[async_trait]
    impl Actor for Ticker {
        type Message = Tick;
        type Response = u32;
    }

    impl Handler<Ticker> for Ticker {
        fn handle_message(
            &mut self,
            _sender: Option<Address>,
            _msg: Tick,
            _ctx: &mut ActorContext<Ticker>,
        ) -> BoxedTask<Ticker> {
            Box::new(Ticks { remaining: 2 })
        }
    }

    struct Ticks {
        remaining: u32,
    }

    #[async_trait]
    impl Task<Ticker> for Ticks {
        async fn step(
            &mut self,
            actor: &mut Ticker,
            _ctx: &mut ActorContext<Ticker>,
        ) -> Step<u32> {
            if self.remaining == 0 {
                return Step::Done(Ok(actor.ticks));
            }
            self.remaining -= 1;
            actor.ticks += 1;
            Step::Next
        }
    }

    fn context() -> ActorContext<Ticker> {
        let (system, _runner) = ActorSystem::create(
            "test",
            Config::default(),
            CancellationToken::new(),
        );
        ActorContext::new(Address::new("test", "ticker"), system)
    }

    #[tokio::test]
    async fn test_task_runs_every_step() {
        let mut actor = Ticker::default();
        let mut ctx = context();
        let mut task = CancellableTask::new(Box::new(Ticks { remaining: 2 }));
        assert_eq!(task.advance(&mut actor, &mut ctx).await, None);
        assert_eq!(task.advance(&mut actor, &mut ctx).await, None);
        assert_eq!(
            task.advance(&mut actor, &mut ctx).await,
            Some(Outcome::Ok(2))
        );
        assert!(task.is_settled());
        assert_eq!(task.advance(&mut actor, &mut ctx).await, None);
    }

    #[tokio::test]
    async fn test_cancel_stops_before_next_step() {
        let mut actor = Ticker::default();
        let mut ctx = context();
        let mut task = CancellableTask::new(Box::new(Ticks { remaining: 2 }));
        assert_eq!(task.advance(&mut actor, &mut ctx).await, None);
        task.cancel();
        task.cancel();
        assert_eq!(
            task.advance(&mut actor, &mut ctx).await,
            Some(Outcome::Cancelled)
        );
        assert_eq!(actor.ticks, 1);
        task.cancel();
        assert_eq!(task.advance(&mut actor, &mut ctx).await, None);
    }

    #[tokio::test]
    async fn test_errors_settle_as_handler_errors() {
        let mut actor = Ticker::default();
        let mut ctx = context();

        let mut task: CancellableTask<Ticker> =
            CancellableTask::new(ready(Err(Error::Timeout)));
        assert_eq!(
            task.advance(&mut actor, &mut ctx).await,
            Some(Outcome::Err(Error::Handler(Error::Timeout.to_string())))
        );

        let mut task: CancellableTask<Ticker> =
            CancellableTask::new(ready(Err(Error::Cancelled)));
        assert_eq!(
            task.advance(&mut actor, &mut ctx).await,
            Some(Outcome::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_from_future_settles_with_its_output() {
        let mut actor = Ticker::default();
        let mut ctx = context();
        let mut task: CancellableTask<Ticker> =
            CancellableTask::new(from_future(async { Ok(7) }));
        assert_eq!(
            task.advance(&mut actor, &mut ctx).await,
            Some(Outcome::Ok(7))
        );
        assert_eq!(Outcome::<u32>::Cancelled.into_result(), Err(Error::Cancelled));
    }
}
