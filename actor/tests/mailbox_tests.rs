// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Mailbox ordering, single-flight execution and cancellation of local actors.

use actor::{
    Actor, ActorContext, ActorSystem, Address, BoxedTask, Config, Error,
    Handler, Message, Step, Task, task,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tracing_test::traced_test;

use std::time::Duration;

// Recorder: remembers the order in which its handlers ran.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RecorderMessage {
    Record(u32),
    Get,
    MaxActive,
}

impl Message for RecorderMessage {
    fn message_type(&self) -> &'static str {
        match self {
            RecorderMessage::Record(_) => "record",
            RecorderMessage::Get => "get",
            RecorderMessage::MaxActive => "max_active",
        }
    }
}

#[derive(Debug, Default)]
pub struct Recorder {
    seen: Vec<u32>,
    active: usize,
    max_active: usize,
}

#[async_trait]
impl Actor for Recorder {
    type Message = RecorderMessage;
    type Response = Vec<u32>;
}

struct RecordTask {
    value: u32,
    started: bool,
}

#[async_trait]
impl Task<Recorder> for RecordTask {
    async fn step(
        &mut self,
        actor: &mut Recorder,
        _ctx: &mut ActorContext<Recorder>,
    ) -> Step<Vec<u32>> {
        if !self.started {
            self.started = true;
            actor.active += 1;
            actor.max_active = actor.max_active.max(actor.active);
            tokio::time::sleep(Duration::from_millis(2)).await;
            return Step::Next;
        }
        actor.seen.push(self.value);
        actor.active -= 1;
        Step::Done(Ok(vec![]))
    }
}

impl Handler<Recorder> for Recorder {
    fn handle_message(
        &mut self,
        _sender: Option<Address>,
        msg: RecorderMessage,
        _ctx: &mut ActorContext<Recorder>,
    ) -> BoxedTask<Recorder> {
        match msg {
            RecorderMessage::Record(value) => Box::new(RecordTask {
                value,
                started: false,
            }),
            RecorderMessage::Get => task::ready(Ok(self.seen.clone())),
            RecorderMessage::MaxActive => {
                task::ready(Ok(vec![self.max_active as u32]))
            }
        }
    }
}

// Switcher: a newer room change supersedes the one in progress.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SwitcherMessage {
    ChangeRoom(String),
}

impl Message for SwitcherMessage {
    fn message_type(&self) -> &'static str {
        "change_room"
    }
}

pub struct Switcher {
    listener: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Actor for Switcher {
    type Message = SwitcherMessage;
    type Response = ();

    fn on_new_message(
        &mut self,
        message: &SwitcherMessage,
        _sender: Option<&Address>,
        ctx: &mut ActorContext<Self>,
    ) {
        let switching = matches!(
            ctx.current_message(),
            Some(SwitcherMessage::ChangeRoom(_))
        );
        if switching && message.message_type() == "change_room" {
            ctx.cancel_current_execution();
        }
    }
}

struct ChangeRoom {
    room: String,
    greeting: Option<String>,
}

#[async_trait]
impl Task<Switcher> for ChangeRoom {
    async fn step(
        &mut self,
        actor: &mut Switcher,
        ctx: &mut ActorContext<Switcher>,
    ) -> Step<()> {
        match self.greeting.take() {
            None => {
                if ctx.has_queued("change_room") {
                    return Step::Done(Err(Error::Handler(
                        "superseded".to_owned(),
                    )));
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
                self.greeting = Some(format!("Welcome to room {}", self.room));
                Step::Next
            }
            Some(greeting) => {
                let _ = actor.listener.send(greeting);
                Step::Done(Ok(()))
            }
        }
    }
}

impl Handler<Switcher> for Switcher {
    fn handle_message(
        &mut self,
        _sender: Option<Address>,
        msg: SwitcherMessage,
        _ctx: &mut ActorContext<Switcher>,
    ) -> BoxedTask<Switcher> {
        let SwitcherMessage::ChangeRoom(room) = msg;
        Box::new(ChangeRoom {
            room,
            greeting: None,
        })
    }
}

// Counter: asynchronous increment reported to a listener.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CounterMessage {
    Increment,
    Get,
    Fail,
    Timeout,
    Abort,
}

impl Message for CounterMessage {
    fn message_type(&self) -> &'static str {
        match self {
            CounterMessage::Increment => "increment",
            CounterMessage::Get => "get",
            CounterMessage::Fail => "fail",
            CounterMessage::Timeout => "timeout",
            CounterMessage::Abort => "abort",
        }
    }
}

pub struct Counter {
    counter: u64,
    listener: mpsc::UnboundedSender<u64>,
}

#[async_trait]
impl Actor for Counter {
    type Message = CounterMessage;
    type Response = u64;

    async fn post_stop(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        let _ = self.listener.send(u64::MAX);
        Ok(())
    }
}

struct Increment {
    next: Option<u64>,
}

#[async_trait]
impl Task<Counter> for Increment {
    async fn step(
        &mut self,
        actor: &mut Counter,
        _ctx: &mut ActorContext<Counter>,
    ) -> Step<u64> {
        match self.next.take() {
            None => {
                let current = actor.counter;
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.next = Some(current + 1);
                Step::Next
            }
            Some(next) => {
                actor.counter = next;
                let _ = actor.listener.send(next);
                Step::Done(Ok(next))
            }
        }
    }
}

impl Handler<Counter> for Counter {
    fn handle_message(
        &mut self,
        _sender: Option<Address>,
        msg: CounterMessage,
        _ctx: &mut ActorContext<Counter>,
    ) -> BoxedTask<Counter> {
        match msg {
            CounterMessage::Increment => Box::new(Increment { next: None }),
            CounterMessage::Get => task::ready(Ok(self.counter)),
            CounterMessage::Fail => {
                task::ready(Err(Error::Handler("boom".to_owned())))
            }
            CounterMessage::Timeout => task::ready(Err(Error::Timeout)),
            CounterMessage::Abort => task::ready(Err(Error::Cancelled)),
        }
    }
}

fn counter() -> (Counter, mpsc::UnboundedReceiver<u64>) {
    let (listener, receiver) = mpsc::unbounded_channel();
    (
        Counter {
            counter: 0,
            listener,
        },
        receiver,
    )
}

#[tokio::test]
async fn test_messages_from_one_sender_run_in_order() {
    let (system, _runner) =
        ActorSystem::create("local", Config::default(), CancellationToken::new());
    let recorder = system
        .create_actor("recorder", Recorder::default())
        .await
        .unwrap();

    for value in 1..=20 {
        recorder.tell(RecorderMessage::Record(value)).await.unwrap();
    }
    let seen = recorder.ask(RecorderMessage::Get).await.unwrap();
    assert_eq!(seen, (1..=20).collect::<Vec<u32>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_at_most_one_handler_runs_at_a_time() {
    let (system, _runner) =
        ActorSystem::create("local", Config::default(), CancellationToken::new());
    let recorder = system
        .create_actor("recorder", Recorder::default())
        .await
        .unwrap();

    let asks = (0..16).map(|value| {
        let recorder = recorder.clone();
        tokio::spawn(
            async move { recorder.ask(RecorderMessage::Record(value)).await },
        )
    });
    for result in futures::future::join_all(asks).await {
        assert_eq!(result.unwrap(), Ok(vec![]));
    }

    let max_active = recorder.ask(RecorderMessage::MaxActive).await.unwrap();
    assert_eq!(max_active, vec![1]);
    let seen = recorder.ask(RecorderMessage::Get).await.unwrap();
    assert_eq!(seen.len(), 16);
}

#[tokio::test]
async fn test_last_room_change_wins() {
    let (system, _runner) =
        ActorSystem::create("local", Config::default(), CancellationToken::new());
    let (listener, mut greetings) = mpsc::unbounded_channel();
    let switcher = system
        .create_actor("switcher", Switcher { listener })
        .await
        .unwrap();

    for room in ["one", "two", "three"] {
        switcher
            .tell(SwitcherMessage::ChangeRoom(room.to_owned()))
            .await
            .unwrap();
    }

    assert_eq!(
        greetings.recv().await,
        Some("Welcome to room three".to_owned())
    );
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(greetings.try_recv().is_err());
}

#[tokio::test]
#[traced_test]
async fn test_running_handler_is_cancelled_by_newer_message() {
    let (system, _runner) =
        ActorSystem::create("local", Config::default(), CancellationToken::new());
    let (listener, mut greetings) = mpsc::unbounded_channel();
    let switcher = system
        .create_actor("switcher", Switcher { listener })
        .await
        .unwrap();

    let first = switcher.clone();
    let first = tokio::spawn(async move {
        first
            .ask(SwitcherMessage::ChangeRoom("one".to_owned()))
            .await
    });
    // Let the first handler start its slow step.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = switcher
        .ask(SwitcherMessage::ChangeRoom("two".to_owned()))
        .await;

    assert_eq!(first.await.unwrap(), Err(Error::Cancelled));
    assert_eq!(second, Ok(()));
    assert_eq!(greetings.recv().await, Some("Welcome to room two".to_owned()));
    assert!(greetings.try_recv().is_err());
    assert!(logs_contain("Cancelling current execution of switcher@local"));
}

#[tokio::test]
async fn test_counter_increment_notifies_listener() {
    let (system, _runner) =
        ActorSystem::create("local", Config::default(), CancellationToken::new());
    let (actor, mut listener) = counter();
    let counter = system.create_actor("counter", actor).await.unwrap();

    counter.tell(CounterMessage::Increment).await.unwrap();
    assert_eq!(listener.recv().await, Some(1));
    assert_eq!(counter.ask(CounterMessage::Get).await, Ok(1));
}

#[tokio::test]
async fn test_handler_errors_and_cancellation_are_distinct() {
    let (system, _runner) =
        ActorSystem::create("local", Config::default(), CancellationToken::new());
    let (actor, _listener) = counter();
    let counter = system.create_actor("counter", actor).await.unwrap();

    assert_eq!(
        counter.ask(CounterMessage::Fail).await,
        Err(Error::Handler("boom".to_owned()))
    );
    assert_eq!(
        counter.ask(CounterMessage::Timeout).await,
        Err(Error::Handler(Error::Timeout.to_string()))
    );
    assert_eq!(counter.ask(CounterMessage::Abort).await, Err(Error::Cancelled));
    // The actor keeps working after failures.
    assert_eq!(counter.ask(CounterMessage::Get).await, Ok(0));
}

#[tokio::test]
async fn test_duplicate_address_is_rejected() {
    let (system, _runner) =
        ActorSystem::create("local", Config::default(), CancellationToken::new());
    let (first, _first_listener) = counter();
    let (second, _second_listener) = counter();
    let counter = system.create_actor("counter", first).await.unwrap();

    let result = system.create_actor("counter", second).await;
    assert_eq!(
        result.map(|_| ()),
        Err(Error::DuplicateAddress(Address::new("local", "counter")))
    );
    // The first actor is untouched.
    assert_eq!(counter.ask(CounterMessage::Get).await, Ok(0));
}

#[tokio::test]
async fn test_unknown_local_actor_is_unreachable() {
    let (system, _runner) =
        ActorSystem::create("local", Config::default(), CancellationToken::new());
    let ghost = system.actor_ref::<Counter>(Address::local("ghost"));
    assert_eq!(
        ghost.tell(CounterMessage::Increment).await,
        Err(Error::Unreachable(Address::local("ghost")))
    );
    assert_eq!(
        ghost.ask(CounterMessage::Get).await,
        Err(Error::Unreachable(Address::local("ghost")))
    );
}

#[tokio::test]
async fn test_ask_timeout_from_config() {
    let config = Config::default().with_ask_timeout(Duration::from_millis(30));
    let (system, _runner) =
        ActorSystem::create("local", config, CancellationToken::new());
    let (listener, _greetings) = mpsc::unbounded_channel();
    let switcher = system
        .create_actor("switcher", Switcher { listener })
        .await
        .unwrap();

    let result = switcher
        .ask(SwitcherMessage::ChangeRoom("one".to_owned()))
        .await;
    assert_eq!(result, Err(Error::Timeout));
}

#[tokio::test]
#[traced_test]
async fn test_stop_system_stops_actors() {
    let token = CancellationToken::new();
    let (system, mut runner) =
        ActorSystem::create("local", Config::default(), token.clone());
    let runner = tokio::spawn(async move { runner.run().await });
    let (actor, mut listener) = counter();
    let counter = system.create_actor("counter", actor).await.unwrap();

    system.stop_system();
    // post_stop reports through the listener.
    assert_eq!(listener.recv().await, Some(u64::MAX));
    runner.await.unwrap();

    assert!(token.is_cancelled());
    assert_eq!(
        counter.tell(CounterMessage::Increment).await,
        Err(Error::Unreachable(Address::new("local", "counter")))
    );
    assert!(logs_contain("Actor counter@local is stopped"));
    assert!(logs_contain("Actor system stopped."));
}

#[tokio::test]
#[traced_test]
async fn test_stop_system_rejects_queued_asks() {
    let (system, _runner) =
        ActorSystem::create("local", Config::default(), CancellationToken::new());
    let (actor, _listener) = counter();
    let counter = system.create_actor("counter", actor).await.unwrap();

    let running = counter.clone();
    let running =
        tokio::spawn(async move { running.ask(CounterMessage::Increment).await });
    tokio::time::sleep(Duration::from_millis(5)).await;
    let queued = counter.clone();
    let queued = tokio::spawn(async move { queued.ask(CounterMessage::Get).await });
    tokio::time::sleep(Duration::from_millis(5)).await;

    system.stop_system();
    // The running increment stops at its next step, the queued ask is answered.
    assert_eq!(running.await.unwrap(), Err(Error::Cancelled));
    assert_eq!(
        queued.await.unwrap(),
        Err(Error::Disconnected("local".to_owned()))
    );
    assert!(logs_contain("rejecting queued 'get'"));
}
