// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Cross-system messaging over TCP sockets.

use actor::{
    Actor, ActorContext, ActorRef, ActorSystem, Address, BoxedTask, Config,
    Error, FixedIntervalStrategy, Handler, Message, NoIntervalStrategy,
    SystemEvent, SystemRef, TransportState, task, tcp,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Echo(String);

impl Message for Echo {
    fn message_type(&self) -> &'static str {
        "echo"
    }
}

pub struct EchoActor;

#[async_trait]
impl Actor for EchoActor {
    type Message = Echo;
    type Response = String;
}

impl Handler<EchoActor> for EchoActor {
    fn handle_message(
        &mut self,
        _sender: Option<Address>,
        msg: Echo,
        _ctx: &mut ActorContext<EchoActor>,
    ) -> BoxedTask<EchoActor> {
        task::ready(Ok(format!("echo: {}", msg.0)))
    }
}

async fn echo_server(address: &str) -> (SystemRef, CancellationToken) {
    let token = CancellationToken::new();
    let (server, _) =
        ActorSystem::create("server", Config::default(), token.clone());
    server.create_actor("echo", EchoActor).await.unwrap();
    let listener = tcp::bind(address).await.unwrap();
    tcp::serve(server.clone(), listener);
    (server, token)
}

#[tokio::test]
async fn test_ask_over_tcp() {
    let server_token = CancellationToken::new();
    let (server, mut server_runner) =
        ActorSystem::create("server", Config::default(), server_token.clone());
    server.create_actor("echo", EchoActor).await.unwrap();
    let listener = tcp::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let serving = tcp::serve(server.clone(), listener);

    let (client, _) =
        ActorSystem::create("client", Config::default(), CancellationToken::new());
    let channel = tcp::connect(&address, Box::new(NoIntervalStrategy::new(0)))
        .await
        .unwrap();
    let transport = client.register(channel);
    tokio::time::timeout(Duration::from_secs(5), transport.wait_open())
        .await
        .unwrap();
    assert_eq!(transport.peer_system_name(), Some("server"));
    assert_eq!(
        server_runner.next_event().await,
        Some(SystemEvent::PeerConnected("client".to_owned()))
    );

    let echo: ActorRef<EchoActor> =
        client.actor_ref(Address::new("server", "echo"));
    assert_eq!(
        echo.ask(Echo("hello".to_owned())).await,
        Ok("echo: hello".to_owned())
    );

    // Stopping the server drops the connection.
    server_token.cancel();
    serving.await.unwrap();
    tokio::time::timeout(
        Duration::from_secs(5),
        transport.wait_state(TransportState::Closed),
    )
    .await
    .unwrap();
    assert_eq!(
        echo.tell(Echo("bye".to_owned())).await,
        Err(Error::Unreachable(Address::new("server", "echo")))
    );
}

#[tokio::test]
async fn test_connect_to_closed_port_fails() {
    let listener = tcp::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);
    let result =
        tcp::connect(&address, Box::new(NoIntervalStrategy::new(0))).await;
    assert!(matches!(result, Err(Error::Transport(_))));
}

#[tokio::test]
async fn test_client_reconnects_to_restarted_server() {
    let listener = tcp::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);
    let (_first, first_token) = echo_server(&address).await;

    let (client, _) =
        ActorSystem::create("client", Config::default(), CancellationToken::new());
    let channel = tcp::connect(
        &address,
        Box::new(FixedIntervalStrategy::new(100, Duration::from_millis(20))),
    )
    .await
    .unwrap();
    let transport = client.register(channel);
    tokio::time::timeout(Duration::from_secs(5), transport.wait_open())
        .await
        .unwrap();
    let echo: ActorRef<EchoActor> =
        client.actor_ref(Address::new("server", "echo"));
    assert_eq!(echo.ask(Echo("one".to_owned())).await, Ok("echo: one".to_owned()));

    first_token.cancel();
    tokio::time::timeout(
        Duration::from_secs(5),
        transport.wait_state(TransportState::Closed),
    )
    .await
    .unwrap();

    // Same name, same port, new process state.
    let (_second, _second_token) = echo_server(&address).await;
    tokio::time::timeout(Duration::from_secs(5), transport.wait_open())
        .await
        .unwrap();

    assert_eq!(transport.peer_system_name(), Some("server"));
    assert_eq!(
        client.remote("server").await.map(|t| t.id()),
        Some(transport.id())
    );
    echo.tell(Echo("two".to_owned())).await.unwrap();
    assert_eq!(echo.ask(Echo("three".to_owned())).await, Ok("echo: three".to_owned()));
}
