// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor Internal Execution System
//!
//! Each actor is executed by its own `ActorRunner`, spawned as one Tokio task. The runner owns
//! the actor state and the receiving half of its mailbox and processes one message at a time:
//!
//! 1. The message at the head of the mailbox becomes the *current* message and the actor's
//!    handler builds a [`Task`](crate::Task) for it.
//! 2. The runner advances the task one step at a time. While a step runs, new mail is still
//!    received; it is appended to the mailbox and announced to the actor through
//!    `on_new_message` once the step ends.
//! 3. Before each step the runner checks the cancellation token of the current message. A
//!    cancelled task settles as cancelled without running further steps.
//! 4. When the task settles, its outcome goes back to whoever asked, and the next message is
//!    taken.
//!
//! Cancellation is therefore cooperative: a step that started always completes.
//!

use crate::{
    Address, Error,
    actor::{Actor, ActorContext, Handler, Message},
    envelope::encode,
    handler::{HandleHelper, Mail, MailboxReceiver, ReplyTo, mailbox},
    system::SystemRef,
    task::{CancellableTask, Outcome},
};

use tokio::{select, sync::oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Core execution engine for one actor.
///
/// Owns the actor and its mailbox receiver. Nothing else touches the actor state, so handlers
/// never race with each other.
pub(crate) struct ActorRunner<A: Actor> {
    /// Address of the actor.
    address: Address,

    /// The actor instance being executed by this runner.
    actor: A,

    /// Message receiver from the actor's mailbox.
    receiver: MailboxReceiver<A>,
}

impl<A> ActorRunner<A>
where
    A: Actor + Handler<A>,
{
    /// Creates a new actor runner and the helper that feeds its mailbox.
    pub(crate) fn create(address: Address, actor: A) -> (Self, HandleHelper<A>) {
        debug!("Creating new actor runner.");
        let (sender, receiver) = mailbox();
        let helper = HandleHelper::new(address.clone(), sender);
        let runner = ActorRunner {
            address,
            actor,
            receiver,
        };
        (runner, helper)
    }

    /// Runs the complete actor lifecycle: `pre_start`, the message loop, then `post_stop`.
    ///
    /// `started` receives the result of `pre_start`. A failed start ends the runner without
    /// processing any message.
    pub(crate) async fn init(
        mut self,
        system: SystemRef,
        started: oneshot::Sender<Result<(), Error>>,
    ) {
        debug!("Initializing actor {} runner.", &self.address);
        let token = system.token();
        let mut ctx: ActorContext<A> =
            ActorContext::new(self.address.clone(), system);

        if let Err(error) = self.actor.pre_start(&mut ctx).await {
            error!("Actor {} failed to start: {}", &self.address, error);
            let error = match error {
                Error::Start(_) => error,
                other => Error::Start(other.to_string()),
            };
            let _ = started.send(Err(error));
            return;
        }
        if started.send(Ok(())).is_err() {
            error!("Failed to send start signal for {}.", &self.address);
            return;
        }
        debug!("Actor {} is started.", &self.address);

        self.run(&mut ctx, &token).await;

        if let Err(error) = self.actor.post_stop(&mut ctx).await {
            error!("Actor '{}' failed to stop: {}", &self.address, error);
        }
        self.receiver.close();
        self.reject_queued(&mut ctx).await;
        debug!("Actor {} is stopped.", &self.address);
    }

    /// Answers every message left in the mailbox of a stopped actor with
    /// `Error::Disconnected`, so no ask stays without a reply.
    async fn reject_queued(&mut self, ctx: &mut ActorContext<A>) {
        while let Ok(mail) = self.receiver.try_recv() {
            ctx.push(mail);
        }
        let reason = Error::Disconnected(ctx.system().name().to_owned());
        while let Some(mail) = ctx.pop() {
            if matches!(mail.reply, ReplyTo::Nobody) {
                continue;
            }
            debug!(
                "Actor {} rejecting queued '{}'.",
                &self.address,
                mail.message.message_type()
            );
            Self::settle(
                &self.address,
                mail.reply,
                Outcome::Err(reason.clone()),
                ctx.system(),
            )
            .await;
        }
    }

    /// Main loop: takes the oldest queued message and processes it, or waits for mail.
    async fn run(&mut self, ctx: &mut ActorContext<A>, token: &CancellationToken) {
        debug!("Running actor {}.", &self.address);
        loop {
            if token.is_cancelled() {
                break;
            }
            while let Ok(mail) = self.receiver.try_recv() {
                ctx.push(mail);
            }
            if let Some(mail) = ctx.pop() {
                if !self.process(mail, ctx, token).await {
                    break;
                }
                continue;
            }
            select! {
                _ = token.cancelled() => break,
                mail = self.receiver.recv() => match mail {
                    Some(mail) => ctx.push(mail),
                    None => break,
                },
            }
        }
    }

    /// Processes one message until its task settles. Returns false if the system began to
    /// stop meanwhile.
    async fn process(
        &mut self,
        mail: Mail<A>,
        ctx: &mut ActorContext<A>,
        token: &CancellationToken,
    ) -> bool {
        let Mail {
            message,
            sender,
            reply,
        } = mail;
        debug!(
            "Actor {} handling '{}'.",
            &self.address,
            message.message_type()
        );

        let task = self.actor.handle_message(sender.clone(), message.clone(), ctx);
        let mut task = CancellableTask::new(task);
        let task_token = task.token();
        ctx.begin(message, sender, task.token());

        let mut stopping = false;
        let outcome = loop {
            let mut arrived = Vec::new();
            let settled = {
                let step = task.advance(&mut self.actor, ctx);
                tokio::pin!(step);
                loop {
                    select! {
                        biased;
                        settled = &mut step => break settled,
                        Some(mail) = self.receiver.recv() => arrived.push(mail),
                        _ = token.cancelled(), if !stopping => {
                            stopping = true;
                            task_token.cancel();
                        }
                    }
                }
            };
            while let Ok(mail) = self.receiver.try_recv() {
                arrived.push(mail);
            }
            if settled.is_some() {
                ctx.finish();
            }
            for mail in arrived {
                let message = mail.message.clone();
                let sender = mail.sender.clone();
                ctx.push(mail);
                self.actor.on_new_message(&message, sender.as_ref(), ctx);
            }
            if let Some(outcome) = settled {
                break outcome;
            }
        };

        match &outcome {
            Outcome::Ok(_) => debug!("Actor {} handled message.", &self.address),
            Outcome::Err(error) => {
                debug!("Actor {} handler failed: {}", &self.address, error)
            }
            Outcome::Cancelled => {
                debug!("Actor {} handler cancelled.", &self.address)
            }
        }
        Self::settle(&self.address, reply, outcome, ctx.system()).await;
        !stopping
    }

    /// Hands the outcome of a task to its caller.
    async fn settle(
        address: &Address,
        reply: ReplyTo,
        outcome: Outcome<A::Response>,
        system: &SystemRef,
    ) {
        match reply {
            ReplyTo::Nobody => {
                if let Outcome::Err(error) = outcome {
                    warn!("Message to {} failed: {}", address, error);
                }
            }
            ReplyTo::Local(sender) => {
                let result =
                    outcome.into_result().and_then(|response| encode(&response));
                if sender.send(result).is_err() {
                    debug!("Caller of {} is gone.", address);
                }
            }
            ReplyTo::Remote {
                reply_to,
                correlation_id,
            } => {
                let result =
                    outcome.into_result().and_then(|response| encode(&response));
                system.reply(&reply_to, &correlation_id, result).await;
            }
        }
    }
}
