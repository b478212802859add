

//! Core library for the Ambit framework.
//! Provides location-transparent actors that exchange messages within one process or across
//! processes joined by transports.
//! Handlers run as cancellable step sequences, so a newer message can supersede a running one.

pub use actor::{
    Actor, ActorContext, ActorRef, ActorSystem, Address, BoxedTask,
    CancellableTask, Channel, Config, Envelope, Error as ActorError,
    ExponentialBackoffStrategy, FixedIntervalStrategy, Frame, Handler, Kind,
    Link, LinkEvent, Mail, Message, NoIntervalStrategy, Outcome,
    ReconnectStrategy, Response, Step, SystemEvent, SystemRef, SystemRunner,
    Task, Transport, TransportState,
};

pub use actor::{memory, task, tcp};
