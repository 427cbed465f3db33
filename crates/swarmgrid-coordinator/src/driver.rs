//! Agent driver seam.
//!
//! The coordinator decides *what* runs *where*; a driver is how that
//! decision reaches the outside world: starting and stopping agent
//! processes and delivering assignments to them. Drivers are called
//! after the coordinator has released its locks.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tracing::debug;

use swarm_core::AgentSpec;

use crate::task::Assignment;

/// Boxed future returned by driver calls.
pub type DriverFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// Starts, stops, and feeds agents.
pub trait AgentDriver: Send + Sync {
    /// Bring up an agent that has just been registered.
    fn start<'a>(&'a self, spec: &'a AgentSpec) -> DriverFuture<'a>;

    /// Tear down an agent that has been deregistered.
    fn stop<'a>(&'a self, agent_id: &'a str) -> DriverFuture<'a>;

    /// Hand an assignment to its agent. An error counts as a failed attempt.
    fn deliver<'a>(&'a self, assignment: &'a Assignment) -> DriverFuture<'a>;
}

/// Driver for externally managed agents that pull their assignments.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDriver;

impl AgentDriver for NullDriver {
    fn start<'a>(&'a self, spec: &'a AgentSpec) -> DriverFuture<'a> {
        Box::pin(async move {
            debug!(agent = ?spec.id, "null driver: start");
            Ok(())
        })
    }

    fn stop<'a>(&'a self, agent_id: &'a str) -> DriverFuture<'a> {
        Box::pin(async move {
            debug!(agent = agent_id, "null driver: stop");
            Ok(())
        })
    }

    fn deliver<'a>(&'a self, assignment: &'a Assignment) -> DriverFuture<'a> {
        Box::pin(async move {
            debug!(
                task = %assignment.task_id,
                agent = %assignment.agent_id,
                "null driver: assignment left for pull"
            );
            Ok(())
        })
    }
}

/// Event emitted by [`ChannelDriver`].
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    Started(AgentSpec),
    Stopped(String),
    Delivered(Assignment),
}

/// Driver that forwards every call as an event on an unbounded channel.
///
/// Used to wire in-process agents and to observe coordinator behavior in
/// tests. Calls fail once the receiver is dropped.
#[derive(Debug, Clone)]
pub struct ChannelDriver {
    tx: mpsc::UnboundedSender<DriverEvent>,
}

impl ChannelDriver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DriverEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: DriverEvent) -> anyhow::Result<()> {
        self.tx
            .send(event)
            .map_err(|_| anyhow::anyhow!("driver channel closed"))
    }
}

impl AgentDriver for ChannelDriver {
    fn start<'a>(&'a self, spec: &'a AgentSpec) -> DriverFuture<'a> {
        Box::pin(async move { self.send(DriverEvent::Started(spec.clone())) })
    }

    fn stop<'a>(&'a self, agent_id: &'a str) -> DriverFuture<'a> {
        Box::pin(async move { self.send(DriverEvent::Stopped(agent_id.to_string())) })
    }

    fn deliver<'a>(&'a self, assignment: &'a Assignment) -> DriverFuture<'a> {
        Box::pin(async move { self.send(DriverEvent::Delivered(assignment.clone())) })
    }
}
