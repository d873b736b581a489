//! Command dispatcher for publishing command envelopes to devices

use super::pending::PendingCommands;
use crate::error::BridgeError;
use crate::session::SessionHandle;
use cmdbridge_shared::{codec, command_request, CommandRequest, Device};
use futures::future::join_all;
use tracing::{debug, error, info};

/// What a dispatcher run sends
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchPlan {
    /// Ordered commands to one device, each confirmed before the next
    Sequence {
        target: Device,
        commands: Vec<command_request::Cmd>,
    },
    /// One command published concurrently to every target
    FanOut {
        targets: Vec<Device>,
        command: command_request::Cmd,
    },
}

impl DispatchPlan {
    /// Devices the plan publishes to
    pub fn targets(&self) -> Vec<Device> {
        match self {
            DispatchPlan::Sequence { target, .. } => vec![target.clone()],
            DispatchPlan::FanOut { targets, .. } => targets.clone(),
        }
    }

    /// Number of publishes the plan performs
    pub fn publish_count(&self) -> usize {
        match self {
            DispatchPlan::Sequence { commands, .. } => commands.len(),
            DispatchPlan::FanOut { targets, .. } => targets.len(),
        }
    }
}

/// Builds command envelopes and publishes them on the session
#[derive(Clone)]
pub struct CommandDispatcher {
    handle: SessionHandle,
    pending: PendingCommands,
}

impl CommandDispatcher {
    pub fn new(handle: SessionHandle, pending: PendingCommands) -> Self {
        Self { handle, pending }
    }

    /// Run a plan, returning the correlation ids issued in publish order
    pub async fn dispatch(&self, plan: DispatchPlan) -> Result<Vec<String>, BridgeError> {
        match plan {
            DispatchPlan::Sequence { target, commands } => {
                self.send_sequence(&target, commands).await
            }
            DispatchPlan::FanOut { targets, command } => {
                let uuid = self.fan_out(&targets, command).await?;
                Ok(vec![uuid])
            }
        }
    }

    /// Publish commands to one device strictly in order
    ///
    /// Command `i + 1` is built and published only after the broker confirmed
    /// command `i`. The first failure stops the sequence.
    pub async fn send_sequence(
        &self,
        target: &Device,
        commands: Vec<command_request::Cmd>,
    ) -> Result<Vec<String>, BridgeError> {
        let total = commands.len();
        let mut issued = Vec::with_capacity(total);

        for (idx, cmd) in commands.into_iter().enumerate() {
            let request = CommandRequest::new(cmd);
            let payload = codec::encode_request(&request)?;

            self.pending
                .register(&request.uuid, request.kind(), target.id())
                .await;
            self.handle.publish(target.request_topic(), payload).await?;

            info!(
                device = %target,
                uuid = %request.uuid,
                command = request.kind(),
                step = idx + 1,
                total,
                ">>> Sent command"
            );
            issued.push(request.uuid);
        }

        Ok(issued)
    }

    /// Publish one command to every target at once
    ///
    /// The envelope is encoded once so every device receives the same bytes.
    /// All publishes run to completion; the first failure is reported after.
    pub async fn fan_out(
        &self,
        targets: &[Device],
        cmd: command_request::Cmd,
    ) -> Result<String, BridgeError> {
        let request = CommandRequest::new(cmd);
        let payload = codec::encode_request(&request)?;

        for target in targets {
            self.pending
                .register(&request.uuid, request.kind(), target.id())
                .await;
        }

        let publishes = targets.iter().map(|target| {
            let payload = payload.clone();
            async move {
                let result = self.handle.publish(target.request_topic(), payload).await;
                (target, result)
            }
        });

        let mut first_error = None;
        for (target, result) in join_all(publishes).await {
            match result {
                Ok(()) => debug!(device = %target, uuid = %request.uuid, "Fan-out publish confirmed"),
                Err(e) => {
                    error!(device = %target, uuid = %request.uuid, error = %e, "Fan-out publish failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e.into());
        }

        info!(
            uuid = %request.uuid,
            command = request.kind(),
            devices = targets.len(),
            ">>> Broadcast command"
        );
        Ok(request.uuid)
    }
}
