//! Response listener
//!
//! One listener runs per device. It pulls raw messages off the device's
//! response subscription, decodes them and stops once it has seen the number
//! of responses it was told to expect. Undecodable messages are logged and
//! skipped; they never count.

use crate::command::PendingCommands;
use crate::error::BridgeError;
use crate::session::Subscription;
use crate::transport::TransportError;
use cmdbridge_shared::{codec, command_response::Resp, CommandResponse, Device};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of a listener that reached its response count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenSummary {
    pub device: String,
    /// Responses decoded and counted
    pub observed: usize,
    /// Messages that failed to decode
    pub skipped: usize,
    /// Counted responses with no matching issued command
    pub unmatched: usize,
}

pub struct ResponseListener {
    device: Device,
    subscription: Subscription,
    stop_after: usize,
    timeout: Option<Duration>,
    pending: Option<PendingCommands>,
}

impl ResponseListener {
    pub fn new(device: Device, subscription: Subscription, stop_after: usize) -> Self {
        Self {
            device,
            subscription,
            stop_after,
            timeout: None,
            pending: None,
        }
    }

    /// Fail with [`BridgeError::ResponseTimeout`] if the responses take longer than this
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Match responses against issued commands
    pub fn with_correlation(mut self, pending: PendingCommands) -> Self {
        self.pending = Some(pending);
        self
    }

    /// Consume responses until `stop_after` have been decoded
    ///
    /// Returns [`BridgeError::Cancelled`] as soon as `cancel` fires. The
    /// subscription is left for the session to release.
    pub async fn listen(mut self, cancel: CancellationToken) -> Result<ListenSummary, BridgeError> {
        let mut summary = ListenSummary {
            device: self.device.id().to_string(),
            observed: 0,
            skipped: 0,
            unmatched: 0,
        };

        if self.stop_after == 0 {
            debug!(device = %self.device, "No responses expected, listener done");
            return Ok(summary);
        }

        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        info!(
            device = %self.device,
            topic = %self.subscription.topic(),
            expected = self.stop_after,
            "Listening for responses"
        );

        while summary.observed < self.stop_after {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(device = %self.device, observed = summary.observed, "Listener cancelled");
                    return Err(BridgeError::Cancelled);
                }
                _ = deadline_elapsed(deadline) => {
                    warn!(
                        device = %self.device,
                        observed = summary.observed,
                        expected = self.stop_after,
                        "Response deadline elapsed"
                    );
                    return Err(BridgeError::ResponseTimeout {
                        device: self.device.id().to_string(),
                        observed: summary.observed,
                        expected: self.stop_after,
                    });
                }
                message = self.subscription.recv() => message,
            };

            let Some(message) = message else {
                warn!(device = %self.device, "Subscription closed under the listener");
                return Err(TransportError::Closed.into());
            };

            let response = match codec::decode_response(&message.payload) {
                Ok(response) => response,
                Err(e) => {
                    warn!(
                        device = %self.device,
                        topic = %message.topic,
                        bytes = message.payload.len(),
                        error = %e,
                        "Skipping undecodable response"
                    );
                    debug!(device = %self.device, payload = ?message.payload, "Undecodable payload");
                    summary.skipped += 1;
                    continue;
                }
            };

            summary.observed += 1;
            log_response(&self.device, &response);

            if let Some(pending) = &self.pending {
                match pending.resolve(&response.uuid, self.device.id()).await {
                    Some(cmd) => debug!(
                        device = %self.device,
                        uuid = %response.uuid,
                        command = cmd.label,
                        latency_ms = cmd.age_ms(),
                        "Response matched"
                    ),
                    None => {
                        summary.unmatched += 1;
                        info!(device = %self.device, uuid = %response.uuid, "Response matches no issued command");
                    }
                }
            }
        }

        info!(
            device = %self.device,
            observed = summary.observed,
            skipped = summary.skipped,
            "All expected responses received"
        );
        Ok(summary)
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn log_response(device: &Device, response: &CommandResponse) {
    let ret_code = response.ret_code();
    info!(
        device = %device,
        uuid = %response.uuid,
        ?ret_code,
        response = response.kind(),
        "<<< Response"
    );

    let Some(resp) = &response.resp else {
        return;
    };

    match resp {
        Resp::AlarmListResponse(list) => {
            info!(device = %device, alarms = list.alarms.len(), "Alarm list");
            for alarm in &list.alarms {
                info!(
                    device = %device,
                    crontab = %alarm.crontab,
                    oneshot = alarm.oneshot,
                    enabled = alarm.enabled,
                    "    alarm"
                );
            }
        }
        Resp::Ltr390GetOptionsResponse(opts) => info!(
            device = %device,
            enable = opts.enable,
            mode = ?opts.mode(),
            gain = ?opts.gain(),
            resolution = ?opts.resolution(),
            measurerate = ?opts.measurerate(),
            "LTR390 options"
        ),
        Resp::Ltr390SetOptionsResponse(opts) => info!(
            device = %device,
            enable = opts.enable,
            mode = ?opts.mode(),
            gain = ?opts.gain(),
            resolution = ?opts.resolution(),
            measurerate = ?opts.measurerate(),
            "LTR390 options applied"
        ),
        Resp::Sht4xSetOptionsResponse(opts) => info!(
            device = %device,
            enable = opts.enable,
            mode = ?opts.mode(),
            "SHT4x options applied"
        ),
        Resp::AlarmAddResponse(_)
        | Resp::AlarmDeleteResponse(_)
        | Resp::BlinkySetLedResponse(_)
        | Resp::OtamgrUpdateResponse(_) => {}
    }
}
