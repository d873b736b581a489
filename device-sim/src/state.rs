//! In-memory state of a simulated sensor node

use cmdbridge_shared::{
    alarm, blinky, command_request::Cmd, command_response::Resp, ltr390, otamgr, sht4x,
    CommandRequest, CommandResponse, RetCode,
};
use tracing::{debug, info};

/// What the node firmware keeps between commands
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub alarms: Vec<alarm::list_response::Alarm>,
    pub ltr390: ltr390::GetOptionsResponse,
    pub sht4x: sht4x::SetOptionsResponse,
    pub led: Option<blinky::SetLedRequest>,
    pub update_running: bool,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            alarms: Vec::new(),
            ltr390: ltr390::GetOptionsResponse {
                enable: true,
                mode: ltr390::Mode::Als.into(),
                gain: ltr390::Gain::Gain3.into(),
                resolution: ltr390::Resolution::Resolution18bit.into(),
                measurerate: ltr390::MeasureRate::Measure100ms.into(),
            },
            sht4x: sht4x::SetOptionsResponse {
                enable: true,
                mode: sht4x::Mode::NoHeaterHigh.into(),
            },
            led: None,
            update_running: false,
        }
    }
}

impl DeviceState {
    /// Apply a request and build the reply, echoing its correlation id
    pub fn handle(&mut self, request: &CommandRequest) -> CommandResponse {
        let Some(cmd) = &request.cmd else {
            return CommandResponse::reply(request.uuid.clone(), RetCode::NotMine, None);
        };

        let (ret_code, resp) = self.apply(cmd);
        info!(
            uuid = %request.uuid,
            command = cmd.name(),
            ?ret_code,
            "Handled command"
        );
        CommandResponse::reply(request.uuid.clone(), ret_code, resp)
    }

    fn apply(&mut self, cmd: &Cmd) -> (RetCode, Option<Resp>) {
        match cmd {
            Cmd::AlarmAddRequest(add) => {
                if self.alarms.iter().any(|a| a.crontab == add.crontab) {
                    debug!(crontab = %add.crontab, "Alarm already scheduled");
                    return (RetCode::Error, None);
                }
                self.alarms.push(alarm::list_response::Alarm {
                    crontab: add.crontab.clone(),
                    oneshot: add.oneshot,
                    enabled: true,
                });
                (RetCode::Handled, Some(Resp::AlarmAddResponse(alarm::AddResponse {})))
            }
            Cmd::AlarmDeleteRequest(delete) => {
                let before = self.alarms.len();
                self.alarms.retain(|a| a.crontab != delete.crontab);
                if self.alarms.len() == before {
                    return (RetCode::Error, None);
                }
                (RetCode::Handled, Some(Resp::AlarmDeleteResponse(alarm::DeleteResponse {})))
            }
            Cmd::AlarmListRequest(_) => (
                RetCode::Handled,
                Some(Resp::AlarmListResponse(alarm::ListResponse {
                    alarms: self.alarms.clone(),
                })),
            ),
            Cmd::BlinkySetLedRequest(led) => {
                self.led = Some(led.clone());
                (RetCode::Handled, Some(Resp::BlinkySetLedResponse(blinky::SetLedResponse {})))
            }
            Cmd::Ltr390GetOptionsRequest(_) => (
                RetCode::Handled,
                Some(Resp::Ltr390GetOptionsResponse(self.ltr390.clone())),
            ),
            Cmd::Ltr390SetOptionsRequest(opts) => {
                self.ltr390 = ltr390::GetOptionsResponse {
                    enable: opts.enable,
                    mode: opts.mode,
                    gain: opts.gain,
                    resolution: opts.resolution,
                    measurerate: opts.measurerate,
                };
                (
                    RetCode::Handled,
                    Some(Resp::Ltr390SetOptionsResponse(ltr390::SetOptionsResponse {
                        enable: opts.enable,
                        mode: opts.mode,
                        gain: opts.gain,
                        resolution: opts.resolution,
                        measurerate: opts.measurerate,
                    })),
                )
            }
            Cmd::Sht4xSetOptionsRequest(opts) => {
                self.sht4x = sht4x::SetOptionsResponse {
                    enable: opts.enable,
                    mode: opts.mode,
                };
                (RetCode::Handled, Some(Resp::Sht4xSetOptionsResponse(self.sht4x.clone())))
            }
            Cmd::OtamgrUpdateRequest(_) => {
                if self.update_running {
                    return (RetCode::Error, None);
                }
                self.update_running = true;
                (RetCode::Handled, Some(Resp::OtamgrUpdateResponse(otamgr::UpdateResponse {})))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(crontab: &str) -> CommandRequest {
        CommandRequest::new(Cmd::AlarmAddRequest(alarm::AddRequest {
            crontab: crontab.into(),
            oneshot: true,
        }))
    }

    #[test]
    fn test_reply_echoes_correlation_id() {
        let mut state = DeviceState::default();
        let request = add("*/15 * * * * *");

        let response = state.handle(&request);
        assert_eq!(response.uuid, request.uuid);
        assert_eq!(response.ret_code(), RetCode::Handled);
    }

    #[test]
    fn test_alarm_add_list_delete() {
        let mut state = DeviceState::default();
        state.handle(&add("*/15 * * * * *"));
        state.handle(&add("*/30 * * * * *"));

        let delete = CommandRequest::new(Cmd::AlarmDeleteRequest(alarm::DeleteRequest {
            crontab: "*/15 * * * * *".into(),
        }));
        assert_eq!(state.handle(&delete).ret_code(), RetCode::Handled);
        assert_eq!(state.handle(&delete).ret_code(), RetCode::Error);

        let list = state.handle(&CommandRequest::new(Cmd::AlarmListRequest(alarm::ListRequest {})));
        match list.resp {
            Some(Resp::AlarmListResponse(list)) => {
                assert_eq!(list.alarms.len(), 1);
                assert_eq!(list.alarms[0].crontab, "*/30 * * * * *");
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_second_update_is_refused() {
        let mut state = DeviceState::default();
        let update = || CommandRequest::new(Cmd::OtamgrUpdateRequest(otamgr::UpdateRequest {}));

        assert_eq!(state.handle(&update()).ret_code(), RetCode::Handled);
        assert_eq!(state.handle(&update()).ret_code(), RetCode::Error);
    }

    #[test]
    fn test_empty_request_is_not_mine() {
        let mut state = DeviceState::default();
        let request = CommandRequest {
            uuid: "x".into(),
            cmd: None,
        };
        let response = state.handle(&request);
        assert_eq!(response.ret_code(), RetCode::NotMine);
        assert!(response.resp.is_none());
    }

    #[test]
    fn test_ltr390_options_round_trip() {
        let mut state = DeviceState::default();
        state.handle(&CommandRequest::new(Cmd::Ltr390SetOptionsRequest(
            ltr390::SetOptionsRequest {
                enable: true,
                mode: ltr390::Mode::Uvs.into(),
                gain: ltr390::Gain::Gain3.into(),
                resolution: ltr390::Resolution::Resolution18bit.into(),
                measurerate: ltr390::MeasureRate::Measure1000ms.into(),
            },
        )));

        let got = state.handle(&CommandRequest::new(Cmd::Ltr390GetOptionsRequest(
            ltr390::GetOptionsRequest {},
        )));
        match got.resp {
            Some(Resp::Ltr390GetOptionsResponse(opts)) => {
                assert_eq!(opts.mode(), ltr390::Mode::Uvs);
                assert_eq!(opts.measurerate(), ltr390::MeasureRate::Measure1000ms);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }
}
