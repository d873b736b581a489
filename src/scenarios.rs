//! Command sets run against the sensor nodes

use crate::command::DispatchPlan;
use cmdbridge_shared::{alarm, blinky, command_request::Cmd, ltr390, otamgr, sht4x, Device};
use std::fmt;

/// A predefined command run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Start an OTA update on every device at once
    Update,
    /// Blink the status LED of the first device
    Led,
    /// Exercise alarm scheduling and sensor options on the first device
    Alarms,
}

impl Scenario {
    /// Build the dispatch plan for the given devices
    ///
    /// `None` when there is no device to send to.
    pub fn plan(&self, devices: &[Device]) -> Option<DispatchPlan> {
        let first = devices.first()?.clone();

        let plan = match self {
            Scenario::Update => DispatchPlan::FanOut {
                targets: devices.to_vec(),
                command: Cmd::OtamgrUpdateRequest(otamgr::UpdateRequest {}),
            },
            Scenario::Led => DispatchPlan::Sequence {
                target: first,
                commands: vec![led_blink()],
            },
            Scenario::Alarms => DispatchPlan::Sequence {
                target: first,
                commands: alarm_sequence(),
            },
        };
        Some(plan)
    }

    /// Responses each targeted device's listener waits for
    ///
    /// The update command restarts the node, so nothing is awaited for it.
    pub fn expected_responses(&self) -> usize {
        match self {
            Scenario::Update => 0,
            Scenario::Led => 1,
            Scenario::Alarms => alarm_sequence().len(),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scenario::Update => write!(f, "update"),
            Scenario::Led => write!(f, "led"),
            Scenario::Alarms => write!(f, "alarms"),
        }
    }
}

fn led_blink() -> Cmd {
    Cmd::BlinkySetLedRequest(blinky::SetLedRequest {
        brgb: 0xe20f_0f00,
        pattern: blinky::Pattern::Blink.into(),
        off_at_end: true,
        ms_delay: 500,
        repeat_count: 10,
        target: blinky::Led::Led0.into(),
    })
}

fn alarm_sequence() -> Vec<Cmd> {
    vec![
        Cmd::AlarmAddRequest(alarm::AddRequest {
            crontab: "*/15 * * * * *".into(),
            oneshot: true,
        }),
        Cmd::AlarmAddRequest(alarm::AddRequest {
            crontab: "*/30 * * * * *".into(),
            oneshot: true,
        }),
        Cmd::AlarmListRequest(alarm::ListRequest {}),
        Cmd::AlarmDeleteRequest(alarm::DeleteRequest {
            crontab: "*/15 * * * * *".into(),
        }),
        Cmd::AlarmListRequest(alarm::ListRequest {}),
        Cmd::Ltr390GetOptionsRequest(ltr390::GetOptionsRequest {}),
        Cmd::Ltr390SetOptionsRequest(ltr390::SetOptionsRequest {
            enable: true,
            mode: ltr390::Mode::Uvs.into(),
            gain: ltr390::Gain::Gain3.into(),
            resolution: ltr390::Resolution::Resolution18bit.into(),
            measurerate: ltr390::MeasureRate::Measure1000ms.into(),
        }),
        Cmd::Sht4xSetOptionsRequest(sht4x::SetOptionsRequest {
            enable: false,
            mode: sht4x::Mode::NoHeaterHigh.into(),
        }),
    ]
}
