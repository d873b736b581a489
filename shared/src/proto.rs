//! Command envelope messages
//!
//! These mirror the protobuf schema flashed onto the sensor nodes. Field tags
//! must stay in sync with the firmware; new variants are appended, never
//! renumbered.

/// Return codes produced by the firmware command dispatcher
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RetCode {
    /// No handler on the device claimed the command
    NotMine = 0,
    /// Command handled successfully
    Handled = 1,
    /// A handler claimed the command but failed
    Error = 2,
}

/// A command sent to a device on its request topic
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommandRequest {
    /// Correlation id, echoed back in the response
    #[prost(string, tag = "1")]
    pub uuid: String,
    #[prost(oneof = "command_request::Cmd", tags = "2, 3, 4, 5, 6, 7, 8, 9")]
    pub cmd: Option<command_request::Cmd>,
}

pub mod command_request {
    /// The request variants a device understands
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Cmd {
        #[prost(message, tag = "2")]
        AlarmAddRequest(super::alarm::AddRequest),
        #[prost(message, tag = "3")]
        AlarmDeleteRequest(super::alarm::DeleteRequest),
        #[prost(message, tag = "4")]
        AlarmListRequest(super::alarm::ListRequest),
        #[prost(message, tag = "5")]
        BlinkySetLedRequest(super::blinky::SetLedRequest),
        #[prost(message, tag = "6")]
        Ltr390GetOptionsRequest(super::ltr390::GetOptionsRequest),
        #[prost(message, tag = "7")]
        Ltr390SetOptionsRequest(super::ltr390::SetOptionsRequest),
        #[prost(message, tag = "8")]
        Sht4xSetOptionsRequest(super::sht4x::SetOptionsRequest),
        #[prost(message, tag = "9")]
        OtamgrUpdateRequest(super::otamgr::UpdateRequest),
    }

    impl Cmd {
        /// Stable snake_case name of the variant, as used in the schema
        pub fn name(&self) -> &'static str {
            match self {
                Cmd::AlarmAddRequest(_) => "alarm_add_request",
                Cmd::AlarmDeleteRequest(_) => "alarm_delete_request",
                Cmd::AlarmListRequest(_) => "alarm_list_request",
                Cmd::BlinkySetLedRequest(_) => "blinky_set_led_request",
                Cmd::Ltr390GetOptionsRequest(_) => "ltr390_get_options_request",
                Cmd::Ltr390SetOptionsRequest(_) => "ltr390_set_options_request",
                Cmd::Sht4xSetOptionsRequest(_) => "sht4x_set_options_request",
                Cmd::OtamgrUpdateRequest(_) => "otamgr_update_request",
            }
        }
    }
}

/// A device's answer on its response topic
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommandResponse {
    /// Correlation id copied from the request
    #[prost(string, tag = "1")]
    pub uuid: String,
    #[prost(enumeration = "RetCode", tag = "2")]
    pub ret_code: i32,
    #[prost(oneof = "command_response::Resp", tags = "3, 4, 5, 6, 7, 8, 9, 10")]
    pub resp: Option<command_response::Resp>,
}

pub mod command_response {
    /// The response variants a device can produce
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Resp {
        #[prost(message, tag = "3")]
        AlarmAddResponse(super::alarm::AddResponse),
        #[prost(message, tag = "4")]
        AlarmDeleteResponse(super::alarm::DeleteResponse),
        #[prost(message, tag = "5")]
        AlarmListResponse(super::alarm::ListResponse),
        #[prost(message, tag = "6")]
        BlinkySetLedResponse(super::blinky::SetLedResponse),
        #[prost(message, tag = "7")]
        Ltr390GetOptionsResponse(super::ltr390::GetOptionsResponse),
        #[prost(message, tag = "8")]
        Ltr390SetOptionsResponse(super::ltr390::SetOptionsResponse),
        #[prost(message, tag = "9")]
        Sht4xSetOptionsResponse(super::sht4x::SetOptionsResponse),
        #[prost(message, tag = "10")]
        OtamgrUpdateResponse(super::otamgr::UpdateResponse),
    }

    impl Resp {
        pub fn name(&self) -> &'static str {
            match self {
                Resp::AlarmAddResponse(_) => "alarm_add_response",
                Resp::AlarmDeleteResponse(_) => "alarm_delete_response",
                Resp::AlarmListResponse(_) => "alarm_list_response",
                Resp::BlinkySetLedResponse(_) => "blinky_set_led_response",
                Resp::Ltr390GetOptionsResponse(_) => "ltr390_get_options_response",
                Resp::Ltr390SetOptionsResponse(_) => "ltr390_set_options_response",
                Resp::Sht4xSetOptionsResponse(_) => "sht4x_set_options_response",
                Resp::OtamgrUpdateResponse(_) => "otamgr_update_response",
            }
        }
    }
}

/// Cron-driven alarms
pub mod alarm {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AddRequest {
        #[prost(string, tag = "1")]
        pub crontab: String,
        #[prost(bool, tag = "2")]
        pub oneshot: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AddResponse {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DeleteRequest {
        #[prost(string, tag = "1")]
        pub crontab: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DeleteResponse {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ListRequest {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ListResponse {
        #[prost(message, repeated, tag = "1")]
        pub alarms: Vec<list_response::Alarm>,
    }

    pub mod list_response {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Alarm {
            #[prost(string, tag = "1")]
            pub crontab: String,
            #[prost(bool, tag = "2")]
            pub oneshot: bool,
            #[prost(bool, tag = "3")]
            pub enabled: bool,
        }
    }
}

/// Status LED animations
pub mod blinky {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Pattern {
        Blink = 0,
        Breath = 1,
        FadeIn = 2,
        FadeOut = 3,
        Rainbow = 4,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Led {
        Led0 = 0,
        Rgb0 = 1,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SetLedRequest {
        /// Brightness + RGB packed as 0xBBRRGGxx
        #[prost(uint32, tag = "1")]
        pub brgb: u32,
        #[prost(enumeration = "Pattern", tag = "2")]
        pub pattern: i32,
        #[prost(bool, tag = "3")]
        pub off_at_end: bool,
        #[prost(uint32, tag = "4")]
        pub ms_delay: u32,
        #[prost(uint32, tag = "5")]
        pub repeat_count: u32,
        #[prost(enumeration = "Led", tag = "6")]
        pub target: i32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SetLedResponse {}
}

/// LTR390 UV / ambient light sensor
pub mod ltr390 {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Mode {
        Als = 0,
        Uvs = 1,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Gain {
        Gain1 = 0,
        Gain3 = 1,
        Gain6 = 2,
        Gain9 = 3,
        Gain18 = 4,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Resolution {
        Resolution20bit = 0,
        Resolution19bit = 1,
        Resolution18bit = 2,
        Resolution17bit = 3,
        Resolution16bit = 4,
        Resolution13bit = 5,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum MeasureRate {
        Measure25ms = 0,
        Measure50ms = 1,
        Measure100ms = 2,
        Measure200ms = 3,
        Measure500ms = 4,
        Measure1000ms = 5,
        Measure2000ms = 6,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetOptionsRequest {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetOptionsResponse {
        #[prost(bool, tag = "1")]
        pub enable: bool,
        #[prost(enumeration = "Mode", tag = "2")]
        pub mode: i32,
        #[prost(enumeration = "Gain", tag = "3")]
        pub gain: i32,
        #[prost(enumeration = "Resolution", tag = "4")]
        pub resolution: i32,
        #[prost(enumeration = "MeasureRate", tag = "5")]
        pub measurerate: i32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SetOptionsRequest {
        #[prost(bool, tag = "1")]
        pub enable: bool,
        #[prost(enumeration = "Mode", tag = "2")]
        pub mode: i32,
        #[prost(enumeration = "Gain", tag = "3")]
        pub gain: i32,
        #[prost(enumeration = "Resolution", tag = "4")]
        pub resolution: i32,
        #[prost(enumeration = "MeasureRate", tag = "5")]
        pub measurerate: i32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SetOptionsResponse {
        #[prost(bool, tag = "1")]
        pub enable: bool,
        #[prost(enumeration = "Mode", tag = "2")]
        pub mode: i32,
        #[prost(enumeration = "Gain", tag = "3")]
        pub gain: i32,
        #[prost(enumeration = "Resolution", tag = "4")]
        pub resolution: i32,
        #[prost(enumeration = "MeasureRate", tag = "5")]
        pub measurerate: i32,
    }
}

/// SHT4x temperature / humidity sensor
pub mod sht4x {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Mode {
        NoHeaterHigh = 0,
        NoHeaterMed = 1,
        NoHeaterLow = 2,
        HighHeater1s = 3,
        HighHeater100ms = 4,
        MedHeater1s = 5,
        MedHeater100ms = 6,
        LowHeater1s = 7,
        LowHeater100ms = 8,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SetOptionsRequest {
        #[prost(bool, tag = "1")]
        pub enable: bool,
        #[prost(enumeration = "Mode", tag = "2")]
        pub mode: i32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SetOptionsResponse {
        #[prost(bool, tag = "1")]
        pub enable: bool,
        #[prost(enumeration = "Mode", tag = "2")]
        pub mode: i32,
    }
}

/// Over-the-air firmware updates
pub mod otamgr {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct UpdateRequest {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct UpdateResponse {}
}
