use std::fmt;

/// Function ids understood by the Labnode firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionId {
    SetInput = 0,
    SetKp = 1,
    SetKi = 2,
    SetKd = 3,
    SetLowerOutputLimit = 4,
    SetUpperOutputLimit = 5,
    SetEnabled = 6,
    SetTimeout = 7,
    SetDirection = 8,
    SetSetpoint = 9,
    SetOutput = 10,
    GetSoftwareVersion = 11,
    GetSerialNumber = 12,
    GetDeviceType = 13,
    SetGain = 14,
    GetBoardTemperature = 15,
    SetSerialNumber = 16,
    GetHardwareVersion = 17,
    GetHumidity = 18,
    GetCalibrationOffset = 19,
    SetCalibrationOffset = 20,
    ResetSettings = 21,
    CallbackUpdateValue = 22,
    RequestId = 23,
    GetMacAddress = 24,
    SetMacAddress = 25,
    GetAutoResume = 26,
    SetAutoResume = 27,
    Reset = 30,
    GetApiVersion = 31,
    IsPartialMessage = 32,
}

impl FunctionId {
    pub const ALL: [FunctionId; 31] = [
        FunctionId::SetInput,
        FunctionId::SetKp,
        FunctionId::SetKi,
        FunctionId::SetKd,
        FunctionId::SetLowerOutputLimit,
        FunctionId::SetUpperOutputLimit,
        FunctionId::SetEnabled,
        FunctionId::SetTimeout,
        FunctionId::SetDirection,
        FunctionId::SetSetpoint,
        FunctionId::SetOutput,
        FunctionId::GetSoftwareVersion,
        FunctionId::GetSerialNumber,
        FunctionId::GetDeviceType,
        FunctionId::SetGain,
        FunctionId::GetBoardTemperature,
        FunctionId::SetSerialNumber,
        FunctionId::GetHardwareVersion,
        FunctionId::GetHumidity,
        FunctionId::GetCalibrationOffset,
        FunctionId::SetCalibrationOffset,
        FunctionId::ResetSettings,
        FunctionId::CallbackUpdateValue,
        FunctionId::RequestId,
        FunctionId::GetMacAddress,
        FunctionId::SetMacAddress,
        FunctionId::GetAutoResume,
        FunctionId::SetAutoResume,
        FunctionId::Reset,
        FunctionId::GetApiVersion,
        FunctionId::IsPartialMessage,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<FunctionId> for u8 {
    fn from(id: FunctionId) -> Self {
        id as u8
    }
}

impl TryFrom<u8> for FunctionId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        FunctionId::ALL
            .iter()
            .copied()
            .find(|id| id.as_u8() == value)
            .ok_or(value)
    }
}

/// Error codes the firmware reports in the status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    ValueError = 250,
    InvalidFormat = 251,
    InvalidCommand = 252,
    NotInitialized = 253,
    NotImplemented = 254,
    Deprecated = 255,
}

impl ErrorCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            250 => Some(Self::ValueError),
            251 => Some(Self::InvalidFormat),
            252 => Some(Self::InvalidCommand),
            253 => Some(Self::NotInitialized),
            254 => Some(Self::NotImplemented),
            255 => Some(Self::Deprecated),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::ValueError => "value error",
            ErrorCode::InvalidFormat => "invalid format",
            ErrorCode::InvalidCommand => "invalid command",
            ErrorCode::NotInitialized => "not initialized",
            ErrorCode::NotImplemented => "not implemented",
            ErrorCode::Deprecated => "deprecated",
        };
        f.write_str(name)
    }
}

/// The status byte of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub u8);

impl Status {
    pub const OK: Status = Status(0);
    /// Explicit acknowledgement of a setter.
    pub const ACK: Status = Status(249);

    pub fn is_success(self) -> bool {
        self == Self::OK || self == Self::ACK
    }

    /// The known firmware error, if this status is one.
    pub fn error_code(self) -> Option<ErrorCode> {
        ErrorCode::from_u8(self.0)
    }
}
