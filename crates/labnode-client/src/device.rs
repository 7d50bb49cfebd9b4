//! Typed device operations on top of [`LabnodeClient::execute`].

use std::fmt;

use bytes::Bytes;
use labnode_frame::{FunctionId, Response};
use serde::Serialize;
use tracing::debug;

use crate::client::LabnodeClient;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Device families reported by `GetDeviceType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    PidController,
}

impl DeviceKind {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(DeviceKind::PidController),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::PidController => f.write_str("PID controller"),
        }
    }
}

/// Firmware, hardware or API version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub kind: DeviceKind,
    pub api_version: Version,
}

/// Sign of the controller output relative to the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackDirection {
    Negative = 0,
    Positive = 1,
}

/// Ask the device what it is.
pub async fn identify(client: &LabnodeClient) -> Result<DeviceIdentity> {
    let response = client.request(FunctionId::GetDeviceType, Bytes::new()).await?;
    let [code] = fixed::<1>(FunctionId::GetDeviceType, &response)?;
    let kind = DeviceKind::from_u8(code).ok_or(ClientError::UnsupportedDevice(code))?;

    let response = client.request(FunctionId::GetApiVersion, Bytes::new()).await?;
    let api_version = version(FunctionId::GetApiVersion, &response)?;

    debug!(%kind, %api_version, "identified device");
    Ok(DeviceIdentity { kind, api_version })
}

/// Connect, identify the device and return its typed handle.
pub async fn connect_device(config: ClientConfig) -> Result<PidController> {
    let client = LabnodeClient::connect_with(config).await?;
    let identity = identify(&client).await?;
    Ok(PidController::new(client, identity.api_version))
}

/// A remote PID controller.
///
/// Gains, setpoint and input are Q16.16 fixed point.
#[derive(Debug, Clone)]
pub struct PidController {
    client: LabnodeClient,
    api_version: Version,
}

impl PidController {
    /// Wrap an already connected client without identifying the device.
    pub fn new(client: LabnodeClient, api_version: Version) -> Self {
        Self {
            client,
            api_version,
        }
    }

    pub fn client(&self) -> &LabnodeClient {
        &self.client
    }

    /// API version reported when the device was identified.
    pub fn api_version(&self) -> Version {
        self.api_version
    }

    pub async fn close(&self) {
        self.client.close().await;
    }

    pub async fn get_software_version(&self) -> Result<Version> {
        let response = self.get(FunctionId::GetSoftwareVersion).await?;
        version(FunctionId::GetSoftwareVersion, &response)
    }

    pub async fn get_hardware_version(&self) -> Result<Version> {
        let response = self.get(FunctionId::GetHardwareVersion).await?;
        version(FunctionId::GetHardwareVersion, &response)
    }

    pub async fn get_api_version(&self) -> Result<Version> {
        let response = self.get(FunctionId::GetApiVersion).await?;
        version(FunctionId::GetApiVersion, &response)
    }

    pub async fn get_serial(&self) -> Result<u32> {
        let response = self.get(FunctionId::GetSerialNumber).await?;
        fixed::<4>(FunctionId::GetSerialNumber, &response).map(u32::from_le_bytes)
    }

    /// Onboard sensor temperature in °C.
    pub async fn get_board_temperature(&self) -> Result<f64> {
        let response = self.get(FunctionId::GetBoardTemperature).await?;
        let raw = fixed::<2>(FunctionId::GetBoardTemperature, &response).map(u16::from_le_bytes)?;
        Ok(temperature_from_raw(raw))
    }

    /// Onboard sensor relative humidity in %rH, capped at 100.
    pub async fn get_humidity(&self) -> Result<f64> {
        let response = self.get(FunctionId::GetHumidity).await?;
        let raw = fixed::<2>(FunctionId::GetHumidity, &response).map(u16::from_le_bytes)?;
        Ok(humidity_from_raw(raw))
    }

    pub async fn get_mac_address(&self) -> Result<[u8; 6]> {
        let response = self.get(FunctionId::GetMacAddress).await?;
        fixed::<6>(FunctionId::GetMacAddress, &response)
    }

    pub async fn set_mac_address(&self, mac: [u8; 6]) -> Result<()> {
        self.set(FunctionId::SetMacAddress, mac.to_vec()).await
    }

    /// Whether the controller restores its previous settings on power-up.
    pub async fn get_auto_resume(&self) -> Result<bool> {
        let response = self.get(FunctionId::GetAutoResume).await?;
        fixed::<1>(FunctionId::GetAutoResume, &response).map(|[b]| b != 0)
    }

    pub async fn set_auto_resume(&self, enabled: bool) -> Result<()> {
        self.set(FunctionId::SetAutoResume, vec![enabled as u8]).await
    }

    /// Offset in K subtracted from the internal sensor in fallback mode.
    pub async fn get_calibration_offset(&self) -> Result<f32> {
        let response = self.get(FunctionId::GetCalibrationOffset).await?;
        fixed::<4>(FunctionId::GetCalibrationOffset, &response).map(f32::from_le_bytes)
    }

    pub async fn set_calibration_offset(&self, kelvin: f32) -> Result<()> {
        self.set(FunctionId::SetCalibrationOffset, kelvin.to_le_bytes().to_vec())
            .await
    }

    /// Minimum DAC output, in bits.
    pub async fn set_lower_output_limit(&self, limit: u32) -> Result<()> {
        self.set(FunctionId::SetLowerOutputLimit, limit.to_le_bytes().to_vec())
            .await
    }

    /// Maximum DAC output, in bits.
    pub async fn set_upper_output_limit(&self, limit: u32) -> Result<()> {
        self.set(FunctionId::SetUpperOutputLimit, limit.to_le_bytes().to_vec())
            .await
    }

    /// Input silence in ms after which the controller falls back to its internal sensor.
    pub async fn set_timeout(&self, millis: u32) -> Result<()> {
        self.set(FunctionId::SetTimeout, millis.to_le_bytes().to_vec())
            .await
    }

    /// Doubles the DAC range from 0..5 V to 0..10 V.
    pub async fn set_dac_gain(&self, enabled: bool) -> Result<()> {
        self.set(FunctionId::SetGain, vec![enabled as u8]).await
    }

    pub async fn set_feedback_direction(&self, direction: FeedbackDirection) -> Result<()> {
        self.set(FunctionId::SetDirection, vec![direction as u8]).await
    }

    /// Fails with `NotInitialized` while the controller is running.
    pub async fn set_output(&self, value: i32) -> Result<()> {
        self.set(FunctionId::SetOutput, value.to_le_bytes().to_vec())
            .await
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.set(FunctionId::SetEnabled, vec![enabled as u8]).await
    }

    pub async fn set_kp(&self, kp: i32) -> Result<()> {
        self.set(FunctionId::SetKp, kp.to_le_bytes().to_vec()).await
    }

    pub async fn set_ki(&self, ki: i32) -> Result<()> {
        self.set(FunctionId::SetKi, ki.to_le_bytes().to_vec()).await
    }

    pub async fn set_kd(&self, kd: i32) -> Result<()> {
        self.set(FunctionId::SetKd, kd.to_le_bytes().to_vec()).await
    }

    /// Feed one input sample; returns the new controller output.
    pub async fn set_input(&self, value: i32) -> Result<i32> {
        let response = self
            .client
            .request(FunctionId::SetInput, value.to_le_bytes().to_vec())
            .await?;
        fixed::<4>(FunctionId::SetInput, &response).map(i32::from_le_bytes)
    }

    pub async fn set_setpoint(&self, value: i32) -> Result<()> {
        self.set(FunctionId::SetSetpoint, value.to_le_bytes().to_vec())
            .await
    }

    pub async fn set_serial(&self, serial: u32) -> Result<()> {
        self.set(FunctionId::SetSerialNumber, serial.to_le_bytes().to_vec())
            .await
    }

    /// Hardware reset. The device drops the link while it reboots.
    pub async fn reset(&self) -> Result<()> {
        self.set(FunctionId::Reset, Vec::new()).await
    }

    /// Restore factory defaults.
    pub async fn reset_settings(&self) -> Result<()> {
        self.set(FunctionId::ResetSettings, Vec::new()).await
    }

    async fn get(&self, function: FunctionId) -> Result<Response> {
        self.client.request(function, Bytes::new()).await
    }

    async fn set(&self, function: FunctionId, payload: Vec<u8>) -> Result<()> {
        self.client.request(function, payload).await.map(|_| ())
    }
}

/// Si7021 temperature conversion, dividing by the full 16-bit range.
pub fn temperature_from_raw(raw: u16) -> f64 {
    175.72 * f64::from(raw) / 65535.0 - 46.85
}

/// Si7021 humidity conversion, truncated to 100 %rH.
pub fn humidity_from_raw(raw: u16) -> f64 {
    (125.0 * f64::from(raw) / 65535.0 - 6.0).min(100.0)
}

fn fixed<const N: usize>(function: FunctionId, response: &Response) -> Result<[u8; N]> {
    <[u8; N]>::try_from(response.payload.as_ref()).map_err(|_| ClientError::InvalidPayload {
        function,
        expected: N,
        actual: response.payload.len(),
    })
}

fn version(function: FunctionId, response: &Response) -> Result<Version> {
    let [major, minor, patch] = fixed::<3>(function, response)?;
    Ok(Version {
        major,
        minor,
        patch,
    })
}
