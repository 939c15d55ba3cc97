use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::types::{FanMode, FanSpeed, Temperature, ThermostatMode};

pub const DEFAULT_BASE_URL: &str = "https://api.daikinskyport.com";

pub const PATH_LOGIN: &str = "/users/auth/login";
pub const PATH_REFRESH_TOKEN: &str = "/users/auth/token";
pub const PATH_LOCATIONS: &str = "/locations";
pub const PATH_DEVICE_DATA: &str = "/deviceData";

pub fn device_data_path(device_id: &str) -> String {
    format!("{PATH_DEVICE_DATA}/{device_id}")
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequest<'a> {
    pub email: &'a str,
    pub refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshResponse {
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LocationRecord {
    pub id: String,
    pub name: String,
    pub address: String,
}

/// One element of `/deviceData`. The `data` map is decoded separately.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeviceDataRecord {
    pub id: String,
    pub location_id: String,
    pub name: String,
    pub model: String,
    pub firmware: String,
    pub online: bool,
    pub data: Map<String, Value>,
}

pub fn set_mode_data(mode: ThermostatMode) -> Value {
    json!({ "mode": mode.code() })
}

/// Home setpoint write. Caller guarantees at least one of `heat`/`cool`.
pub fn set_home_set_points_data(
    heat: Option<Temperature>,
    cool: Option<Temperature>,
    override_schedule: bool,
) -> Value {
    let mut body = Map::new();
    if let Some(h) = heat {
        body.insert("hspHome".to_string(), json!(h.celsius()));
    }
    if let Some(c) = cool {
        body.insert("cspHome".to_string(), json!(c.celsius()));
    }
    if override_schedule {
        body.insert("schedOverride".to_string(), json!(1));
    }
    Value::Object(body)
}

pub fn set_fan_mode_data(mode: FanMode) -> Value {
    json!({ "fanCirculate": mode.code() })
}

pub fn set_fan_speed_data(speed: FanSpeed) -> Value {
    json!({ "fanCirculateSpeed": speed.code() })
}
