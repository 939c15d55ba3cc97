use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Deserialize;

/// Temperature stored as Celsius internally, rounded to one decimal place.
/// Every accessor rounds again so conversions never leak float noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature(f64);

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

impl Temperature {
    pub fn from_celsius(c: f64) -> Self {
        Self(round1(c))
    }

    pub fn from_fahrenheit(f: f64) -> Self {
        Self(round1((f - 32.0) * 5.0 / 9.0))
    }

    pub fn from_kelvin(k: f64) -> Self {
        Self(round1(k - 273.15))
    }

    pub fn celsius(&self) -> f64 {
        round1(self.0)
    }

    pub fn fahrenheit(&self) -> f64 {
        round1(self.0 * 9.0 / 5.0 + 32.0)
    }

    pub fn kelvin(&self) -> f64 {
        round1(self.0 + 273.15)
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}C", self.0)
    }
}

/// Account credentials for the Daikin cloud service.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Read credentials from `DAIKIN_EMAIL` and `DAIKIN_PASSWORD`.
    pub fn from_env() -> Option<Self> {
        let email = std::env::var("DAIKIN_EMAIL").ok()?;
        let password = std::env::var("DAIKIN_PASSWORD").ok()?;
        Some(Self { email, password })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    Heat,
    Cool,
    EmergencyHeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThermostatMode {
    Off,
    Heat,
    Cool,
    Auto,
    AuxHeat,
}

impl ThermostatMode {
    pub fn code(&self) -> u8 {
        match self {
            ThermostatMode::Off => 0,
            ThermostatMode::Heat => 1,
            ThermostatMode::Cool => 2,
            ThermostatMode::Auto => 3,
            ThermostatMode::AuxHeat => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ThermostatMode::Off),
            1 => Some(ThermostatMode::Heat),
            2 => Some(ThermostatMode::Cool),
            3 => Some(ThermostatMode::Auto),
            4 => Some(ThermostatMode::AuxHeat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermostatStatus {
    Cooling,
    Drying,
    Heating,
    CirculatingAir,
    Idle,
}

impl ThermostatStatus {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ThermostatStatus::Cooling),
            2 => Some(ThermostatStatus::Drying),
            3 => Some(ThermostatStatus::Heating),
            4 => Some(ThermostatStatus::CirculatingAir),
            5 => Some(ThermostatStatus::Idle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanMode {
    Off,
    AlwaysOn,
    Scheduled,
}

impl FanMode {
    pub fn code(&self) -> u8 {
        match self {
            FanMode::Off => 0,
            FanMode::AlwaysOn => 1,
            FanMode::Scheduled => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(FanMode::Off),
            1 => Some(FanMode::AlwaysOn),
            2 => Some(FanMode::Scheduled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanSpeed {
    Low,
    Medium,
    High,
}

impl FanSpeed {
    pub fn code(&self) -> u8 {
        match self {
            FanSpeed::Low => 0,
            FanSpeed::Medium => 1,
            FanSpeed::High => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(FanSpeed::Low),
            1 => Some(FanSpeed::Medium),
            2 => Some(FanSpeed::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReversingValve {
    Off,
    On,
    Unknown,
}

impl ReversingValve {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ReversingValve::Off),
            1 => Some(ReversingValve::On),
            255 => Some(ReversingValve::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterStatus {
    Off,
    On,
}

impl HeaterStatus {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(HeaterStatus::Off),
            1 => Some(HeaterStatus::On),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Schedule {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Thermostat {
    pub id: String,
    pub location_id: String,
    pub name: String,
    pub model: String,
    pub firmware_version: String,
    pub online: bool,
    pub capabilities: BTreeSet<Capability>,
    pub mode: ThermostatMode,
    pub status: ThermostatStatus,
    pub fan_mode: FanMode,
    pub fan_speed: FanSpeed,
    pub schedule: Schedule,
    pub indoor_temperature: Temperature,
    pub indoor_humidity: u8,
    pub outdoor_temperature: Option<Temperature>,
    pub outdoor_humidity: Option<u8>,
    pub set_point_heat: Temperature,
    pub set_point_heat_min: Temperature,
    pub set_point_heat_max: Temperature,
    pub set_point_cool: Temperature,
    pub set_point_cool_min: Temperature,
    pub set_point_cool_max: Temperature,
    pub equipment: BTreeMap<String, Equipment>,
}

impl Thermostat {
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Modes the user may select, derived from capabilities. Aux heat is
    /// only reachable through the emergency heat preset.
    pub fn available_modes(&self) -> Vec<ThermostatMode> {
        let heat = self.has_capability(Capability::Heat);
        let cool = self.has_capability(Capability::Cool);
        let mut modes = Vec::new();
        if heat && cool {
            modes.push(ThermostatMode::Auto);
        }
        if heat {
            modes.push(ThermostatMode::Heat);
        }
        if cool {
            modes.push(ThermostatMode::Cool);
        }
        modes.push(ThermostatMode::Off);
        modes
    }

    /// Lowest temperature accepted for either setpoint.
    pub fn min_set_point(&self) -> Temperature {
        if self.set_point_heat_min.celsius() >= self.set_point_cool_min.celsius() {
            self.set_point_heat_min
        } else {
            self.set_point_cool_min
        }
    }

    /// Highest temperature accepted for either setpoint.
    pub fn max_set_point(&self) -> Temperature {
        if self.set_point_heat_max.celsius() <= self.set_point_cool_max.celsius() {
            self.set_point_heat_max
        } else {
            self.set_point_cool_max
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndoorUnitKind {
    AirHandler,
    Furnace,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndoorUnit {
    pub id: String,
    pub thermostat_id: String,
    pub kind: IndoorUnitKind,
    pub name: String,
    pub model: String,
    pub serial: String,
    pub control_software_version: String,
    pub mode: u8,
    pub current_airflow: u32,
    pub fan_demand_requested_percent: f64,
    pub fan_demand_current_percent: f64,
    pub heat_demand_requested_percent: f64,
    pub heat_demand_current_percent: f64,
    pub cool_demand_requested_percent: Option<f64>,
    pub cool_demand_current_percent: Option<f64>,
    pub humidification_demand_requested_percent: f64,
    pub dehumidification_demand_requested_percent: Option<f64>,
    pub power_usage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutdoorUnit {
    pub id: String,
    pub thermostat_id: String,
    pub name: String,
    pub model: String,
    pub serial: String,
    pub control_software_version: String,
    pub inverter_software_version: String,
    pub mode: u8,
    pub compressor_speed_target: u32,
    pub compressor_speed_current: u32,
    pub outdoor_fan_target_rpm: u32,
    pub outdoor_fan_rpm: u32,
    pub suction_pressure_psi: u32,
    pub eev_opening_percent: u32,
    pub reversing_valve: ReversingValve,
    pub heat_demand_percent: f64,
    pub cool_demand_percent: f64,
    pub fan_demand_percent: f64,
    pub fan_demand_airflow: u32,
    pub dehumidify_demand_percent: f64,
    pub air_temperature: Temperature,
    pub coil_temperature: Temperature,
    pub discharge_temperature: Temperature,
    pub liquid_temperature: Temperature,
    pub defrost_sensor_temperature: Temperature,
    pub inverter_fin_temperature: Temperature,
    pub power_usage: f64,
    pub compressor_amps: f64,
    pub inverter_amps: f64,
    pub fan_motor_amps: f64,
    pub crank_case_heater: HeaterStatus,
    pub drain_pan_heater: HeaterStatus,
    pub preheat_heater: HeaterStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EevCoil {
    pub id: String,
    pub thermostat_id: String,
    pub name: String,
    pub model: String,
    pub serial: String,
    pub control_software_version: String,
    pub pressure_psi: u32,
    pub indoor_superheat_temperature: Temperature,
    pub liquid_subcool_temperature: Temperature,
    pub suction_temperature: Temperature,
}

/// Hardware reported through a thermostat. The thermostat owns the map;
/// `thermostat_id` is a lookup key back to it.
#[derive(Debug, Clone, PartialEq)]
pub enum Equipment {
    IndoorUnit(IndoorUnit),
    OutdoorUnit(OutdoorUnit),
    EevCoil(EevCoil),
}

impl Equipment {
    pub fn id(&self) -> &str {
        match self {
            Equipment::IndoorUnit(u) => &u.id,
            Equipment::OutdoorUnit(u) => &u.id,
            Equipment::EevCoil(c) => &c.id,
        }
    }

    pub fn thermostat_id(&self) -> &str {
        match self {
            Equipment::IndoorUnit(u) => &u.thermostat_id,
            Equipment::OutdoorUnit(u) => &u.thermostat_id,
            Equipment::EevCoil(c) => &c.thermostat_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Equipment::IndoorUnit(u) => &u.name,
            Equipment::OutdoorUnit(u) => &u.name,
            Equipment::EevCoil(c) => &c.name,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Equipment::IndoorUnit(u) => &u.model,
            Equipment::OutdoorUnit(u) => &u.model,
            Equipment::EevCoil(c) => &c.model,
        }
    }
}

/// Synthetic equipment id built from padded model and serial strings.
pub fn equipment_id(model: &str, serial: &str) -> String {
    format!("{}-{}", model.trim(), serial.trim())
}

/// Preset modes layered on top of the hvac mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    None,
    EmergencyHeat,
}

/// Fan choices as presented to a user: circulation modes and fixed speeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanSetting {
    Off,
    AlwaysOn,
    Scheduled,
    Low,
    Medium,
    High,
}

/// Target temperature request from a user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetTemperature {
    /// One target, applied to whichever setpoint the current mode uses.
    Single(Temperature),
    /// Heat (low) and/or cool (high) setpoints.
    Range {
        low: Option<Temperature>,
        high: Option<Temperature>,
    },
}
