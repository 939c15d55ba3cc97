//! Decoding of `/deviceData` records into [`Thermostat`] aggregates.
//!
//! The vendor `data` object is a flat map with hundreds of keys. Each
//! category of fields has its own schema struct below; a category is only
//! decoded when its unit-type field says the hardware is installed.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::protocol::{DeviceDataRecord, LocationRecord};
use crate::types::*;
use crate::{Error, Result};

/// Unit type value reported for an equipment category that is not installed.
const UNIT_ABSENT: u16 = 255;

/// Demand percentages are reported in half-percent steps.
const DEMAND_SCALE: f64 = 2.0;

#[derive(Debug, Deserialize)]
struct ThermostatData {
    #[serde(rename = "ctSystemCapHeat")]
    cap_heat: bool,
    #[serde(rename = "ctSystemCapCool")]
    cap_cool: bool,
    #[serde(rename = "ctSystemCapEmergencyHeat")]
    cap_emergency_heat: bool,
    mode: u8,
    #[serde(rename = "equipmentStatus")]
    status: u8,
    #[serde(rename = "fanCirculate")]
    fan_mode: u8,
    #[serde(rename = "fanCirculateSpeed")]
    fan_speed: u8,
    #[serde(rename = "schedEnabled")]
    schedule_enabled: bool,
    #[serde(rename = "tempIndoor")]
    temp_indoor: f64,
    #[serde(rename = "humIndoor")]
    hum_indoor: u8,
    #[serde(rename = "tempOutdoor")]
    temp_outdoor: Option<f64>,
    #[serde(rename = "humOutdoor")]
    hum_outdoor: Option<u8>,
    #[serde(rename = "hspActive")]
    hsp: f64,
    #[serde(rename = "EquipProtocolMinHeatSetpoint")]
    hsp_min: f64,
    #[serde(rename = "EquipProtocolMaxHeatSetpoint")]
    hsp_max: f64,
    #[serde(rename = "cspActive")]
    csp: f64,
    #[serde(rename = "EquipProtocolMinCoolSetpoint")]
    csp_min: f64,
    #[serde(rename = "EquipProtocolMaxCoolSetpoint")]
    csp_max: f64,
    #[serde(rename = "ctAHUnitType")]
    air_handler_type: u16,
    #[serde(rename = "ctIFCUnitType")]
    furnace_type: u16,
    #[serde(rename = "ctOutdoorUnitType")]
    outdoor_type: u16,
    #[serde(rename = "ctCoilUnitType")]
    coil_type: u16,
}

#[derive(Debug, Deserialize)]
struct AirHandlerData {
    #[serde(rename = "ctAHModelNoCharacter1_15")]
    model: String,
    #[serde(rename = "ctAHSerialNoCharacter1_15")]
    serial: String,
    #[serde(rename = "ctAHControlSoftwareVersion")]
    control_software_version: String,
    #[serde(rename = "ctAHMode")]
    mode: u8,
    #[serde(rename = "ctAHCurrentIndoorAirflow")]
    current_airflow: u32,
    #[serde(rename = "ctAHFanRequestedDemand")]
    fan_demand_requested: f64,
    #[serde(rename = "ctAHFanCurrentDemandStatus")]
    fan_demand_current: f64,
    #[serde(rename = "ctAHHeatRequestedDemand")]
    heat_demand_requested: f64,
    #[serde(rename = "ctAHHeatCurrentDemandStatus")]
    heat_demand_current: f64,
    #[serde(rename = "ctAHHumidificationRequestedDemand")]
    humidification_demand_requested: f64,
    #[serde(rename = "ctIndoorPower")]
    power: f64,
}

#[derive(Debug, Deserialize)]
struct FurnaceData {
    #[serde(rename = "ctIFCModelNoCharacter1_15")]
    model: String,
    #[serde(rename = "ctIFCSerialNoCharacter1_15")]
    serial: String,
    #[serde(rename = "ctIFCControlSoftwareVersion")]
    control_software_version: String,
    #[serde(rename = "ctIFCOperatingHeatMode")]
    mode: u8,
    #[serde(rename = "ctIFCIndoorBlowerAirflow")]
    current_airflow: u32,
    #[serde(rename = "ctIFCFanRequestedDemandPercent")]
    fan_demand_requested: f64,
    #[serde(rename = "ctIFCCurrentFanActualStatus")]
    fan_demand_current: f64,
    #[serde(rename = "ctIFCHeatRequestedDemandPercent")]
    heat_demand_requested: f64,
    #[serde(rename = "ctIFCCurrentHeatActualStatus")]
    heat_demand_current: f64,
    // absent on heat-only systems
    #[serde(rename = "ctIFCCoolRequestedDemandPercent")]
    cool_demand_requested: Option<f64>,
    #[serde(rename = "ctIFCCurrentCoolActualStatus")]
    cool_demand_current: Option<f64>,
    #[serde(rename = "ctIFCHumRequestedDemandPercent")]
    humidification_demand_requested: f64,
    #[serde(rename = "ctIFCDehumRequestedDemandPercent")]
    dehumidification_demand_requested: Option<f64>,
    #[serde(rename = "ctIndoorPower")]
    power: f64,
}

#[derive(Debug, Deserialize)]
struct OutdoorUnitData {
    #[serde(rename = "ctOutdoorModelNoCharacter1_15")]
    model: String,
    #[serde(rename = "ctOutdoorSerialNoCharacter1_15")]
    serial: String,
    #[serde(rename = "ctOutdoorControlSoftwareVersion")]
    control_software_version: String,
    #[serde(rename = "ctOutdoorInverterSoftwareVersion")]
    inverter_software_version: String,
    #[serde(rename = "ctOutdoorHeatMaxRPS")]
    heat_max_rps: u16,
    #[serde(rename = "ctOutdoorMode")]
    mode: u8,
    #[serde(rename = "ctTargetCompressorspeed")]
    compressor_speed_target: u32,
    #[serde(rename = "ctCurrentCompressorRPS")]
    compressor_speed_current: u32,
    #[serde(rename = "ctTargetODFanRPM")]
    fan_target_rpm: u32,
    #[serde(rename = "ctOutdoorFanRPM")]
    fan_rpm: u32,
    #[serde(rename = "ctOutdoorSuctionPressure")]
    suction_pressure_psi: u32,
    #[serde(rename = "ctOutdoorEEVOpening")]
    eev_opening_percent: u32,
    #[serde(rename = "ctReversingValve")]
    reversing_valve: u8,
    #[serde(rename = "ctOutdoorHeatRequestedDemand")]
    heat_demand: f64,
    #[serde(rename = "ctOutdoorCoolRequestedDemand")]
    cool_demand: f64,
    #[serde(rename = "ctOutdoorFanRequestedDemandPercentage")]
    fan_demand: f64,
    #[serde(rename = "ctOutdoorRequestedIndoorAirflow")]
    fan_demand_airflow: u32,
    #[serde(rename = "ctOutdoorDeHumidificationRequestedDemand")]
    dehumidify_demand: f64,
    #[serde(rename = "ctOutdoorAirTemperature")]
    air_temperature: f64,
    #[serde(rename = "ctOutdoorCoilTemperature")]
    coil_temperature: f64,
    #[serde(rename = "ctOutdoorDischargeTemperature")]
    discharge_temperature: f64,
    #[serde(rename = "ctOutdoorLiquidTemperature")]
    liquid_temperature: f64,
    #[serde(rename = "ctOutdoorDefrostSensorTemperature")]
    defrost_sensor_temperature: f64,
    #[serde(rename = "ctInverterFinTemp")]
    inverter_fin_temperature: f64,
    #[serde(rename = "ctOutdoorPower")]
    power: f64,
    #[serde(rename = "ctOutdoorCompressorCurrent")]
    compressor_current: f64,
    #[serde(rename = "ctOutdoorInverterCurrent")]
    inverter_current: f64,
    #[serde(rename = "ctOutdoorFanMotorCurrent")]
    fan_motor_current: f64,
    #[serde(rename = "ctCrankCaseHeaterOnOff")]
    crank_case_heater: u8,
    #[serde(rename = "ctDrainPanHeaterOnOff")]
    drain_pan_heater: u8,
    #[serde(rename = "ctPreHeatOnOff")]
    preheat_heater: u8,
}

#[derive(Debug, Deserialize)]
struct EevCoilData {
    #[serde(rename = "ctCoilModelNoCharacter1_15")]
    model: String,
    #[serde(rename = "ctCoilSerialNoCharacter1_15")]
    serial: String,
    #[serde(rename = "ctCoilControlSoftwareVersion")]
    control_software_version: String,
    #[serde(rename = "ctEEVCoilPressureSensor")]
    pressure_psi: u32,
    #[serde(rename = "ctEEVCoilSuperHeatValue")]
    superheat: f64,
    #[serde(rename = "ctEEVCoilSubCoolValue")]
    subcool: f64,
    #[serde(rename = "ctEEVCoilSuctionTemperature")]
    suction_temperature: f64,
}

fn from_value<T: DeserializeOwned>(value: &Value, prefix: &str) -> Result<T> {
    serde_path_to_error::deserialize(value).map_err(|e| {
        let path = e.path().to_string();
        let path = if path == "." { prefix.to_string() } else { format!("{prefix}.{path}") };
        Error::decode(path.trim_start_matches('.'), e.into_inner().to_string())
    })
}

fn code<T>(field: &str, raw: u8, map: impl FnOnce(u8) -> Option<T>) -> Result<T> {
    map(raw).ok_or_else(|| Error::decode(format!("data.{field}"), format!("unmapped code {raw}")))
}

fn demand(raw: f64) -> f64 {
    ((raw / DEMAND_SCALE) * 10.0).round() / 10.0
}

/// Vendor temperatures that arrive as tenths of a degree Fahrenheit.
fn deci_fahrenheit(raw: f64) -> Temperature {
    Temperature::from_fahrenheit(raw / 10.0)
}

pub(crate) fn decode_locations(payload: &Value) -> Result<BTreeMap<String, Location>> {
    let records: Vec<LocationRecord> = from_value(payload, "")?;
    Ok(records
        .into_iter()
        .map(|r| {
            (
                r.id.clone(),
                Location {
                    id: r.id,
                    name: r.name,
                    address: r.address,
                },
            )
        })
        .collect())
}

/// Decode the `/deviceData` collection. A malformed record is skipped and
/// logged; the call only fails when every record of a non-empty batch fails.
pub(crate) fn decode_thermostats(payload: &Value) -> Result<BTreeMap<String, Thermostat>> {
    let Value::Array(records) = payload else {
        return Err(Error::decode("", "expected an array of device records"));
    };

    let mut thermostats = BTreeMap::new();
    let mut first_error = None;

    for (idx, record) in records.iter().enumerate() {
        match decode_thermostat(record) {
            Ok(t) => {
                thermostats.insert(t.id.clone(), t);
            }
            Err(e) => {
                let id = record.get("id").and_then(|v| v.as_str()).unwrap_or("<unknown>");
                warn!(index = idx, device = id, "skipping undecodable device record: {e}");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if thermostats.is_empty() => Err(e),
        _ => {
            debug!(count = thermostats.len(), "decoded thermostats");
            Ok(thermostats)
        }
    }
}

pub(crate) fn decode_thermostat(record: &Value) -> Result<Thermostat> {
    let device: DeviceDataRecord = from_value(record, "")?;
    let data_value = Value::Object(device.data);
    let data: ThermostatData = from_value(&data_value, "data")?;

    let mut capabilities = BTreeSet::new();
    if data.cap_heat {
        capabilities.insert(Capability::Heat);
    }
    if data.cap_cool {
        capabilities.insert(Capability::Cool);
    }
    if data.cap_emergency_heat {
        capabilities.insert(Capability::EmergencyHeat);
    }

    let mut units = Vec::new();
    if data.air_handler_type < UNIT_ABSENT {
        units.push(Equipment::IndoorUnit(air_handler(&device.id, &data_value)?));
    }
    if data.furnace_type < UNIT_ABSENT {
        units.push(Equipment::IndoorUnit(furnace(&device.id, &data_value)?));
    }
    if data.outdoor_type < UNIT_ABSENT {
        units.push(Equipment::OutdoorUnit(outdoor_unit(&device.id, &data_value)?));
    }
    if data.coil_type < UNIT_ABSENT {
        units.push(Equipment::EevCoil(eev_coil(&device.id, &data_value)?));
    }

    let mut equipment = BTreeMap::new();
    for unit in units {
        let id = unit.id().to_string();
        if let Some(replaced) = equipment.insert(id.clone(), unit) {
            warn!(
                device = %device.id,
                equipment = %id,
                replaced = replaced.name(),
                "duplicate equipment id, keeping the later record"
            );
        }
    }

    Ok(Thermostat {
        id: device.id,
        location_id: device.location_id,
        name: device.name,
        model: device.model,
        firmware_version: device.firmware,
        online: device.online,
        capabilities,
        mode: code("mode", data.mode, ThermostatMode::from_code)?,
        status: code("equipmentStatus", data.status, ThermostatStatus::from_code)?,
        fan_mode: code("fanCirculate", data.fan_mode, FanMode::from_code)?,
        fan_speed: code("fanCirculateSpeed", data.fan_speed, FanSpeed::from_code)?,
        schedule: Schedule {
            enabled: data.schedule_enabled,
        },
        indoor_temperature: Temperature::from_celsius(data.temp_indoor),
        indoor_humidity: data.hum_indoor,
        outdoor_temperature: data.temp_outdoor.map(Temperature::from_celsius),
        outdoor_humidity: data.hum_outdoor,
        set_point_heat: Temperature::from_celsius(data.hsp),
        set_point_heat_min: Temperature::from_celsius(data.hsp_min),
        set_point_heat_max: Temperature::from_celsius(data.hsp_max),
        set_point_cool: Temperature::from_celsius(data.csp),
        set_point_cool_min: Temperature::from_celsius(data.csp_min),
        set_point_cool_max: Temperature::from_celsius(data.csp_max),
        equipment,
    })
}

fn air_handler(thermostat_id: &str, data: &Value) -> Result<IndoorUnit> {
    let d: AirHandlerData = from_value(data, "data")?;
    let model = d.model.trim().to_string();
    let serial = d.serial.trim().to_string();
    Ok(IndoorUnit {
        id: equipment_id(&model, &serial),
        thermostat_id: thermostat_id.to_string(),
        kind: IndoorUnitKind::AirHandler,
        name: "Air Handler".to_string(),
        model,
        serial,
        control_software_version: d.control_software_version.trim().to_string(),
        mode: d.mode,
        current_airflow: d.current_airflow,
        fan_demand_requested_percent: demand(d.fan_demand_requested),
        fan_demand_current_percent: demand(d.fan_demand_current),
        heat_demand_requested_percent: demand(d.heat_demand_requested),
        heat_demand_current_percent: demand(d.heat_demand_current),
        cool_demand_requested_percent: None,
        cool_demand_current_percent: None,
        humidification_demand_requested_percent: demand(d.humidification_demand_requested),
        dehumidification_demand_requested_percent: None,
        power_usage: d.power / 10.0,
    })
}

fn furnace(thermostat_id: &str, data: &Value) -> Result<IndoorUnit> {
    let d: FurnaceData = from_value(data, "data")?;
    let model = d.model.trim().to_string();
    let serial = d.serial.trim().to_string();
    Ok(IndoorUnit {
        id: equipment_id(&model, &serial),
        thermostat_id: thermostat_id.to_string(),
        kind: IndoorUnitKind::Furnace,
        name: "Furnace".to_string(),
        model,
        serial,
        control_software_version: d.control_software_version.trim().to_string(),
        mode: d.mode,
        current_airflow: d.current_airflow,
        fan_demand_requested_percent: demand(d.fan_demand_requested),
        fan_demand_current_percent: demand(d.fan_demand_current),
        heat_demand_requested_percent: demand(d.heat_demand_requested),
        heat_demand_current_percent: demand(d.heat_demand_current),
        cool_demand_requested_percent: d.cool_demand_requested.map(demand),
        cool_demand_current_percent: d.cool_demand_current.map(demand),
        humidification_demand_requested_percent: demand(d.humidification_demand_requested),
        dehumidification_demand_requested_percent: d.dehumidification_demand_requested.map(demand),
        power_usage: d.power / 10.0,
    })
}

fn outdoor_unit(thermostat_id: &str, data: &Value) -> Result<OutdoorUnit> {
    let d: OutdoorUnitData = from_value(data, "data")?;
    let model = d.model.trim().to_string();
    let serial = d.serial.trim().to_string();
    // a unit that reports a heating compressor limit is a heat pump
    let name = if d.heat_max_rps != 0 && d.heat_max_rps != u16::MAX {
        "Heat Pump"
    } else {
        "Condensing Unit"
    };
    Ok(OutdoorUnit {
        id: equipment_id(&model, &serial),
        thermostat_id: thermostat_id.to_string(),
        name: name.to_string(),
        model,
        serial,
        control_software_version: d.control_software_version.trim().to_string(),
        inverter_software_version: d.inverter_software_version.trim().to_string(),
        mode: d.mode,
        compressor_speed_target: d.compressor_speed_target,
        compressor_speed_current: d.compressor_speed_current,
        outdoor_fan_target_rpm: d.fan_target_rpm * 10,
        outdoor_fan_rpm: d.fan_rpm * 10,
        suction_pressure_psi: d.suction_pressure_psi,
        eev_opening_percent: d.eev_opening_percent,
        reversing_valve: code("ctReversingValve", d.reversing_valve, ReversingValve::from_code)?,
        heat_demand_percent: demand(d.heat_demand),
        cool_demand_percent: demand(d.cool_demand),
        fan_demand_percent: demand(d.fan_demand),
        fan_demand_airflow: d.fan_demand_airflow,
        dehumidify_demand_percent: demand(d.dehumidify_demand),
        air_temperature: deci_fahrenheit(d.air_temperature),
        coil_temperature: deci_fahrenheit(d.coil_temperature),
        discharge_temperature: deci_fahrenheit(d.discharge_temperature),
        liquid_temperature: deci_fahrenheit(d.liquid_temperature),
        defrost_sensor_temperature: deci_fahrenheit(d.defrost_sensor_temperature),
        inverter_fin_temperature: Temperature::from_celsius(d.inverter_fin_temperature),
        power_usage: d.power * 10.0,
        compressor_amps: d.compressor_current / 10.0,
        inverter_amps: d.inverter_current / 10.0,
        fan_motor_amps: d.fan_motor_current / 10.0,
        crank_case_heater: code("ctCrankCaseHeaterOnOff", d.crank_case_heater, HeaterStatus::from_code)?,
        drain_pan_heater: code("ctDrainPanHeaterOnOff", d.drain_pan_heater, HeaterStatus::from_code)?,
        preheat_heater: code("ctPreHeatOnOff", d.preheat_heater, HeaterStatus::from_code)?,
    })
}

fn eev_coil(thermostat_id: &str, data: &Value) -> Result<EevCoil> {
    let d: EevCoilData = from_value(data, "data")?;
    let model = d.model.trim().to_string();
    let serial = d.serial.trim().to_string();
    Ok(EevCoil {
        id: equipment_id(&model, &serial),
        thermostat_id: thermostat_id.to_string(),
        name: "EEV Coil".to_string(),
        model,
        serial,
        control_software_version: d.control_software_version.trim().to_string(),
        pressure_psi: d.pressure_psi,
        indoor_superheat_temperature: deci_fahrenheit(d.superheat),
        liquid_subcool_temperature: deci_fahrenheit(d.subcool),
        suction_temperature: deci_fahrenheit(d.suction_temperature),
    })
}
