#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use daikin_one::{Credentials, DaikinOne, DaikinOneBuilder};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const THERMOSTAT_ID: &str = "t1";

/// Heat pump, air handler and EEV coil; no furnace.
pub fn device_record(id: &str) -> Value {
    json!({
        "id": id,
        "locationId": "loc-1",
        "name": "Hallway",
        "model": "ONEPLUS",
        "firmware": "3.2.1",
        "online": true,
        "data": {
            "ctSystemCapHeat": true,
            "ctSystemCapCool": true,
            "ctSystemCapEmergencyHeat": true,
            "mode": 1,
            "equipmentStatus": 3,
            "fanCirculate": 2,
            "fanCirculateSpeed": 1,
            "schedEnabled": true,
            "tempIndoor": 21.54,
            "humIndoor": 41,
            "tempOutdoor": 3.0,
            "humOutdoor": 80,
            "hspActive": 21.0,
            "EquipProtocolMinHeatSetpoint": 10.0,
            "EquipProtocolMaxHeatSetpoint": 32.0,
            "cspActive": 25.5,
            "EquipProtocolMinCoolSetpoint": 12.0,
            "EquipProtocolMaxCoolSetpoint": 35.0,
            "ctAHUnitType": 3,
            "ctAHModelNoCharacter1_15": "MBVC2400AA-1  ",
            "ctAHSerialNoCharacter1_15": "  1903456789",
            "ctAHControlSoftwareVersion": "2.04 ",
            "ctAHMode": 2,
            "ctAHCurrentIndoorAirflow": 820,
            "ctAHFanRequestedDemand": 101,
            "ctAHFanCurrentDemandStatus": 100,
            "ctAHHeatRequestedDemand": 150,
            "ctAHHeatCurrentDemandStatus": 149,
            "ctAHHumidificationRequestedDemand": 0,
            "ctIndoorPower": 1234,
            "ctIFCUnitType": 255,
            "ctOutdoorUnitType": 10,
            "ctOutdoorModelNoCharacter1_15": "DZ9VC0361A ",
            "ctOutdoorSerialNoCharacter1_15": "2004123456 ",
            "ctOutdoorControlSoftwareVersion": "1.10",
            "ctOutdoorInverterSoftwareVersion": "0.55",
            "ctOutdoorHeatMaxRPS": 96,
            "ctOutdoorMode": 3,
            "ctTargetCompressorspeed": 44,
            "ctCurrentCompressorRPS": 43,
            "ctTargetODFanRPM": 60,
            "ctOutdoorFanRPM": 59,
            "ctOutdoorSuctionPressure": 110,
            "ctOutdoorEEVOpening": 35,
            "ctReversingValve": 1,
            "ctOutdoorHeatRequestedDemand": 120,
            "ctOutdoorCoolRequestedDemand": 0,
            "ctOutdoorFanRequestedDemandPercentage": 81,
            "ctOutdoorRequestedIndoorAirflow": 800,
            "ctOutdoorDeHumidificationRequestedDemand": 0,
            "ctOutdoorAirTemperature": 374,
            "ctOutdoorCoilTemperature": 302,
            "ctOutdoorDischargeTemperature": 1500,
            "ctOutdoorLiquidTemperature": 900,
            "ctOutdoorDefrostSensorTemperature": 320,
            "ctInverterFinTemp": 41.0,
            "ctOutdoorPower": 95,
            "ctOutdoorCompressorCurrent": 62,
            "ctOutdoorInverterCurrent": 70,
            "ctOutdoorFanMotorCurrent": 5,
            "ctCrankCaseHeaterOnOff": 0,
            "ctDrainPanHeaterOnOff": 1,
            "ctPreHeatOnOff": 0,
            "ctCoilUnitType": 2,
            "ctCoilModelNoCharacter1_15": "CAPEA3626B3",
            "ctCoilSerialNoCharacter1_15": "1911000001",
            "ctCoilControlSoftwareVersion": "1.01",
            "ctEEVCoilPressureSensor": 120,
            "ctEEVCoilSuperHeatValue": 100,
            "ctEEVCoilSubCoolValue": 50,
            "ctEEVCoilSuctionTemperature": 450
        }
    })
}

/// Copy of `record` with `data[key]` replaced.
pub fn with_data(mut record: Value, key: &str, value: Value) -> Value {
    record["data"][key] = value;
    record
}

pub async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/users/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "access-1",
            "refreshToken": "refresh-1",
            "accessTokenExpiresIn": 3600,
            "tokenType": "Bearer"
        })))
        .mount(server)
        .await;
}

pub async fn mount_locations(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/locations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "loc-1", "name": "Home", "address": "1 Main St" }
        ])))
        .mount(server)
        .await;
}

pub fn device_data_response(records: Vec<Value>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(Value::Array(records))
}

pub async fn mount_device_data(server: &MockServer, records: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/deviceData"))
        .respond_with(device_data_response(records))
        .mount(server)
        .await;
}

pub async fn mount_put_ok(server: &MockServer) {
    Mock::given(method("PUT"))
        .and(path(format!("/deviceData/{THERMOSTAT_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(server)
        .await;
}

pub fn builder(server: &MockServer) -> DaikinOneBuilder {
    DaikinOne::builder(Credentials::new("user@example.com", "hunter2"))
        .base_url(server.uri())
        .confirm_timeout(Duration::from_secs(5))
        .confirm_interval(Duration::from_millis(10))
}

/// Client with a populated cache.
pub async fn ready_client(server: &MockServer) -> Arc<DaikinOne> {
    let client = Arc::new(builder(server).build().unwrap());
    client.update(true).await.expect("initial update should succeed");
    client
}

pub async fn count_requests(server: &MockServer, http_method: &str, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == http_method && r.url.path() == request_path)
        .count()
}

pub async fn put_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == "PUT")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}
