#![recursion_limit = "256"]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use daikin_one::{
    Credentials, DaikinOne, Equipment, Error, FanMode, FanSpeed, MessageLogMode, Temperature,
    ThermostatMode, ThermostatStatus,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn update_populates_cache() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_locations(&server).await;
    mount_device_data(&server, vec![device_record(THERMOSTAT_ID)]).await;

    let client = ready_client(&server).await;

    let location = client.location("loc-1").expect("location should be cached");
    assert_eq!(location.name, "Home");

    let t = client.thermostat(THERMOSTAT_ID).expect("thermostat should be cached");
    assert_eq!(t.location_id, "loc-1");
    assert_eq!(t.mode, ThermostatMode::Heat);
    assert_eq!(t.status, ThermostatStatus::Heating);
    assert_eq!(t.fan_mode, FanMode::Scheduled);
    assert_eq!(t.fan_speed, FanSpeed::Medium);
    assert_eq!(t.indoor_temperature, Temperature::from_celsius(21.5));
    assert_eq!(t.set_point_cool, Temperature::from_celsius(25.5));

    let names: Vec<&str> = t.equipment.values().map(Equipment::name).collect();
    assert_eq!(names.len(), 3);
    assert!(names.contains(&"Air Handler"));
    assert!(names.contains(&"Heat Pump"));
    assert!(names.contains(&"EEV Coil"));
}

#[tokio::test]
async fn login_sends_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users/auth/login"))
        .and(body_json(json!({"email": "user@example.com", "password": "hunter2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "a", "refreshToken": "r"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = builder(&server).build().unwrap();
    assert!(!client.is_authenticated().await);
    assert!(client.login().await);
    assert!(client.is_authenticated().await);
}

#[tokio::test]
async fn rejected_login_reports_false() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users/auth/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = builder(&server).build().unwrap();
    assert!(!client.login().await);
    assert!(!client.is_authenticated().await);
}

#[tokio::test]
async fn persistent_401_retries_exactly_once() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/users/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "access-2"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/deviceData"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .expect(2)
        .mount(&server)
        .await;

    let client = builder(&server).build().unwrap();
    let err = client.all_raw_device_data().await.unwrap_err();
    assert!(
        matches!(err, Error::Service { status: 401, .. }),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn retry_after_refresh_uses_new_token() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/users/auth/token"))
        .and(body_json(json!({"email": "user@example.com", "refreshToken": "refresh-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "access-2"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/deviceData"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/deviceData"))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(device_data_response(vec![device_record(THERMOSTAT_ID)]))
        .expect(1)
        .mount(&server)
        .await;

    let client = builder(&server).build().unwrap();
    let payload = client.all_raw_device_data().await.unwrap();
    assert_eq!(payload[0]["id"], THERMOSTAT_ID);
}

#[tokio::test]
async fn failed_login_still_sends_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users/auth/login"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/deviceData"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&server)
        .await;

    let client = builder(&server).build().unwrap();
    match client.all_raw_device_data().await {
        Err(Error::Service { status, body }) => {
            assert_eq!(status, 403);
            assert_eq!(body, "forbidden");
        }
        other => panic!("expected service error, got {other:?}"),
    }
}

#[tokio::test]
async fn outdoor_unit_follows_unit_type() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_locations(&server).await;
    let without = with_data(device_record("t2"), "ctOutdoorUnitType", json!(255));
    let condensing = with_data(device_record("t3"), "ctOutdoorHeatMaxRPS", json!(65535));
    mount_device_data(&server, vec![device_record(THERMOSTAT_ID), without, condensing]).await;

    let client = ready_client(&server).await;

    let with_unit = client.thermostat(THERMOSTAT_ID).unwrap();
    let outdoor = with_unit
        .equipment
        .get("DZ9VC0361A-2004123456")
        .expect("outdoor unit should be decoded");
    assert_eq!(outdoor.name(), "Heat Pump");

    let without_unit = client.thermostat("t2").unwrap();
    assert_eq!(without_unit.equipment.len(), 2);
    assert!(
        !without_unit
            .equipment
            .values()
            .any(|e| matches!(e, Equipment::OutdoorUnit(_)))
    );

    let condensing = client.thermostat("t3").unwrap();
    assert_eq!(
        condensing.equipment["DZ9VC0361A-2004123456"].name(),
        "Condensing Unit"
    );
}

#[tokio::test]
async fn malformed_record_does_not_drop_batch() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_locations(&server).await;
    let broken = with_data(device_record("bad"), "mode", json!("heat"));
    mount_device_data(&server, vec![broken, device_record(THERMOSTAT_ID)]).await;

    let client = ready_client(&server).await;
    assert!(client.thermostat("bad").is_none());
    assert!(client.thermostat(THERMOSTAT_ID).is_some());
}

#[tokio::test]
async fn all_records_malformed_is_decode_error() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_locations(&server).await;
    let broken = with_data(device_record("bad"), "equipmentStatus", json!(42));
    mount_device_data(&server, vec![broken]).await;

    let client = builder(&server).build().unwrap();
    let err = client.update(true).await.unwrap_err();
    assert!(err.is_decode(), "unexpected error: {err}");
    assert!(err.to_string().contains("data.equipmentStatus"), "{err}");
}

#[tokio::test]
async fn throttled_update_skips_network() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_locations(&server).await;
    Mock::given(method("GET"))
        .and(path("/deviceData"))
        .respond_with(device_data_response(vec![device_record(THERMOSTAT_ID)]))
        .expect(2)
        .mount(&server)
        .await;

    let client = builder(&server)
        .min_update_interval(Duration::from_secs(60))
        .build()
        .unwrap();
    client.update(false).await.unwrap();
    client.update(false).await.unwrap();
    client.update(true).await.unwrap();
}

#[tokio::test]
async fn cached_copies_are_independent() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_locations(&server).await;
    mount_device_data(&server, vec![device_record(THERMOSTAT_ID)]).await;

    let client = ready_client(&server).await;
    let mut copy = client.thermostat(THERMOSTAT_ID).unwrap();
    copy.mode = ThermostatMode::Off;
    copy.name.push_str(" (edited)");
    copy.equipment.clear();

    let mut all = client.thermostats();
    all.clear();

    let fresh = client.thermostat(THERMOSTAT_ID).unwrap();
    assert_eq!(fresh.mode, ThermostatMode::Heat);
    assert_eq!(fresh.name, "Hallway");
    assert_eq!(fresh.equipment.len(), 3);
    assert_eq!(client.thermostats().len(), 1);
}

#[tokio::test]
async fn command_bodies_use_vendor_fields() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_locations(&server).await;
    mount_device_data(&server, vec![device_record(THERMOSTAT_ID)]).await;
    for body in [
        json!({"mode": 2}),
        json!({"hspHome": 20.5, "cspHome": 24.0, "schedOverride": 1}),
        json!({"cspHome": 23.5}),
        json!({"fanCirculate": 1}),
        json!({"fanCirculateSpeed": 2}),
    ] {
        Mock::given(method("PUT"))
            .and(path("/deviceData/t1"))
            .and(body_json(body))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = ready_client(&server).await;
    client
        .set_thermostat_mode(THERMOSTAT_ID, ThermostatMode::Cool)
        .await
        .unwrap();
    client
        .set_thermostat_home_set_points(
            THERMOSTAT_ID,
            Some(Temperature::from_celsius(20.5)),
            Some(Temperature::from_celsius(24.0)),
            true,
        )
        .await
        .unwrap();
    client
        .set_thermostat_home_set_points(
            THERMOSTAT_ID,
            None,
            Some(Temperature::from_celsius(23.5)),
            false,
        )
        .await
        .unwrap();
    client
        .set_thermostat_fan_mode(THERMOSTAT_ID, FanMode::AlwaysOn)
        .await
        .unwrap();
    client
        .set_thermostat_fan_speed(THERMOSTAT_ID, FanSpeed::High)
        .await
        .unwrap();
}

#[tokio::test]
async fn command_to_unknown_thermostat_sends_nothing() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_locations(&server).await;
    mount_device_data(&server, vec![device_record(THERMOSTAT_ID)]).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = ready_client(&server).await;
    let err = client
        .set_thermostat_mode("missing", ThermostatMode::Off)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownThermostat(ref id) if id == "missing"));
}

#[tokio::test]
async fn set_points_require_a_value() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_locations(&server).await;
    mount_device_data(&server, vec![device_record(THERMOSTAT_ID)]).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = ready_client(&server).await;
    let err = client
        .set_thermostat_home_set_points(THERMOSTAT_ID, None, None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn rejected_command_is_service_error() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_locations(&server).await;
    mount_device_data(&server, vec![device_record(THERMOSTAT_ID)]).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad mode"))
        .mount(&server)
        .await;

    let client = ready_client(&server).await;
    let err = client
        .set_thermostat_mode(THERMOSTAT_ID, ThermostatMode::Auto)
        .await
        .unwrap_err();
    assert!(err.is_service());
    assert_eq!(err.to_string(), "service error 400: bad mode");
}

#[tokio::test]
async fn message_log_captures_polls_and_commands() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_locations(&server).await;
    mount_device_data(&server, vec![device_record(THERMOSTAT_ID)]).await;
    mount_put_ok(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("messages.ndjson");

    let client = builder(&server)
        .message_log(MessageLogMode::Full, log_path.to_str().unwrap())
        .build()
        .unwrap();
    client.update(true).await.unwrap();
    client
        .set_thermostat_mode(THERMOSTAT_ID, ThermostatMode::Cool)
        .await
        .unwrap();

    let content = std::fs::read_to_string(&log_path).unwrap();
    let entries: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    let poll = entries
        .iter()
        .find(|e| e["dir"] == "poll")
        .expect("poll entry expected");
    assert_eq!(poll["path"], "/deviceData");
    assert_eq!(poll["body"][0]["id"], THERMOSTAT_ID);

    let cmd = entries
        .iter()
        .find(|e| e["dir"] == "cmd")
        .expect("command entry expected");
    assert_eq!(cmd["action"], "set_thermostat_mode");
    assert_eq!(cmd["thermostat"], THERMOSTAT_ID);
    assert_eq!(cmd["body"], json!({"mode": 2}));

    // credentials never reach the log
    assert!(!content.contains("hunter2"));
}

#[tokio::test]
async fn slow_refresh_does_not_overwrite_newer_one() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_locations(&server).await;
    let stale = with_data(device_record(THERMOSTAT_ID), "mode", json!(0));
    Mock::given(method("GET"))
        .and(path("/deviceData"))
        .respond_with(device_data_response(vec![stale]).set_delay(Duration::from_millis(500)))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_device_data(&server, vec![device_record(THERMOSTAT_ID)]).await;

    let client = Arc::new(builder(&server).build().unwrap());
    let slow = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.update(true).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.update(true).await.unwrap();
    assert_eq!(client.thermostat(THERMOSTAT_ID).unwrap().mode, ThermostatMode::Heat);

    slow.await.unwrap().unwrap();
    assert_eq!(client.thermostat(THERMOSTAT_ID).unwrap().mode, ThermostatMode::Heat);
    assert_eq!(count_requests(&server, "GET", "/deviceData").await, 2);
}

#[tokio::test]
async fn unreachable_service_is_transport_error() {
    let client = DaikinOne::builder(Credentials::new("user@example.com", "hunter2"))
        .base_url("http://127.0.0.1:9")
        .build()
        .unwrap();

    let err = client.all_raw_device_data().await.unwrap_err();
    assert!(matches!(err, Error::Http(_)), "unexpected error: {err}");
    assert!(!err.is_service());
    assert!(!client.is_authenticated().await);
}
