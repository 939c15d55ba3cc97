use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde_json::Value;
use tracing::debug;

use crate::auth::AuthManager;
use crate::cache::DeviceCache;
use crate::entity::ThermostatEntity;
use crate::logger::{with_logger, MessageLogMode, MessageLogger, SharedLogger};
use crate::protocol::{
    device_data_path, set_fan_mode_data, set_fan_speed_data, set_home_set_points_data,
    set_mode_data, DEFAULT_BASE_URL, PATH_DEVICE_DATA,
};
use crate::transport::Transport;
use crate::types::*;
use crate::{Error, Result};

const DEFAULT_MIN_UPDATE_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONFIRM_INTERVAL: Duration = Duration::from_secs(1);

/// How long an optimistic write waits for the remote state to catch up.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmPolicy {
    /// Wall-clock budget for the whole confirmation loop.
    pub timeout: Duration,
    /// Pause between confirmation polls.
    pub interval: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CONFIRM_TIMEOUT,
            interval: DEFAULT_CONFIRM_INTERVAL,
        }
    }
}

pub struct DaikinOneBuilder {
    credentials: Credentials,
    base_url: String,
    min_update_interval: Duration,
    confirm: ConfirmPolicy,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl DaikinOneBuilder {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
            min_update_interval: DEFAULT_MIN_UPDATE_INTERVAL,
            confirm: ConfirmPolicy::default(),
            log_mode: None,
            log_path: None,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Minimum time between two throttled `update` calls.
    pub fn min_update_interval(mut self, interval: Duration) -> Self {
        self.min_update_interval = interval;
        self
    }

    pub fn confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm.timeout = timeout;
        self
    }

    pub fn confirm_interval(mut self, interval: Duration) -> Self {
        self.confirm.interval = interval;
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<DaikinOne> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder().default_headers(headers).build()?;

        let logger: Option<SharedLogger> = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(Arc::new(Mutex::new(MessageLogger::new(mode, &path)?))),
            _ => None,
        };

        let auth = AuthManager::new(
            http.clone(),
            self.base_url.clone(),
            self.credentials,
            logger.clone(),
        );

        Ok(DaikinOne {
            transport: Transport::new(http, self.base_url, auth, logger),
            cache: DeviceCache::new(self.min_update_interval),
            write_locks: Mutex::new(HashMap::new()),
            confirm: self.confirm,
        })
    }
}

/// Connection to the Daikin One cloud for one account.
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct DaikinOne {
    transport: Transport,
    cache: DeviceCache,
    write_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    confirm: ConfirmPolicy,
}

impl DaikinOne {
    pub fn builder(credentials: Credentials) -> DaikinOneBuilder {
        DaikinOneBuilder::new(credentials)
    }

    /// Log in with the configured credentials. Useful to validate them
    /// before the first poll.
    pub async fn login(&self) -> bool {
        self.transport.auth().login().await
    }

    /// Replace the access token, logging in first when there is no session.
    pub async fn refresh_token(&self) -> bool {
        self.transport.auth().refresh_token().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.transport.auth().is_authenticated().await
    }

    /// Refresh locations and thermostats. Throttled to the configured
    /// minimum interval unless `no_throttle` is set.
    pub async fn update(&self, no_throttle: bool) -> Result<()> {
        debug!(no_throttle, "updating Daikin One data from cloud");
        self.cache.update(&self.transport, no_throttle).await?;
        Ok(())
    }

    pub fn location(&self, id: &str) -> Option<Location> {
        self.cache.location(id)
    }

    pub fn locations(&self) -> BTreeMap<String, Location> {
        self.cache.locations()
    }

    pub fn thermostat(&self, id: &str) -> Option<Thermostat> {
        self.cache.thermostat(id)
    }

    pub fn thermostats(&self) -> BTreeMap<String, Thermostat> {
        self.cache.thermostats()
    }

    /// Entity handle for one cached thermostat.
    pub fn entity(self: &Arc<Self>, thermostat_id: &str) -> Result<ThermostatEntity> {
        ThermostatEntity::new(Arc::clone(self), thermostat_id)
    }

    pub async fn raw_device_data(&self, thermostat_id: &str) -> Result<Value> {
        self.transport.get(&device_data_path(thermostat_id)).await
    }

    pub async fn all_raw_device_data(&self) -> Result<Value> {
        self.transport.get(PATH_DEVICE_DATA).await
    }

    // -- Command methods --

    pub async fn set_thermostat_mode(&self, thermostat_id: &str, mode: ThermostatMode) -> Result<()> {
        let data = set_mode_data(mode);
        self.send_command("set_thermostat_mode", thermostat_id, data).await
    }

    /// Write the home heat and/or cool setpoints. `override_schedule` holds
    /// the new values against the running schedule.
    pub async fn set_thermostat_home_set_points(
        &self,
        thermostat_id: &str,
        heat: Option<Temperature>,
        cool: Option<Temperature>,
        override_schedule: bool,
    ) -> Result<()> {
        if heat.is_none() && cool.is_none() {
            return Err(Error::Validation(
                "at least one of heat or cool set points must be given".to_string(),
            ));
        }
        let data = set_home_set_points_data(heat, cool, override_schedule);
        self.send_command("set_thermostat_home_set_points", thermostat_id, data)
            .await
    }

    pub async fn set_thermostat_fan_mode(&self, thermostat_id: &str, mode: FanMode) -> Result<()> {
        let data = set_fan_mode_data(mode);
        self.send_command("set_thermostat_fan_mode", thermostat_id, data).await
    }

    pub async fn set_thermostat_fan_speed(&self, thermostat_id: &str, speed: FanSpeed) -> Result<()> {
        let data = set_fan_speed_data(speed);
        self.send_command("set_thermostat_fan_speed", thermostat_id, data).await
    }

    // -- Helpers --

    pub(crate) fn confirm_policy(&self) -> ConfirmPolicy {
        self.confirm
    }

    /// Lock serializing optimistic writes against one thermostat.
    pub(crate) fn write_lock(&self, thermostat_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.write_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(thermostat_id.to_string()).or_default())
    }

    async fn send_command(&self, action: &str, thermostat_id: &str, data: Value) -> Result<()> {
        if !self.cache.contains(thermostat_id) {
            return Err(Error::UnknownThermostat(thermostat_id.to_string()));
        }

        debug!(thermostat = thermostat_id, action, body = %data, "sending command");
        with_logger(self.transport.logger(), |l| l.log_command(action, thermostat_id, &data));

        self.transport
            .put(&device_data_path(thermostat_id), &data)
            .await?;
        Ok(())
    }
}
