//! Entity-side half of the optimistic write protocol.
//!
//! A write goes through these stages:
//!
//! 1. `Issuing`: the command is sent. If that fails nothing else happens.
//! 2. `OptimisticApplied`: the same change is applied to the entity's local
//!    snapshot and published to listeners.
//! 3. `AwaitingConfirm`: regular updates are suspended while the cache is
//!    polled without throttling until the check passes or the wall-clock
//!    budget runs out.
//! 4. `Reconciling`: updates resume and one unconditional refresh replaces
//!    the optimistic snapshot with the remote state, which is published.
//! 5. `Done`.
//!
//! Writes against one thermostat hold its write lock from stage 1 to 5.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace};

use crate::client::DaikinOne;
use crate::types::*;
use crate::{Error, Result};

type StateCallback = Box<dyn Fn(&Thermostat) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteStage {
    Issuing,
    OptimisticApplied,
    AwaitingConfirm,
    Reconciling,
    Done,
}

/// Result of one optimistic write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// The remote state matched the requested change before the deadline.
    pub confirmed: bool,
    /// Confirmation polls issued.
    pub attempts: u32,
}

impl WriteOutcome {
    fn and(self, other: WriteOutcome) -> WriteOutcome {
        WriteOutcome {
            confirmed: self.confirmed && other.confirmed,
            attempts: self.attempts + other.attempts,
        }
    }
}

/// Clears the suspension flag when dropped, so every exit path of a write
/// (including errors and cancellation) resumes regular updates.
struct SuspendGuard<'a>(&'a AtomicBool);

impl<'a> SuspendGuard<'a> {
    fn new(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One thermostat as seen by a host entity framework.
pub struct ThermostatEntity {
    client: Arc<DaikinOne>,
    id: String,
    state: Mutex<Thermostat>,
    updates_suspended: AtomicBool,
    callbacks: Vec<StateCallback>,
}

impl ThermostatEntity {
    pub(crate) fn new(client: Arc<DaikinOne>, thermostat_id: &str) -> Result<Self> {
        let state = client
            .thermostat(thermostat_id)
            .ok_or_else(|| Error::UnknownThermostat(thermostat_id.to_string()))?;
        Ok(Self {
            client,
            id: thermostat_id.to_string(),
            state: Mutex::new(state),
            updates_suspended: AtomicBool::new(false),
            callbacks: Vec::new(),
        })
    }

    /// Register a listener for every published state.
    pub fn on_state_change(mut self, f: impl Fn(&Thermostat) + Send + Sync + 'static) -> Self {
        self.callbacks.push(Box::new(f));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Copy of the state currently shown to the user.
    pub fn state(&self) -> Thermostat {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn updates_suspended(&self) -> bool {
        self.updates_suspended.load(Ordering::SeqCst)
    }

    /// Regular update entry point for the host's polling schedule. Does
    /// nothing while an optimistic write is waiting for confirmation.
    pub async fn update(&self, no_throttle: bool) -> Result<()> {
        if self.updates_suspended() {
            trace!(thermostat = %self.id, "update skipped, waiting on confirmation");
            return Ok(());
        }
        self.reload(no_throttle).await
    }

    async fn reload(&self, no_throttle: bool) -> Result<()> {
        debug!(thermostat = %self.id, "updating thermostat entity");
        self.client.update(no_throttle).await?;
        let latest = self
            .client
            .thermostat(&self.id)
            .ok_or_else(|| Error::UnknownThermostat(self.id.clone()))?;
        self.publish(latest);
        Ok(())
    }

    fn publish(&self, thermostat: Thermostat) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            *state = thermostat.clone();
        }
        for cb in &self.callbacks {
            cb(&thermostat);
        }
    }

    /// Run `operation`, show `optimistic` immediately, then wait for the
    /// remote state to satisfy `check` and reconcile with it.
    pub async fn write_optimistically<Op, Fut, U, C>(
        &self,
        operation: Op,
        optimistic: U,
        check: C,
    ) -> Result<WriteOutcome>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
        U: FnOnce(&mut Thermostat),
        C: Fn(&Thermostat) -> bool,
    {
        let lock = self.client.write_lock(&self.id);
        let _serialized = lock.lock().await;

        let suspended = SuspendGuard::new(&self.updates_suspended);

        self.stage(WriteStage::Issuing);
        operation().await?;

        self.stage(WriteStage::OptimisticApplied);
        let mut snapshot = self.state();
        optimistic(&mut snapshot);
        self.publish(snapshot);

        self.stage(WriteStage::AwaitingConfirm);
        let outcome = self.await_confirmation(&check).await;
        debug!(
            thermostat = %self.id,
            confirmed = outcome.confirmed,
            attempts = outcome.attempts,
            "finished waiting for updated value"
        );

        self.stage(WriteStage::Reconciling);
        drop(suspended);
        self.reload(true).await?;

        self.stage(WriteStage::Done);
        Ok(outcome)
    }

    fn stage(&self, stage: WriteStage) {
        trace!(thermostat = %self.id, ?stage, "optimistic write");
    }

    async fn await_confirmation(&self, check: &impl Fn(&Thermostat) -> bool) -> WriteOutcome {
        let policy = self.client.confirm_policy();
        let mut attempts = 0u32;

        let confirmed = tokio::time::timeout(policy.timeout, async {
            loop {
                attempts += 1;
                match self.client.update(true).await {
                    Ok(()) => {
                        if self.client.thermostat(&self.id).is_some_and(|t| check(&t)) {
                            return;
                        }
                    }
                    Err(e) => debug!(thermostat = %self.id, "confirmation poll failed: {e}"),
                }
                tokio::time::sleep(policy.interval).await;
            }
        })
        .await
        .is_ok();

        if !confirmed {
            debug!(thermostat = %self.id, "gave up waiting for updated value");
        }
        WriteOutcome { confirmed, attempts }
    }

    // -- User intents --

    pub async fn set_hvac_mode(&self, mode: ThermostatMode) -> Result<WriteOutcome> {
        let current = self.state();
        if !current.available_modes().contains(&mode) {
            return Err(Error::Validation(format!(
                "mode {mode:?} not supported by thermostat {}",
                self.id
            )));
        }
        self.write_mode(mode).await
    }

    async fn write_mode(&self, mode: ThermostatMode) -> Result<WriteOutcome> {
        debug!(thermostat = %self.id, ?mode, "setting thermostat mode");
        self.write_optimistically(
            || self.client.set_thermostat_mode(&self.id, mode),
            |t| t.mode = mode,
            |t| t.mode == mode,
        )
        .await
    }

    /// Emergency heat maps to the aux heat mode; clearing the preset while
    /// in aux heat returns to plain heat. Returns `None` when nothing changed.
    pub async fn set_preset(&self, preset: Preset) -> Result<Option<WriteOutcome>> {
        match preset {
            Preset::EmergencyHeat => {
                if !self.state().has_capability(Capability::EmergencyHeat) {
                    return Err(Error::Validation(
                        "thermostat has no emergency heat".to_string(),
                    ));
                }
                self.write_mode(ThermostatMode::AuxHeat).await.map(Some)
            }
            Preset::None => match self.state().mode {
                ThermostatMode::AuxHeat => self.write_mode(ThermostatMode::Heat).await.map(Some),
                _ => Ok(None),
            },
        }
    }

    pub async fn set_temperature(&self, request: SetTemperature) -> Result<WriteOutcome> {
        let current = self.state();
        let (heat, cool, override_schedule) = match request {
            SetTemperature::Range { low: None, high: None } => {
                return Err(Error::Validation("no temperature values given".to_string()));
            }
            SetTemperature::Range { low, high } => (low, high, current.schedule.enabled),
            SetTemperature::Single(t) => match current.mode {
                ThermostatMode::Heat | ThermostatMode::AuxHeat => (Some(t), None, false),
                ThermostatMode::Cool => (None, Some(t), false),
                mode => {
                    return Err(Error::Validation(format!(
                        "cannot set a single temperature in mode {mode:?}"
                    )));
                }
            },
        };

        debug!(thermostat = %self.id, ?heat, ?cool, "setting thermostat set points");
        self.write_optimistically(
            || {
                self.client
                    .set_thermostat_home_set_points(&self.id, heat, cool, override_schedule)
            },
            |t| {
                if let Some(h) = heat {
                    t.set_point_heat = h;
                }
                if let Some(c) = cool {
                    t.set_point_cool = c;
                }
            },
            |t| heat.is_none_or(|h| t.set_point_heat == h) && cool.is_none_or(|c| t.set_point_cool == c),
        )
        .await
    }

    /// Fixed speeds switch circulation to always-on first, then set the
    /// speed, each as its own optimistic write.
    pub async fn set_fan_mode(&self, setting: FanSetting) -> Result<WriteOutcome> {
        let speed = match setting {
            FanSetting::Off => return self.write_fan_mode(FanMode::Off).await,
            FanSetting::AlwaysOn => return self.write_fan_mode(FanMode::AlwaysOn).await,
            FanSetting::Scheduled => return self.write_fan_mode(FanMode::Scheduled).await,
            FanSetting::Low => FanSpeed::Low,
            FanSetting::Medium => FanSpeed::Medium,
            FanSetting::High => FanSpeed::High,
        };
        let first = self.write_fan_mode(FanMode::AlwaysOn).await?;
        let second = self.set_fan_speed(speed).await?;
        Ok(first.and(second))
    }

    pub async fn set_fan_speed(&self, speed: FanSpeed) -> Result<WriteOutcome> {
        debug!(thermostat = %self.id, ?speed, "setting fan speed");
        self.write_optimistically(
            || self.client.set_thermostat_fan_speed(&self.id, speed),
            |t| t.fan_speed = speed,
            |t| t.fan_speed == speed,
        )
        .await
    }

    async fn write_fan_mode(&self, mode: FanMode) -> Result<WriteOutcome> {
        debug!(thermostat = %self.id, ?mode, "setting fan mode");
        self.write_optimistically(
            || self.client.set_thermostat_fan_mode(&self.id, mode),
            |t| t.fan_mode = mode,
            |t| t.fan_mode == mode,
        )
        .await
    }
}
