use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

use crate::{
    config::{ControllerConfig, NetworkConfig},
    engine::{ActuationEngine, EngineAction},
    failsafe::{FailSafe, FailSafeCause},
    ports::{Actuators, Clock, SensorError, SensorGateway, Transport},
    settings::{SettingsCache, SettingsSynchronizer},
    telemetry::{TelemetryReporter, TIMESTAMP_FORMAT},
    time_of_day::{in_window, TimeOfDay},
    timer::PeriodicTimer,
    types::{ActuatorKind, ControllerStatus, SensorSample},
};

/// What happened during one pass, mostly for tests and diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    /// A plausible reading was taken this pass.
    pub sampled: bool,
    pub clock_refreshed: bool,
    /// `Some(ok)` when a settings fetch was attempted.
    pub settings_synced: Option<bool>,
    /// The regular decision ran (settings cycle, fresh sample, no fail-safe).
    pub evaluated: bool,
    /// `Some(ok)` when a telemetry upload was attempted.
    pub telemetry_sent: Option<bool>,
    /// Edges that reached the hardware.
    pub actions: Vec<EngineAction>,
    pub fail_safe: Option<FailSafeCause>,
}

/// The cooperative driver. Every pass re-samples the sensors, then runs each
/// periodic activity whose own timer is due. Nothing here sleeps; the only
/// blocking happens inside the transport.
pub struct ControlLoop<C, S, N, A> {
    config: ControllerConfig,
    clock: C,
    sensors: S,
    transport: N,
    actuators: A,

    engine: ActuationEngine,
    cache: SettingsCache,
    synchronizer: SettingsSynchronizer,
    reporter: TelemetryReporter,
    failsafe: FailSafe,

    clock_timer: PeriodicTimer,
    settings_timer: PeriodicTimer,
    telemetry_timer: PeriodicTimer,

    latest: Option<SensorSample>,
    sample_ok: bool,
    time_synced: bool,
    active_fail_safe: Option<FailSafeCause>,
}

impl<C, S, N, A> ControlLoop<C, S, N, A>
where
    C: Clock,
    S: SensorGateway,
    N: Transport,
    A: Actuators,
{
    pub fn new(
        config: ControllerConfig,
        network: &NetworkConfig,
        clock: C,
        sensors: S,
        transport: N,
        actuators: A,
    ) -> Self {
        Self {
            engine: ActuationEngine::new(config.light_policy),
            cache: SettingsCache::default(),
            synchronizer: SettingsSynchronizer::new(network.settings_path.clone()),
            reporter: TelemetryReporter::new(network.telemetry_path.clone()),
            failsafe: FailSafe::new(config.failure_threshold, config.sensor_stale_timeout_ms),
            clock_timer: PeriodicTimer::new(config.clock_refresh_interval_ms),
            settings_timer: PeriodicTimer::new(config.settings_sync_interval_ms),
            telemetry_timer: PeriodicTimer::new(config.telemetry_interval_ms),
            latest: None,
            sample_ok: true,
            time_synced: false,
            active_fail_safe: None,
            config,
            clock,
            sensors,
            transport,
            actuators,
        }
    }

    pub fn engine(&self) -> &ActuationEngine {
        &self.engine
    }

    pub fn settings(&self) -> &SettingsCache {
        &self.cache
    }

    pub fn latest_sample(&self) -> Option<&SensorSample> {
        self.latest.as_ref()
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn sensors_mut(&mut self) -> &mut S {
        &mut self.sensors
    }

    pub fn transport_mut(&mut self) -> &mut N {
        &mut self.transport
    }

    pub fn actuators(&self) -> &A {
        &self.actuators
    }

    pub fn actuators_mut(&mut self) -> &mut A {
        &mut self.actuators
    }

    /// Loop until `shutdown` is raised. `after_pass` is where the host yields,
    /// feeds watchdogs or publishes status.
    pub fn run_until<F>(&mut self, shutdown: &AtomicBool, mut after_pass: F)
    where
        F: FnMut(&Self, &PassReport),
    {
        info!(
            "control loop started (settings every {}ms, telemetry every {}ms, light policy {})",
            self.config.settings_sync_interval_ms,
            self.config.telemetry_interval_ms,
            self.config.light_policy.as_str()
        );

        while !shutdown.load(Ordering::Relaxed) {
            let report = self.run_pass();
            after_pass(self, &report);
        }

        info!("control loop stopping");
    }

    pub fn run_pass(&mut self) -> PassReport {
        let now_ms = self.clock.monotonic_ms();
        let mut report = PassReport {
            sampled: self.sample(now_ms),
            ..PassReport::default()
        };

        if self.clock_timer.due_since(now_ms) {
            self.refresh_clock();
            report.clock_refreshed = true;
        }

        let link_up = self.transport.is_connected();
        if link_up != self.failsafe.link_up() {
            if link_up {
                info!("network link restored");
            } else {
                warn!("network link lost");
            }
        }
        self.failsafe.set_link(link_up);

        if self.settings_timer.due_since(now_ms) {
            if link_up {
                report.settings_synced = Some(self.sync_settings(now_ms));
            }

            if self.failsafe.cause(now_ms).is_none() {
                if report.sampled {
                    let actions = self.evaluate();
                    report.evaluated = true;
                    report.actions.extend(self.apply(actions));
                } else {
                    debug!("skipping decision: no plausible reading this pass");
                }
            }

            self.log_status(now_ms);
        }

        if self.telemetry_timer.due_since(now_ms) && link_up {
            if report.sampled {
                report.telemetry_sent = Some(self.send_telemetry());
            } else {
                debug!("skipping telemetry: no plausible reading this pass");
            }
        }

        report.fail_safe = self.enforce_fail_safe(now_ms, &mut report.actions);
        report
    }

    pub fn status(&self) -> ControllerStatus {
        let now_ms = self.clock.monotonic_ms();
        let wall = self.clock.wall_time();
        let settings = self.cache.current();

        ControllerStatus {
            sample: self.latest,
            sensor_valid: self.failsafe.is_sensor_data_valid(now_ms),
            fan_on: self.engine.is_on(ActuatorKind::Fan),
            light_on: self.engine.is_on(ActuatorKind::Light),
            light_policy: self.engine.policy().as_str(),
            settings: settings.cloned(),
            settings_age_ms: self.cache.age_ms(now_ms),
            last_fetch_error: self.synchronizer.last_error().map(str::to_string),
            in_light_window: settings
                .map(|s| in_window(TimeOfDay::from(wall.time()), s.light_on, s.light_off))
                .unwrap_or(false),
            fail_safe: self.active_fail_safe.map(FailSafeCause::as_str),
            consecutive_failures: self.failsafe.consecutive_failures(),
            link_up: self.failsafe.link_up(),
            time_synced: self.time_synced,
            local_time: wall.format(TIMESTAMP_FORMAT).to_string(),
            transitions: self.engine.transitions(),
            uptime_ms: now_ms,
        }
    }

    fn sample(&mut self, now_ms: u64) -> bool {
        let temperature_c = self.sensors.read_temperature();
        let presence = self.sensors.read_presence();

        if !self.config.is_plausible_temp(temperature_c) {
            if self.sample_ok {
                warn!("{}; discarding sample", SensorError::Implausible(temperature_c));
            }
            self.sample_ok = false;
            return false;
        }

        if !self.sample_ok {
            info!("temperature readings recovered ({temperature_c:.2}°C)");
        }
        self.sample_ok = true;
        self.latest = Some(SensorSample {
            temperature_c,
            presence,
            sampled_at_ms: now_ms,
        });
        self.failsafe.record_good_sample(now_ms);
        true
    }

    fn refresh_clock(&mut self) {
        let synced = self.clock.refresh();
        if synced != self.time_synced {
            if synced {
                info!(
                    "wall clock synchronized: {}",
                    self.clock.wall_time().format(TIMESTAMP_FORMAT)
                );
            } else {
                warn!("wall clock not synchronized; using local clock");
            }
        }
        self.time_synced = synced;
    }

    fn sync_settings(&mut self, now_ms: u64) -> bool {
        let previous = self.cache.current().cloned();

        match self
            .synchronizer
            .sync(&mut self.transport, &mut self.cache, now_ms)
        {
            Ok(settings) => {
                self.failsafe.record_success();
                if previous.as_ref() != Some(&settings) {
                    info!(
                        "settings updated: trigger {:.1}°C, light {} to {}",
                        settings.temperature_trigger_c, settings.light_on, settings.light_off
                    );
                }
                true
            }
            Err(err) => {
                self.failsafe.record_failure();
                warn!(
                    "settings fetch failed ({} in a row): {err}",
                    self.failsafe.consecutive_failures()
                );
                false
            }
        }
    }

    fn evaluate(&mut self) -> Vec<EngineAction> {
        let Some(sample) = self.latest else {
            return Vec::new();
        };
        let now = TimeOfDay::from(self.clock.wall_time().time());
        self.engine.evaluate(&sample, now, self.cache.current())
    }

    fn send_telemetry(&mut self) -> bool {
        let Some(sample) = self.latest else {
            return false;
        };
        let at = self.clock.wall_time();

        match self.reporter.report(&mut self.transport, &sample, at) {
            Ok(()) => {
                self.failsafe.record_success();
                debug!("telemetry sent ({} total)", self.reporter.sent());
                true
            }
            Err(err) => {
                self.failsafe.record_failure();
                warn!("telemetry send failed: {err}");
                false
            }
        }
    }

    fn enforce_fail_safe(
        &mut self,
        now_ms: u64,
        applied: &mut Vec<EngineAction>,
    ) -> Option<FailSafeCause> {
        let cause = self.failsafe.cause(now_ms);

        if cause.map(FailSafeCause::as_str) != self.active_fail_safe.map(FailSafeCause::as_str) {
            match cause {
                Some(cause) => warn!("fail-safe engaged: {cause}; forcing outputs off"),
                None => info!("fail-safe cleared; resuming normal control"),
            }
        }
        self.active_fail_safe = cause;

        if let Some(cause) = cause {
            let actions = self.engine.force_off(cause);
            applied.extend(self.apply(actions));
        }
        cause
    }

    fn apply(&mut self, actions: Vec<EngineAction>) -> Vec<EngineAction> {
        let mut applied = Vec::with_capacity(actions.len());
        for action in actions {
            match self.actuators.set(action.actuator, action.on) {
                Ok(()) => {
                    info!("{action}");
                    applied.push(action);
                }
                Err(err) => {
                    warn!("{err}; will retry on next evaluation");
                    self.engine.rollback(&action);
                }
            }
        }
        applied
    }

    fn log_status(&self, now_ms: u64) {
        let status = self.status();
        debug!(
            "status at {}ms: {} temp={:?} presence={:?} fan={} light={} window={} settings={}",
            now_ms,
            status.local_time,
            status.sample.map(|s| s.temperature_c),
            status.sample.map(|s| s.presence),
            status.fan_on,
            status.light_on,
            status.in_light_window,
            if status.settings.is_some() { "valid" } else { "none" }
        );
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        engine::SwitchReason,
        ports::{ActuatorError, HttpResponse, TransportError, TEMPERATURE_SENTINEL_C},
    };

    struct FakeClock {
        now_ms: u64,
        base: NaiveDateTime,
        synced: bool,
        refreshes: u32,
    }

    impl Clock for FakeClock {
        fn monotonic_ms(&self) -> u64 {
            self.now_ms
        }

        fn wall_time(&self) -> NaiveDateTime {
            self.base + Duration::milliseconds(self.now_ms as i64)
        }

        fn refresh(&mut self) -> bool {
            self.refreshes += 1;
            self.synced
        }
    }

    struct FakeSensors {
        temperature_c: f32,
        presence: bool,
    }

    impl SensorGateway for FakeSensors {
        fn read_temperature(&mut self) -> f32 {
            self.temperature_c
        }

        fn read_presence(&mut self) -> bool {
            self.presence
        }
    }

    #[derive(Default)]
    struct RecordingActuators {
        writes: Vec<(ActuatorKind, bool)>,
        fail_next: u32,
    }

    impl Actuators for RecordingActuators {
        fn set(&mut self, actuator: ActuatorKind, on: bool) -> Result<(), ActuatorError> {
            if self.fail_next > 0 {
                self.fail_next -= 1;
                return Err(ActuatorError {
                    actuator,
                    reason: "gpio busy".to_string(),
                });
            }
            self.writes.push((actuator, on));
            Ok(())
        }
    }

    struct FakeTransport {
        connected: bool,
        settings_reply: Result<HttpResponse, TransportError>,
        telemetry_reply: Result<HttpResponse, TransportError>,
        gets: u32,
        posts: Vec<serde_json::Value>,
    }

    impl Transport for FakeTransport {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn get(&mut self, path: &str) -> Result<HttpResponse, TransportError> {
            assert_eq!(path, "/settings");
            self.gets += 1;
            self.settings_reply.clone()
        }

        fn post_json(&mut self, path: &str, body: &[u8]) -> Result<HttpResponse, TransportError> {
            assert_eq!(path, "/sensor-data");
            self.posts.push(serde_json::from_slice(body).unwrap());
            self.telemetry_reply.clone()
        }
    }

    type Harness = ControlLoop<FakeClock, FakeSensors, FakeTransport, RecordingActuators>;

    const EVENING: &str =
        r#"{"user_temp": 25.0, "user_light": "18:30:00", "light_time_off": "22:30:00"}"#;

    fn reply(status: u16, body: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status,
            body: body.as_bytes().to_vec(),
        })
    }

    fn at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    fn harness_with(config: ControllerConfig) -> Harness {
        ControlLoop::new(
            config,
            &NetworkConfig::default(),
            FakeClock {
                now_ms: 0,
                base: at(19, 0, 0),
                synced: true,
                refreshes: 0,
            },
            FakeSensors {
                temperature_c: 30.0,
                presence: true,
            },
            FakeTransport {
                connected: true,
                settings_reply: reply(200, EVENING),
                telemetry_reply: reply(200, "{}"),
                gets: 0,
                posts: Vec::new(),
            },
            RecordingActuators::default(),
        )
    }

    fn harness() -> Harness {
        harness_with(ControllerConfig::default())
    }

    fn pass_at(controller: &mut Harness, now_ms: u64) -> PassReport {
        controller.clock_mut().now_ms = now_ms;
        controller.run_pass()
    }

    fn fail_all_requests(controller: &mut Harness) {
        let transport = controller.transport_mut();
        transport.settings_reply = Err(TransportError::Timeout);
        transport.telemetry_reply = Err(TransportError::Timeout);
    }

    #[test]
    fn evening_scenario_switches_only_the_fan() {
        let mut controller = harness();

        let first = pass_at(&mut controller, 0);
        assert!(first.sampled && first.evaluated);
        assert_eq!(first.settings_synced, Some(true));
        assert_eq!(first.telemetry_sent, Some(true));
        assert_eq!(
            controller.actuators().writes,
            vec![(ActuatorKind::Fan, true), (ActuatorKind::Light, true)]
        );

        controller.sensors_mut().temperature_c = 20.0;
        let second = pass_at(&mut controller, 5_000);

        assert_eq!(
            second.actions,
            vec![EngineAction {
                actuator: ActuatorKind::Fan,
                on: false,
                reason: SwitchReason::TemperatureAtOrBelowTrigger,
            }]
        );
        assert_eq!(
            controller.actuators().writes,
            vec![
                (ActuatorKind::Fan, true),
                (ActuatorKind::Light, true),
                (ActuatorKind::Fan, false),
            ]
        );
        assert_eq!(controller.engine().transitions(), 3);
    }

    #[test]
    fn outputs_stay_off_until_settings_arrive() {
        let mut controller = harness();
        controller.sensors_mut().temperature_c = 100.0;
        controller.transport_mut().settings_reply = reply(404, "not found");

        for step in 0..6 {
            let report = pass_at(&mut controller, step * 5_000);
            assert_eq!(report.settings_synced, Some(false));
        }

        assert!(controller.actuators().writes.is_empty());
        assert!(!controller.settings().is_valid());
    }

    #[test]
    fn decisions_only_run_on_settings_cycles() {
        let mut controller = harness();
        pass_at(&mut controller, 0);

        controller.sensors_mut().presence = false;
        for now_ms in [1_000, 2_000, 4_999] {
            let report = pass_at(&mut controller, now_ms);
            assert!(report.sampled);
            assert!(!report.evaluated);
            assert!(report.actions.is_empty());
        }
        assert_eq!(controller.latest_sample().map(|s| s.presence), Some(false));

        let report = pass_at(&mut controller, 5_000);
        assert!(report.evaluated);
        assert_eq!(report.actions.len(), 2);
        assert!(!controller.engine().any_on());
    }

    #[test]
    fn activities_keep_independent_periods() {
        let mut controller = harness_with(ControllerConfig {
            telemetry_interval_ms: 10_000,
            ..ControllerConfig::default()
        });

        let mut syncs = 0;
        let mut uploads = 0;
        let mut refreshes = 0;
        for step in 0..=30 {
            let report = pass_at(&mut controller, step * 1_000);
            syncs += report.settings_synced.is_some() as u32;
            uploads += report.telemetry_sent.is_some() as u32;
            refreshes += report.clock_refreshed as u32;
        }

        assert_eq!(syncs, 7);
        assert_eq!(uploads, 4);
        assert_eq!(refreshes, 1);
        assert_eq!(controller.transport_mut().gets, 7);
        assert_eq!(controller.clock_mut().refreshes, 1);
    }

    #[test]
    fn telemetry_carries_latest_sample_and_wall_time() {
        let mut controller = harness();
        controller.sensors_mut().temperature_c = 26.5;
        controller.sensors_mut().presence = false;

        pass_at(&mut controller, 0);

        assert_eq!(
            controller.transport_mut().posts,
            vec![serde_json::json!({
                "temperature": 26.5,
                "presence": false,
                "datetime": "2026-03-14T19:00:00",
            })]
        );
    }

    #[test]
    fn cached_settings_survive_failed_fetches() {
        let mut controller = harness();
        pass_at(&mut controller, 0);
        let original = controller.settings().current().cloned();

        controller.transport_mut().settings_reply = reply(500, "oops");
        pass_at(&mut controller, 5_000);
        controller.transport_mut().settings_reply = reply(200, "{\"user_temp\":");
        pass_at(&mut controller, 10_000);

        assert_eq!(controller.settings().current().cloned(), original);
        assert!(controller.engine().is_on(ActuatorKind::Fan));
        assert!(controller.engine().is_on(ActuatorKind::Light));
    }

    #[test]
    fn repeated_network_failures_force_outputs_off() {
        let mut controller = harness();
        pass_at(&mut controller, 0);
        assert!(controller.engine().any_on());

        fail_all_requests(&mut controller);

        let report = pass_at(&mut controller, 5_000);
        assert_eq!(report.settings_synced, Some(false));
        assert_eq!(report.telemetry_sent, Some(false));
        assert_eq!(report.fail_safe, None);
        assert!(controller.engine().any_on());

        let report = pass_at(&mut controller, 10_000);
        assert!(!report.evaluated);
        assert_eq!(report.fail_safe, Some(FailSafeCause::RepeatedFailures(4)));
        assert_eq!(report.actions.len(), 2);
        assert!(report
            .actions
            .iter()
            .all(|action| !action.on && matches!(action.reason, SwitchReason::FailSafe(_))));
        assert!(!controller.engine().any_on());
        assert_eq!(controller.status().fail_safe, Some("REPEATED_FAILURES"));

        let writes_before = controller.actuators().writes.len();
        pass_at(&mut controller, 15_000);
        assert_eq!(controller.actuators().writes.len(), writes_before);

        let transport = controller.transport_mut();
        transport.settings_reply = reply(200, EVENING);
        transport.telemetry_reply = reply(200, "{}");
        let report = pass_at(&mut controller, 20_000);
        assert!(report.evaluated);
        assert_eq!(report.fail_safe, None);
        assert!(controller.engine().is_on(ActuatorKind::Fan));
        assert!(controller.engine().is_on(ActuatorKind::Light));
    }

    #[test]
    fn link_loss_forces_off_without_touching_the_network() {
        let mut controller = harness();
        pass_at(&mut controller, 0);
        let gets = controller.transport_mut().gets;
        let posts = controller.transport_mut().posts.len();

        controller.transport_mut().connected = false;
        let report = pass_at(&mut controller, 1_000);
        assert_eq!(report.fail_safe, Some(FailSafeCause::LinkDown));
        assert!(!controller.engine().any_on());

        let report = pass_at(&mut controller, 5_000);
        assert_eq!(report.settings_synced, None);
        assert_eq!(report.telemetry_sent, None);
        assert!(!report.evaluated);
        assert_eq!(controller.transport_mut().gets, gets);
        assert_eq!(controller.transport_mut().posts.len(), posts);
        assert!(!controller.status().link_up);

        controller.transport_mut().connected = true;
        let report = pass_at(&mut controller, 10_000);
        assert!(report.evaluated);
        assert!(controller.engine().is_on(ActuatorKind::Fan));
    }

    #[test]
    fn implausible_reading_skips_decision_then_goes_stale() {
        let mut controller = harness();
        pass_at(&mut controller, 0);

        controller.sensors_mut().temperature_c = TEMPERATURE_SENTINEL_C;
        let report = pass_at(&mut controller, 5_000);
        assert!(!report.sampled);
        assert!(!report.evaluated);
        assert_eq!(report.telemetry_sent, None);
        assert_eq!(report.settings_synced, Some(true));
        assert!(controller.engine().is_on(ActuatorKind::Fan));
        assert_eq!(
            controller.latest_sample().map(|s| s.temperature_c),
            Some(30.0)
        );

        let report = pass_at(&mut controller, 29_999);
        assert_eq!(report.fail_safe, None);

        let report = pass_at(&mut controller, 30_000);
        assert_eq!(report.fail_safe, Some(FailSafeCause::StaleSensor));
        assert!(!controller.engine().any_on());

        controller.sensors_mut().temperature_c = 30.0;
        let report = pass_at(&mut controller, 31_000);
        assert_eq!(report.fail_safe, None);
        assert!(!controller.engine().any_on());

        let report = pass_at(&mut controller, 35_000);
        assert!(report.evaluated);
        assert!(controller.engine().is_on(ActuatorKind::Fan));
    }

    #[test]
    fn failed_write_is_retried_next_cycle() {
        let mut controller = harness();
        controller.actuators_mut().fail_next = 1;

        let report = pass_at(&mut controller, 0);
        assert_eq!(report.actions.len(), 1);
        assert_eq!(report.actions[0].actuator, ActuatorKind::Light);
        assert!(!controller.engine().is_on(ActuatorKind::Fan));

        let report = pass_at(&mut controller, 5_000);
        assert_eq!(report.actions.len(), 1);
        assert_eq!(report.actions[0].actuator, ActuatorKind::Fan);
        assert_eq!(
            controller.actuators().writes,
            vec![(ActuatorKind::Light, true), (ActuatorKind::Fan, true)]
        );
    }

    #[test]
    fn window_or_presence_policy_keeps_light_on_in_window() {
        let mut controller = harness_with(ControllerConfig {
            light_policy: crate::config::LightPolicy::WindowOrPresence,
            ..ControllerConfig::default()
        });
        controller.sensors_mut().presence = false;

        pass_at(&mut controller, 0);

        assert_eq!(
            controller.actuators().writes,
            vec![(ActuatorKind::Light, true)]
        );
    }

    #[test]
    fn status_snapshot_reflects_loop_state() {
        let mut controller = harness();
        controller.clock_mut().synced = false;
        pass_at(&mut controller, 2_000);

        let status = controller.status();
        assert!(status.fan_on && status.light_on);
        assert!(status.sensor_valid);
        assert!(status.in_light_window);
        assert!(status.link_up);
        assert!(!status.time_synced);
        assert_eq!(status.fail_safe, None);
        assert_eq!(status.transitions, 2);
        assert_eq!(status.settings_age_ms, Some(0));
        assert_eq!(status.local_time, "2026-03-14T19:00:02");
        assert_eq!(status.light_policy, "presence_in_window");

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["settings"]["lightOnTime"], "18:30:00");
        assert_eq!(json["sample"]["temperature"], 30.0);
    }

    #[test]
    fn run_until_stops_on_shutdown() {
        let mut controller = harness();
        let shutdown = AtomicBool::new(false);
        let mut passes = 0;

        controller.run_until(&shutdown, |_, _| {
            passes += 1;
            if passes == 3 {
                shutdown.store(true, Ordering::Relaxed);
            }
        });

        assert_eq!(passes, 3);
    }
}
