use core::convert::TryInto;
use std::{
    sync::{atomic::AtomicBool, OnceLock},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Context};
use chrono::{NaiveDateTime, Offset, Utc};
use chrono_tz::Tz;
use ds18b20::{Ds18b20, Resolution};
use embedded_svc::{
    http::{client::Client as HttpClient, Method, Status},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    delay::Ets,
    gpio::{AnyIOPin, AnyInputPin, AnyOutputPin, Input, InputOutput, Output, PinDriver, Pull},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
    sntp::{EspSntp, SyncStatus},
    wifi::{BlockingWifi, EspWifi},
};
use log::{debug, info, warn};
use one_wire_bus::{Address, OneWire};

use climate_common::{
    config::{HardwareConfig, NetworkConfig},
    ActuatorError, ActuatorKind, Actuators, Clock, ControlLoop, HttpResponse, RuntimeConfig,
    SensorError, SensorGateway, Transport, TransportError, TEMPERATURE_SENTINEL_C,
};

const NVS_NAMESPACE: &str = "climate";
const NVS_RUNTIME_KEY: &str = "runtime_json";

const MAX_HTTP_BODY: usize = 4096;
const WATCHDOG_TIMEOUT_SEC: u32 = 90;
const WIFI_RESTART_GRACE_MS: u64 = 300_000;
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;

struct NvsStore {
    partition: EspDefaultNvsPartition,
}

/// DS18B20 on one-wire plus a PIR on a plain input.
struct ProbeSensors {
    one_wire: OneWire<PinDriver<'static, AnyIOPin, InputOutput>>,
    probe: Option<Address>,
    pir: PinDriver<'static, AnyInputPin, Input>,
    delay: Ets,
    temp_pin: i32,
}

struct RelayOutputs {
    fan: PinDriver<'static, AnyOutputPin, Output>,
    light: PinDriver<'static, AnyOutputPin, Output>,
}

/// Local time from SNTP. Until the first sync completes the RTC free-runs
/// from boot and wall time is reported as untrusted.
struct SntpClock {
    sntp: Option<EspSntp<'static>>,
    timezone: String,
}

/// One ESP-IDF HTTP connection per request; the loop never holds a socket
/// between activities.
struct EspTransport {
    network: NetworkConfig,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs_store = NvsStore {
        partition: nvs_partition.clone(),
    };

    let mut runtime = nvs_store.load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    ensure_build_defaults(&mut runtime);
    runtime.sanitize();

    info!(
        "NVS config loaded: ssid=`{}`, api=`{}`, pins temp={} pir={} fan={} light={}",
        runtime.network.wifi_ssid,
        runtime.network.api_base_url,
        runtime.hardware.temp_pin,
        runtime.hardware.pir_pin,
        runtime.hardware.fan_pin,
        runtime.hardware.light_pin,
    );

    let Peripherals { modem, .. } = Peripherals::take()?;

    let outputs = RelayOutputs::new(&runtime.hardware).context("failed to initialize outputs")?;
    let sensors = ProbeSensors::new(&runtime.hardware).context("failed to initialize sensors")?;

    let wifi = match connect_wifi(modem, sys_loop, nvs_partition, &runtime.network) {
        Ok(wifi) => {
            info!("wifi connected");
            disable_wifi_power_save();
            Some(wifi)
        }
        Err(err) => {
            warn!("wifi unavailable, outputs stay off until the link comes up: {err:#}");
            None
        }
    };

    let sntp = match EspSntp::new_default() {
        Ok(sntp) => {
            info!("SNTP initialized");
            Some(sntp)
        }
        Err(err) => {
            warn!("failed to start SNTP, wall time will free-run: {err}");
            None
        }
    };

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;
    add_current_task_to_watchdog()?;

    // Keep the radio alive for the program lifetime.
    let _wifi = wifi;

    let idle = Duration::from_millis(runtime.controller.idle_yield_ms);
    let mut wifi_disconnected_since: Option<Instant> = None;
    let mut control = ControlLoop::new(
        runtime.controller.clone(),
        &runtime.network,
        SntpClock {
            sntp,
            timezone: runtime.timezone.clone(),
        },
        sensors,
        EspTransport {
            network: runtime.network.clone(),
        },
        outputs,
    );

    let never = AtomicBool::new(false);
    control.run_until(&never, |_, _| {
        feed_watchdog();
        maintain_wifi_health(&mut wifi_disconnected_since);
        thread::sleep(idle);
    });
    Ok(())
}

impl NvsStore {
    fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let mut buffer = vec![0_u8; 4096];

        match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
            Some(value) => Ok(serde_json::from_str::<RuntimeConfig>(value)?),
            None => Ok(RuntimeConfig::default()),
        }
    }
}

fn ensure_build_defaults(runtime: &mut RuntimeConfig) {
    if runtime.network.wifi_ssid.is_empty() {
        runtime.network.wifi_ssid = option_env!("WIFI_SSID").unwrap_or("CHANGE_ME").to_string();
    }

    if runtime.network.wifi_pass.is_empty() {
        runtime.network.wifi_pass = option_env!("WIFI_PASS").unwrap_or("CHANGE_ME").to_string();
    }

    if let Some(url) = option_env!("API_BASE_URL") {
        if runtime.network.api_base_url == NetworkConfig::default().api_base_url {
            runtime.network.api_base_url = url.to_string();
        }
    }
}

fn has_station_credentials(network: &NetworkConfig) -> bool {
    let ssid = network.wifi_ssid.trim();
    !ssid.is_empty() && ssid != "CHANGE_ME"
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    if !has_station_credentials(network) {
        bail!("wifi credentials missing");
    }

    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    let mut last_err = None;
    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected and netif up on attempt {attempt}");
                last_err = None;
                break;
            }
            Err(err) => {
                warn!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS} failed: {err:#}");
                last_err = Some(err);
            }
        }

        if attempt < WIFI_CONNECT_ATTEMPTS {
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
        }
    }

    match last_err {
        None => Ok(esp_wifi),
        Some(err) => Err(anyhow!(
            "all {WIFI_CONNECT_ATTEMPTS} wifi connect attempts failed; last error: {err:#}"
        )),
    }
}

impl ProbeSensors {
    fn new(hardware: &HardwareConfig) -> anyhow::Result<Self> {
        let mut one_wire_pin =
            PinDriver::input_output_od(unsafe { AnyIOPin::new(hardware.temp_pin) })?;
        one_wire_pin.set_pull(Pull::Up)?;
        one_wire_pin.set_high()?;

        let one_wire = OneWire::new(one_wire_pin)
            .map_err(|err| anyhow!("failed to initialize one-wire bus: {err:?}"))?;

        let pir = PinDriver::input(unsafe { AnyInputPin::new(hardware.pir_pin) })?;

        let mut sensors = Self {
            one_wire,
            probe: None,
            pir,
            delay: Ets,
            temp_pin: hardware.temp_pin,
        };

        sensors.refresh_probe_address();
        Ok(sensors)
    }

    fn refresh_probe_address(&mut self) {
        let mut first_probe: Option<Address> = None;
        let mut device_count = 0_u32;

        for addr in self.one_wire.devices(false, &mut self.delay) {
            match addr {
                Ok(address) => {
                    device_count = device_count.saturating_add(1);
                    if first_probe.is_none() && address.family_code() == ds18b20::FAMILY_CODE {
                        first_probe = Some(address);
                    }
                }
                Err(err) => {
                    debug!("one-wire device scan failed: {err:?}");
                    break;
                }
            }
        }

        self.probe = first_probe;
        if let Some(address) = self.probe {
            info!(
                "DS18B20 ready on GPIO{} ({} one-wire device(s), using {:?})",
                self.temp_pin, device_count, address
            );
        }
    }

    fn read_probe(&mut self) -> Result<f32, SensorError> {
        if self.probe.is_none() {
            self.refresh_probe_address();
        }

        let address = self.probe.ok_or(SensorError::NotFound)?;
        let probe = Ds18b20::new::<core::convert::Infallible>(address)
            .map_err(|err| self.lose_probe(format!("invalid address {address:?}: {err:?}")))?;

        ds18b20::start_simultaneous_temp_measurement(&mut self.one_wire, &mut self.delay)
            .map_err(|err| self.lose_probe(format!("conversion start failed: {err:?}")))?;

        Resolution::Bits12.delay_for_measurement_time(&mut self.delay);

        let data = probe
            .read_data(&mut self.one_wire, &mut self.delay)
            .map_err(|err| self.lose_probe(format!("scratchpad read failed: {err:?}")))?;
        Ok(data.temperature)
    }

    fn lose_probe(&mut self, reason: String) -> SensorError {
        self.probe = None;
        SensorError::Read(reason)
    }
}

impl SensorGateway for ProbeSensors {
    fn read_temperature(&mut self) -> f32 {
        self.read_probe().unwrap_or_else(|err| {
            debug!("[DS18B20] {err}");
            TEMPERATURE_SENTINEL_C
        })
    }

    fn read_presence(&mut self) -> bool {
        self.pir.is_high()
    }
}

impl RelayOutputs {
    fn new(hardware: &HardwareConfig) -> anyhow::Result<Self> {
        let mut fan = unsafe { PinDriver::output(AnyOutputPin::new(hardware.fan_pin)) }
            .with_context(|| format!("fan output unavailable on GPIO{}", hardware.fan_pin))?;
        let mut light = unsafe { PinDriver::output(AnyOutputPin::new(hardware.light_pin)) }
            .with_context(|| format!("light output unavailable on GPIO{}", hardware.light_pin))?;

        fan.set_low()?;
        light.set_low()?;
        Ok(Self { fan, light })
    }
}

impl Actuators for RelayOutputs {
    fn set(&mut self, actuator: ActuatorKind, on: bool) -> Result<(), ActuatorError> {
        let pin = match actuator {
            ActuatorKind::Fan => &mut self.fan,
            ActuatorKind::Light => &mut self.light,
        };

        let result = if on { pin.set_high() } else { pin.set_low() };
        result.map_err(|err| ActuatorError {
            actuator,
            reason: err.to_string(),
        })
    }
}

impl Clock for SntpClock {
    fn monotonic_ms(&self) -> u64 {
        monotonic_ms()
    }

    fn wall_time(&self) -> NaiveDateTime {
        now_in_timezone(&self.timezone)
            .map(|now| now.naive_local())
            .unwrap_or_else(|| Utc::now().naive_utc())
    }

    fn refresh(&mut self) -> bool {
        let synced = self
            .sntp
            .as_ref()
            .map(|sntp| sntp.get_sync_status() == SyncStatus::Completed)
            .unwrap_or(false);
        synced && now_in_timezone(&self.timezone).is_some()
    }
}

impl EspTransport {
    fn exchange(
        &self,
        method: Method,
        path: &str,
        body: Option<&[u8]>,
    ) -> Result<HttpResponse, TransportError> {
        if !is_wifi_station_connected() {
            return Err(TransportError::LinkDown);
        }

        let conf = HttpClientConfiguration {
            timeout: Some(Duration::from_millis(self.network.request_timeout_ms)),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let mut client = HttpClient::wrap(EspHttpConnection::new(&conf).map_err(request_error)?);
        let url = self.network.url(path);

        let content_length = body.map(|bytes| bytes.len().to_string());
        let mut headers = vec![("accept", "application/json")];
        if let Some(length) = content_length.as_deref() {
            headers.push(("content-type", "application/json"));
            headers.push(("content-length", length));
        }

        let mut request = client
            .request(method, &url, &headers)
            .map_err(request_error)?;
        if let Some(bytes) = body {
            request.write_all(bytes).map_err(request_error)?;
            request.flush().map_err(request_error)?;
        }

        let mut response = request.submit().map_err(request_error)?;
        let status = response.status();

        let mut received = Vec::new();
        let mut chunk = [0_u8; 512];
        loop {
            let read = response.read(&mut chunk).map_err(request_error)?;
            if read == 0 {
                break;
            }
            if received.len() + read > MAX_HTTP_BODY {
                return Err(TransportError::Request(format!(
                    "response body exceeds {MAX_HTTP_BODY} bytes"
                )));
            }
            received.extend_from_slice(&chunk[..read]);
        }

        Ok(HttpResponse {
            status,
            body: received,
        })
    }
}

impl Transport for EspTransport {
    fn is_connected(&self) -> bool {
        is_wifi_station_connected()
    }

    fn get(&mut self, path: &str) -> Result<HttpResponse, TransportError> {
        self.exchange(Method::Get, path, None)
    }

    fn post_json(&mut self, path: &str, body: &[u8]) -> Result<HttpResponse, TransportError> {
        self.exchange(Method::Post, path, Some(body))
    }
}

fn request_error<E: core::fmt::Debug>(err: E) -> TransportError {
    let detail = format!("{err:?}");
    if detail.contains("TIMEOUT") || detail.contains("EAGAIN") {
        TransportError::Timeout
    } else {
        TransportError::Request(detail)
    }
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
}

fn disable_wifi_power_save() {
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_set_ps(0) };
    if rc != esp_idf_svc::sys::ESP_OK {
        warn!("failed to disable wifi power save: esp_err_t={rc}");
    }
}

fn is_wifi_station_connected() -> bool {
    let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
    rc == esp_idf_svc::sys::ESP_OK
}

/// Reboot after the station has been gone for the whole grace period.
fn maintain_wifi_health(wifi_disconnected_since: &mut Option<Instant>) {
    if is_wifi_station_connected() {
        *wifi_disconnected_since = None;
        return;
    }

    match wifi_disconnected_since {
        Some(disconnected_since)
            if disconnected_since.elapsed().as_millis() as u64 >= WIFI_RESTART_GRACE_MS =>
        {
            warn!(
                "wifi disconnected for {}s; restarting device for recovery",
                WIFI_RESTART_GRACE_MS / 1000
            );
            thread::sleep(Duration::from_millis(100));
            unsafe { esp_idf_svc::sys::esp_restart() };
        }
        Some(_) => {}
        None => *wifi_disconnected_since = Some(Instant::now()),
    }
}

fn now_in_timezone(timezone: &str) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    let tz: Tz = timezone.parse().ok()?;
    let local = Utc::now().with_timezone(&tz);
    Some(local.with_timezone(&local.offset().fix()))
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
