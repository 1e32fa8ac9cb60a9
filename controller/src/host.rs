use std::{
    future::{Future, IntoFuture},
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use chrono::{NaiveDateTime, Offset, Utc};
use chrono_tz::Tz;
use reqwest::{blocking::RequestBuilder, header::CONTENT_TYPE};
use tokio::{
    net::TcpListener,
    sync::watch,
    task::{JoinError, JoinHandle},
};
use tracing::{info, warn};

use climate_common::{
    config::NetworkConfig, ActuatorError, ActuatorKind, Actuators, Clock, ControlLoop,
    ControllerStatus, HttpResponse, RuntimeConfig, SensorGateway, Transport, TransportError,
};

const DEFAULT_HTTP_PORT: u16 = 8080;

#[derive(Clone)]
struct AppState {
    status: watch::Receiver<ControllerStatus>,
}

struct AppStore {
    runtime_path: PathBuf,
}

/// Wall clock from the host OS, shifted into the configured zone.
struct SystemClock {
    timezone: String,
}

/// Stand-in for the probe and PIR so the loop can run on a workstation.
struct SimulatedSensors;

/// Prints each edge instead of driving a relay.
struct LoggingActuators;

struct HttpTransport {
    client: reqwest::blocking::Client,
    network: NetworkConfig,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    apply_env_overrides(&mut runtime, |key| std::env::var(key).ok());
    runtime.sanitize();

    if now_in_timezone(&runtime.timezone).is_none() {
        warn!("unknown timezone `{}`; using UTC", runtime.timezone);
        runtime.timezone = "UTC".to_string();
    }

    info!(
        "runtime config loaded: api=`{}`, timezone=`{}`, light policy={}",
        runtime.network.api_base_url,
        runtime.timezone,
        runtime.controller.light_policy.as_str(),
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let (status_tx, status_rx) = watch::channel(ControllerStatus::default());
    let control = spawn_control_loop(runtime, shutdown.clone(), status_tx);

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .with_state(AppState { status: status_rx });

    let port = http_port(|key| std::env::var(key).ok());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind status server at {addr}"))?;

    info!("status server listening on http://{addr}");
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .into_future();

    supervise(server, control, &shutdown).await
}

enum Exit {
    Server(std::io::Result<()>),
    Control(Result<anyhow::Result<()>, JoinError>),
}

/// Runs until either the status server or the control loop stops, then stops the other.
async fn supervise<S>(
    server: S,
    mut control: JoinHandle<anyhow::Result<()>>,
    shutdown: &AtomicBool,
) -> anyhow::Result<()>
where
    S: Future<Output = std::io::Result<()>>,
{
    let exit = tokio::select! {
        served = server => Exit::Server(served),
        finished = &mut control => Exit::Control(finished),
    };
    shutdown.store(true, Ordering::Relaxed);

    match exit {
        Exit::Server(served) => {
            served.context("status server failed")?;
            control.await.context("control loop task panicked")?
        }
        Exit::Control(finished) => finished
            .context("control loop task panicked")?
            .context("control loop stopped"),
    }
}

/// The loop blocks on HTTP, so it gets its own thread and hands status to the
/// web side through a watch channel.
fn spawn_control_loop(
    runtime: RuntimeConfig,
    shutdown: Arc<AtomicBool>,
    status_tx: watch::Sender<ControllerStatus>,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::task::spawn_blocking(move || {
        let transport = HttpTransport::new(&runtime.network)?;
        let idle = Duration::from_millis(runtime.controller.idle_yield_ms);

        let mut control = ControlLoop::new(
            runtime.controller.clone(),
            &runtime.network,
            SystemClock {
                timezone: runtime.timezone.clone(),
            },
            SimulatedSensors,
            transport,
            LoggingActuators,
        );

        control.run_until(&shutdown, |control, _| {
            status_tx.send_replace(control.status());
            std::thread::sleep(idle);
        });
        Ok(())
    })
}

async fn shutdown_signal(shutdown: Arc<AtomicBool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
    shutdown.store(true, Ordering::Relaxed);
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.status.borrow().clone();
    Json(status)
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("CLIMATE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.climate"));

        Self {
            runtime_path: data_dir.join("runtime.json"),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(&self.runtime_path).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)
                .with_context(|| format!("invalid {}", self.runtime_path.display()))?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

fn apply_env_overrides(runtime: &mut RuntimeConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("API_BASE_URL").filter(|value| !value.trim().is_empty()) {
        runtime.network.api_base_url = url;
    }
    if let Some(timezone) = lookup("CLIMATE_TIMEZONE").filter(|value| !value.trim().is_empty()) {
        runtime.timezone = timezone;
    }
}

fn http_port(lookup: impl Fn(&str) -> Option<String>) -> u16 {
    lookup("CONTROLLER_HTTP_PORT")
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_HTTP_PORT)
}

impl Clock for SystemClock {
    fn monotonic_ms(&self) -> u64 {
        monotonic_ms()
    }

    fn wall_time(&self) -> NaiveDateTime {
        now_in_timezone(&self.timezone)
            .map(|now| now.naive_local())
            .unwrap_or_else(|| Utc::now().naive_utc())
    }

    fn refresh(&mut self) -> bool {
        now_in_timezone(&self.timezone).is_some()
    }
}

impl SensorGateway for SimulatedSensors {
    fn read_temperature(&mut self) -> f32 {
        simulated_temperature(monotonic_ms())
    }

    fn read_presence(&mut self) -> bool {
        simulated_presence(monotonic_ms())
    }
}

/// Triangle wave between 20 and 30 °C with a four-minute period.
fn simulated_temperature(elapsed_ms: u64) -> f32 {
    let phase = (elapsed_ms / 1_000) % 240;
    let ramp = if phase < 120 { phase } else { 240 - phase };
    20.0 + ramp as f32 / 12.0
}

/// Someone walks in and out every ninety seconds.
fn simulated_presence(elapsed_ms: u64) -> bool {
    (elapsed_ms / 90_000) % 2 == 0
}

impl Actuators for LoggingActuators {
    fn set(&mut self, actuator: ActuatorKind, on: bool) -> Result<(), ActuatorError> {
        info!(
            "[sim] {actuator} output {}",
            if on { "energized" } else { "released" }
        );
        Ok(())
    }
}

impl HttpTransport {
    fn new(network: &NetworkConfig) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(network.request_timeout_ms))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            network: network.clone(),
        })
    }

    fn exchange(request: RequestBuilder) -> Result<HttpResponse, TransportError> {
        let response = request.send().map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(transport_error)?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

impl Transport for HttpTransport {
    /// The host has no radio to ask; reachability shows up as request errors.
    fn is_connected(&self) -> bool {
        true
    }

    fn get(&mut self, path: &str) -> Result<HttpResponse, TransportError> {
        Self::exchange(self.client.get(self.network.url(path)))
    }

    fn post_json(&mut self, path: &str, body: &[u8]) -> Result<HttpResponse, TransportError> {
        Self::exchange(
            self.client
                .post(self.network.url(path))
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_vec()),
        )
    }
}

fn transport_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(err.to_string())
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
