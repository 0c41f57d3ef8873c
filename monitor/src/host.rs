use std::{
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    sync::{mpsc, Mutex},
};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use pneumatic_common::{
    frames::{Co2Frame, FrameAssembler, PmsFrame, PMS_FRAME_LEN},
    metrics, units, AirQualityEngine, DeviceLabels, DisplayFrame, Quantity, RuntimeConfig,
    SensorError,
};

use crate::sim::{self, HostEnvSensor, SimulatedBus, SimulatedPms};

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<AirQualityEngine>>,
    bus: Arc<Mutex<SimulatedBus>>,
    config: Arc<RuntimeConfig>,
    labels: Arc<DeviceLabels>,
}

#[derive(Clone)]
struct ConfigStore {
    runtime_path: Arc<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    monotonic_ms();

    let store = ConfigStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    if let Some(port) = std::env::var("PNEUMATIC_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        runtime.http.port = port;
    }
    runtime.sanitize();

    let env_kind =
        std::env::var("PNEUMATIC_SIM_ENV_SENSOR").unwrap_or_else(|_| "bme280".to_string());
    let env_sensor = sim::probe_env(&env_kind.to_ascii_lowercase());

    let mut engine = AirQualityEngine::new(runtime.monitor.clone());
    engine.set_env_sensor(env_sensor.name());

    let addr: SocketAddr = ([0, 0, 0, 0], runtime.http.port).into();
    let app_state = AppState {
        engine: Arc::new(Mutex::new(engine)),
        bus: Arc::new(Mutex::new(SimulatedBus::default())),
        labels: Arc::new(DeviceLabels {
            mac_address: "00:00:00:00:00:00".to_string(),
            ip_address: addr.ip().to_string(),
            hostname: runtime.http.hostname.clone(),
        }),
        config: Arc::new(runtime),
    };

    if env_sensor.is_present() {
        spawn_env_loop(app_state.clone(), env_sensor);
    }
    spawn_co2_loop(app_state.clone());
    let pms_rx = spawn_pms_uart(app_state.config.monitor.particulate_poll_ms);
    spawn_particulate_loop(app_state.clone(), pms_rx);
    spawn_display_loop(app_state.clone());
    spawn_summary_loop(app_state.clone());

    let app = router(app_state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind monitor server at {addr}"))?;

    info!("monitor listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_get_status))
        .route("/statusz", get(handle_get_status))
        .route("/api/status", get(handle_get_status))
        .route("/varz", get(handle_get_varz))
        .route("/metrics", get(handle_get_varz))
        .route("/favicon.ico", get(handle_favicon))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

fn spawn_env_loop(app_state: AppState, mut sensor: HostEnvSensor) {
    tokio::spawn(async move {
        let period = Duration::from_millis(app_state.config.monitor.env_poll_ms);
        let mut interval = tokio::time::interval(period);
        info!("{} polling every {} ms", sensor.name(), period.as_millis());

        loop {
            interval.tick().await;
            poll_env_once(&app_state, &mut sensor).await;
        }
    });
}

/// One environment poll. The bus is only held for the read itself.
async fn poll_env_once(app_state: &AppState, sensor: &mut HostEnvSensor) -> bool {
    let bus_timeout_ms = app_state.config.monitor.bus_lock_timeout_ms;
    let reading = {
        let Ok(_bus) =
            tokio::time::timeout(Duration::from_millis(bus_timeout_ms), app_state.bus.lock())
                .await
        else {
            warn!(
                "{} poll skipped: {:#}",
                sensor.name(),
                SensorError::BusBusy {
                    waited_ms: bus_timeout_ms
                }
            );
            return false;
        };
        sensor.poll()
    };

    match reading {
        Ok(Some(reading)) => {
            app_state.engine.lock().await.ingest_env(&reading);
            true
        }
        Ok(None) => false,
        Err(err) => {
            warn!("{} read failed: {err:#}", sensor.name());
            false
        }
    }
}

fn spawn_co2_loop(app_state: AppState) {
    tokio::spawn(async move {
        let poll = Duration::from_millis(app_state.config.monitor.co2_poll_ms);
        let retry = Duration::from_millis(app_state.config.monitor.co2_retry_delay_ms);

        loop {
            match poll_co2_once(&app_state).await {
                Ok(_) => tokio::time::sleep(poll).await,
                Err(err) => {
                    warn!("DS-CO2-20 read failed: {err:#}");
                    tokio::time::sleep(retry).await;
                }
            }
        }
    });
}

async fn poll_co2_once(app_state: &AppState) -> Result<Co2Frame, SensorError> {
    let bus_timeout_ms = app_state.config.monitor.bus_lock_timeout_ms;
    let raw = {
        let mut bus =
            tokio::time::timeout(Duration::from_millis(bus_timeout_ms), app_state.bus.lock())
                .await
                .map_err(|_| SensorError::BusBusy {
                    waited_ms: bus_timeout_ms,
                })?;
        bus.read_co2_frame()
    };

    let frame = Co2Frame::parse(&raw)?;
    app_state.engine.lock().await.ingest_co2(&frame);
    Ok(frame)
}

/// Feeds simulated PMS output into a channel the way a UART driver would.
fn spawn_pms_uart(poll_ms: u64) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        let mut pms = SimulatedPms::default();
        let mut interval = tokio::time::interval(Duration::from_millis(poll_ms));
        loop {
            interval.tick().await;
            if tx.send(pms.next_chunk()).await.is_err() {
                break;
            }
        }
    });
    rx
}

fn spawn_particulate_loop(app_state: AppState, mut uart: mpsc::Receiver<Vec<u8>>) {
    tokio::spawn(async move {
        let timeout_ms = app_state.config.monitor.particulate_packet_timeout_ms;
        let retry = Duration::from_millis(app_state.config.monitor.particulate_retry_delay_ms);
        let mut assembler = FrameAssembler::<PMS_FRAME_LEN>::new();

        loop {
            match read_pms_frame(&mut uart, &mut assembler, timeout_ms).await {
                Ok(frame) => app_state.engine.lock().await.ingest_particulate(&frame),
                Err(SensorError::Bus(message)) => {
                    warn!("PMS serial link gone: {message}");
                    break;
                }
                Err(err) => {
                    warn!("PMS read failed: {err:#}");
                    assembler.reset();
                    tokio::time::sleep(retry).await;
                }
            }
        }
    });
}

async fn read_pms_frame(
    uart: &mut mpsc::Receiver<Vec<u8>>,
    assembler: &mut FrameAssembler<PMS_FRAME_LEN>,
    timeout_ms: u64,
) -> Result<PmsFrame, SensorError> {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);

    loop {
        let chunk = tokio::time::timeout_at(deadline, uart.recv())
            .await
            .map_err(|_| SensorError::Timeout {
                what: "PMS frame",
                waited_ms: timeout_ms,
            })?
            .ok_or_else(|| SensorError::Bus("PMS serial channel closed".to_string()))?;

        let (frame, consumed) = assembler.extend(&chunk);
        if let Some(frame) = frame {
            if consumed < chunk.len() {
                debug!("dropping {} bytes after PMS frame", chunk.len() - consumed);
            }
            return Ok(PmsFrame::parse(&frame)?);
        }
    }
}

fn spawn_display_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_millis(app_state.config.monitor.display_refresh_ms));
        loop {
            interval.tick().await;
            let overall = app_state.engine.lock().await.compute_overall();
            let frame = DisplayFrame::from_status(&overall, monotonic_ms());
            debug!(
                "display: AQI {} ({}) CO2 {} ppm, LED #{:06x}, up {}",
                frame.aqi, frame.aqi_message, frame.co2_ppm, frame.status_led.0, frame.uptime
            );
        }
    });
}

fn spawn_summary_loop(app_state: AppState) {
    tokio::spawn(async move {
        let period = Duration::from_millis(app_state.config.monitor.summary_log_interval_ms);
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval.tick().await;
            let engine = app_state.engine.lock().await;
            let overall = engine.compute_overall();
            info!(
                "up {}: PM2.5 {:.1} PM10 {:.1} CO2 {:.0} ppm, {:.1}°C {:.1}% {:.0} Pa, AQI {} {} ({} outliers dropped)",
                units::millis_human_readable(monotonic_ms()),
                engine.current_smoothed(Quantity::Pm2_5),
                engine.current_smoothed(Quantity::Pm10_0),
                engine.current_smoothed(Quantity::Co2),
                engine.current_smoothed(Quantity::Temperature),
                engine.current_smoothed(Quantity::Humidity),
                engine.current_smoothed(Quantity::Pressure),
                overall.overall.index,
                overall.overall.category.tag,
                engine.total_rejected(),
            );
        }
    });
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.engine.lock().await.status(monotonic_ms());
    Json(status)
}

async fn handle_get_varz(State(state): State<AppState>) -> impl IntoResponse {
    let body = {
        let engine = state.engine.lock().await;
        metrics::render_varz(
            &engine,
            &state.labels,
            monotonic_ms(),
            state.config.monitor.metrics_warmup_ms,
        )
    };
    ([(header::CONTENT_TYPE, metrics::CONTENT_TYPE)], body)
}

async fn handle_favicon() -> impl IntoResponse {
    error_response(StatusCode::NOT_FOUND, "not found")
}

impl ConfigStore {
    fn new() -> Self {
        let data_dir = std::env::var("PNEUMATIC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.pneumatic"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
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
