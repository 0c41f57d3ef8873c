use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use bme280::i2c::BME280;
use bme680::{
    Bme680, FieldDataCondition, I2CAddress, IIRFilterSize, OversamplingSetting, PowerMode,
    SettingsBuilder,
};
use embedded_svc::{
    http::Method,
    io::Write,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    delay::{Ets, TickType},
    gpio::AnyIOPin,
    i2c::{I2cConfig, I2cDriver},
    modem::Modem,
    prelude::Peripherals,
    uart::{config::Config as UartConfig, UartDriver},
    units::Hertz,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    http::server::{Configuration as HttpConfiguration, EspHttpConnection, EspHttpServer, Request},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
    wifi::{BlockingWifi, EspWifi},
};
use log::{debug, info, warn};
use serde::Serialize;

use pneumatic_common::{
    bus::lock_with_timeout,
    frames::{Co2Frame, FrameAssembler, PmsFrame, CO2_FRAME_LEN, PMS_FRAME_LEN},
    i2c::{Eh02I2c, MutexDevice},
    metrics, units, AirQualityEngine, DeviceLabels, DisplayFrame, EnvReading, EnvSensor,
    EnvironmentSensor, Quantity, RuntimeConfig, SensorError,
};

const NVS_NAMESPACE: &str = "pneumatic";
const NVS_RUNTIME_KEY: &str = "runtime_json";

const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;

type DeviceEnvSensor = EnvSensor<Bme280Sensor, Bme68xSensor>;

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<AirQualityEngine>>,
    bus: Arc<Mutex<()>>,
    i2c: &'static I2cBus,
    config: Arc<RuntimeConfig>,
    labels: Arc<DeviceLabels>,
}

/// The I2C peripheral every chip on the bus borrows through a
/// [`MutexDevice`]. [`AppState::bus`] is what serializes whole poll cycles.
type I2cBus = Mutex<I2cDriver<'static>>;
type BusDevice = MutexDevice<'static, I2cDriver<'static>>;

struct Bme280Sensor {
    device: BME280<BusDevice>,
    delay: Ets,
}

impl Bme280Sensor {
    fn probe(bus: &'static I2cBus, address: u8) -> Result<Self, SensorError> {
        let mut delay = Ets;
        let mut device = BME280::new(MutexDevice::new(bus), address);
        device
            .init(&mut delay)
            .map_err(|_| SensorError::NotFound("BME280"))?;
        Ok(Self { device, delay })
    }
}

impl EnvironmentSensor for Bme280Sensor {
    fn name(&self) -> &'static str {
        "BME280"
    }

    fn read(&mut self) -> Result<Option<EnvReading>, SensorError> {
        let measurement = self
            .device
            .measure(&mut self.delay)
            .map_err(|err| SensorError::Bus(format!("BME280 measure failed: {err:?}")))?;

        Ok(Some(EnvReading {
            temp_c: measurement.temperature,
            pressure_pa: measurement.pressure,
            humidity_pct: measurement.humidity,
        }))
    }
}

struct Bme68xSensor {
    device: Bme680<Eh02I2c<BusDevice>, Ets>,
    delay: Ets,
    profile: Duration,
}

impl Bme68xSensor {
    fn probe(bus: &'static I2cBus) -> Result<Self, SensorError> {
        let mut delay = Ets;
        let device = Eh02I2c(MutexDevice::new(bus));
        let mut device = Bme680::init(device, &mut delay, I2CAddress::Primary)
            .map_err(|_| SensorError::NotFound("BME68x"))?;

        let settings = SettingsBuilder::new()
            .with_humidity_oversampling(OversamplingSetting::OS2x)
            .with_pressure_oversampling(OversamplingSetting::OS4x)
            .with_temperature_oversampling(OversamplingSetting::OS8x)
            .with_temperature_filter(IIRFilterSize::Size3)
            .with_run_gas(false)
            .build();
        device
            .set_sensor_settings(&mut delay, settings)
            .map_err(|err| SensorError::Bus(format!("BME68x settings rejected: {err:?}")))?;
        let profile = device
            .get_profile_dur(&settings.0)
            .map_err(|err| SensorError::Bus(format!("BME68x profile unavailable: {err:?}")))?;

        Ok(Self {
            device,
            delay,
            profile,
        })
    }
}

impl EnvironmentSensor for Bme68xSensor {
    fn name(&self) -> &'static str {
        "BME68x"
    }

    fn read(&mut self) -> Result<Option<EnvReading>, SensorError> {
        self.device
            .set_sensor_mode(&mut self.delay, PowerMode::ForcedMode)
            .map_err(|err| SensorError::Bus(format!("BME68x trigger failed: {err:?}")))?;
        thread::sleep(self.profile);

        let (data, condition) = self
            .device
            .get_sensor_data(&mut self.delay)
            .map_err(|err| SensorError::Bus(format!("BME68x read failed: {err:?}")))?;
        if matches!(condition, FieldDataCondition::Unchanged) {
            return Ok(None);
        }

        Ok(Some(EnvReading {
            temp_c: data.temperature_celsius() as f32,
            pressure_pa: data.pressure_hpa() as f32 * 100.0,
            humidity_pct: data.humidity_percent() as f32,
        }))
    }
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();
    monotonic_ms();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut runtime = load_runtime_config(&nvs_partition).unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();
    let hardware = runtime.hardware.clone();

    let Peripherals {
        modem, i2c0, uart1, ..
    } = Peripherals::take()?;

    // Pin numbers were checked against the module's GPIO map by sanitize().
    let i2c = I2cDriver::new(
        i2c0,
        unsafe { AnyIOPin::new(hardware.i2c_sda_pin) },
        unsafe { AnyIOPin::new(hardware.i2c_scl_pin) },
        &I2cConfig::new().baudrate(Hertz(hardware.i2c_baud_hz)),
    )
    .context("failed to initialize I2C bus")?;
    let i2c: &'static I2cBus = Box::leak(Box::new(Mutex::new(i2c)));

    let uart = UartDriver::new(
        uart1,
        unsafe { AnyIOPin::new(hardware.pms_tx_pin) },
        unsafe { AnyIOPin::new(hardware.pms_rx_pin) },
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &UartConfig::default().baudrate(Hertz(hardware.pms_baud)),
    )
    .context("failed to initialize PMS serial port")?;

    let env_sensor: DeviceEnvSensor = EnvSensor::probe(
        || Bme280Sensor::probe(i2c, hardware.bme280_address),
        || Bme68xSensor::probe(i2c),
    );

    let mut engine = AirQualityEngine::new(runtime.monitor.clone());
    engine.set_env_sensor(env_sensor.name());

    let wifi = match connect_wifi(modem, sys_loop, nvs_partition) {
        Ok(wifi) => Some(wifi),
        Err(err) => {
            warn!("wifi unavailable, continuing offline: {err:#}");
            None
        }
    };
    let labels = device_labels(wifi.as_ref(), &runtime.http.hostname);

    let app_state = AppState {
        engine: Arc::new(Mutex::new(engine)),
        bus: Arc::new(Mutex::new(())),
        i2c,
        config: Arc::new(runtime),
        labels: Arc::new(labels),
    };

    if env_sensor.is_present() {
        spawn_env_thread(app_state.clone(), env_sensor)?;
    }
    spawn_co2_thread(app_state.clone())?;
    spawn_particulate_thread(app_state.clone(), uart)?;
    spawn_display_thread(app_state.clone())?;

    // Keep services alive for the program lifetime.
    let _wifi = wifi;
    let _server = create_http_server(app_state.clone())?;

    let summary_interval = Duration::from_millis(app_state.config.monitor.summary_log_interval_ms);
    loop {
        thread::sleep(summary_interval);
        log_summary(&app_state);
    }
}

fn spawn_env_thread(app_state: AppState, mut sensor: DeviceEnvSensor) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("env-poll".to_string())
        .stack_size(8192)
        .spawn(move || {
            let poll = Duration::from_millis(app_state.config.monitor.env_poll_ms);
            let bus_timeout = Duration::from_millis(app_state.config.monitor.bus_lock_timeout_ms);
            info!("{} polling every {} ms", sensor.name(), poll.as_millis());

            loop {
                let reading = match lock_with_timeout(&app_state.bus, bus_timeout) {
                    Ok(_bus) => sensor.poll(),
                    Err(err) => Err(err),
                };

                match reading {
                    Ok(Some(reading)) => lock(&app_state.engine).ingest_env(&reading),
                    Ok(None) => {}
                    Err(err) => warn!("{} poll skipped: {err:#}", sensor.name()),
                }
                thread::sleep(poll);
            }
        })
        .context("failed to spawn env thread")?;
    Ok(())
}

fn spawn_co2_thread(app_state: AppState) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("co2-poll".to_string())
        .stack_size(6144)
        .spawn(move || {
            let poll = Duration::from_millis(app_state.config.monitor.co2_poll_ms);
            let retry = Duration::from_millis(app_state.config.monitor.co2_retry_delay_ms);

            loop {
                match read_co2(&app_state) {
                    Ok(frame) => {
                        lock(&app_state.engine).ingest_co2(&frame);
                        thread::sleep(poll);
                    }
                    Err(err) => {
                        warn!("DS-CO2-20 read failed: {err:#}");
                        thread::sleep(retry);
                    }
                }
            }
        })
        .context("failed to spawn co2 thread")?;
    Ok(())
}

fn read_co2(app_state: &AppState) -> Result<Co2Frame, SensorError> {
    let monitor = &app_state.config.monitor;
    let co2_address = app_state.config.hardware.co2_address;
    let mut raw = [0_u8; CO2_FRAME_LEN];

    {
        let _bus = lock_with_timeout(
            &app_state.bus,
            Duration::from_millis(monitor.bus_lock_timeout_ms),
        )?;
        lock(app_state.i2c)
            .read(
                co2_address,
                &mut raw,
                TickType::new_millis(monitor.co2_read_timeout_ms).ticks(),
            )
            .map_err(|err| SensorError::Bus(format!("I2C read from {co2_address:#04x}: {err}")))?;
    }

    Ok(Co2Frame::parse(&raw)?)
}

fn spawn_particulate_thread(app_state: AppState, uart: UartDriver<'static>) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("pms-poll".to_string())
        .stack_size(6144)
        .spawn(move || {
            let timeout_ms = app_state.config.monitor.particulate_packet_timeout_ms;
            let retry = Duration::from_millis(app_state.config.monitor.particulate_retry_delay_ms);
            let mut assembler = FrameAssembler::<PMS_FRAME_LEN>::new();

            loop {
                match read_pms_frame(&uart, &mut assembler, timeout_ms) {
                    Ok(frame) => lock(&app_state.engine).ingest_particulate(&frame),
                    Err(err) => {
                        warn!("PMS read failed: {err:#}");
                        assembler.reset();
                        thread::sleep(retry);
                    }
                }
            }
        })
        .context("failed to spawn particulate thread")?;
    Ok(())
}

fn read_pms_frame(
    uart: &UartDriver<'static>,
    assembler: &mut FrameAssembler<PMS_FRAME_LEN>,
    timeout_ms: u64,
) -> Result<PmsFrame, SensorError> {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    let mut chunk = [0_u8; PMS_FRAME_LEN];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(SensorError::Timeout {
                what: "PMS frame",
                waited_ms: timeout_ms,
            });
        }

        // Never read past the end of the frame in progress.
        let want = assembler.remaining();
        let read = uart
            .read(&mut chunk[..want], TickType::from(remaining).ticks())
            .map_err(|err| SensorError::Bus(format!("PMS serial read: {err}")))?;

        if let (Some(frame), _) = assembler.extend(&chunk[..read]) {
            return Ok(PmsFrame::parse(&frame)?);
        }
    }
}

fn spawn_display_thread(app_state: AppState) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("display".to_string())
        .stack_size(4096)
        .spawn(move || {
            let refresh = Duration::from_millis(app_state.config.monitor.display_refresh_ms);
            loop {
                let overall = lock(&app_state.engine).compute_overall();
                let frame = DisplayFrame::from_status(&overall, monotonic_ms());
                debug!(
                    "display: AQI {} ({}) bg {:#06x} fg {:#06x}, CO2 {} ppm, up {}",
                    frame.aqi,
                    frame.aqi_message,
                    frame.aqi_background.to_rgb565(),
                    frame.aqi_foreground.to_rgb565(),
                    frame.co2_ppm,
                    frame.uptime
                );
                thread::sleep(refresh);
            }
        })
        .context("failed to spawn display thread")?;
    Ok(())
}

fn log_summary(app_state: &AppState) {
    let engine = lock(&app_state.engine);
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

fn create_http_server(app_state: AppState) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        http_port: app_state.config.http.port,
        stack_size: 10 * 1024,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    for path in ["/", "/statusz", "/api/status"] {
        let app_state = app_state.clone();
        server.fn_handler::<anyhow::Error, _>(path, Method::Get, move |req| {
            let status = lock(&app_state.engine).status(monotonic_ms());
            write_json(req, 200, &status)
        })?;
    }

    for path in ["/varz", "/metrics"] {
        let app_state = app_state.clone();
        server.fn_handler::<anyhow::Error, _>(path, Method::Get, move |req| {
            let body = metrics::render_varz(
                &lock(&app_state.engine),
                &app_state.labels,
                monotonic_ms(),
                app_state.config.monitor.metrics_warmup_ms,
            );
            req.into_response(200, Some("OK"), &[("Content-Type", metrics::CONTENT_TYPE)])?
                .write_all(body.as_bytes())?;
            Ok(())
        })?;
    }

    server.fn_handler::<anyhow::Error, _>("/favicon.ico", Method::Get, |req| {
        write_json(req, 404, &serde_json::json!({ "error": "not found" }))
    })?;

    Ok(server)
}

fn write_json<T: Serialize>(
    req: Request<&mut EspHttpConnection<'_>>,
    status_code: u16,
    payload: &T,
) -> anyhow::Result<()> {
    let body = serde_json::to_vec(payload)?;
    req.into_response(
        status_code,
        None,
        &[("Content-Type", "application/json; charset=utf-8")],
    )?
    .write_all(&body)?;
    Ok(())
}

fn load_runtime_config(partition: &EspDefaultNvsPartition) -> anyhow::Result<RuntimeConfig> {
    let nvs = EspNvs::new(partition.clone(), NVS_NAMESPACE, true)?;
    let mut buffer = vec![0_u8; 2048];

    match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
        Some(value) => Ok(serde_json::from_str::<RuntimeConfig>(value)?),
        None => Ok(RuntimeConfig::default()),
    }
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
) -> anyhow::Result<EspWifi<'static>> {
    let ssid = option_env!("WIFI_SSID").unwrap_or_default();
    let pass = option_env!("WIFI_PASS").unwrap_or_default();
    if ssid.is_empty() {
        return Err(anyhow!("WIFI_SSID was not set at build time"));
    }

    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: ssid.try_into().map_err(|_| anyhow!("wifi ssid too long"))?,
        password: pass
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method: if pass.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        },
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{ssid}`");

    let mut last_err = None;
    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected on attempt {attempt}");
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
        Some(err) => Err(anyhow::Error::from(err).context("all wifi connect attempts failed")),
    }
}

fn device_labels(wifi: Option<&EspWifi<'static>>, hostname: &str) -> DeviceLabels {
    let mut labels = DeviceLabels {
        hostname: hostname.to_string(),
        ..DeviceLabels::default()
    };

    if let Some(wifi) = wifi {
        let netif = wifi.sta_netif();
        if let Ok(mac) = netif.get_mac() {
            labels.mac_address = mac
                .iter()
                .map(|byte| format!("{byte:02x}"))
                .collect::<Vec<_>>()
                .join(":");
        }
        if let Ok(ip_info) = netif.get_ip_info() {
            labels.ip_address = ip_info.ip.to_string();
        }
    }
    labels
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn monotonic_ms() -> u64 {
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
