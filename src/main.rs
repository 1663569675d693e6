use std::{path::Path, thread};

use anyhow::{anyhow, bail, Context};
use clap::{App, Arg};
use indoc::indoc;
use log::{error, info, warn};
use lywsd03mmc::{
    config::Config,
    hub::{self, Hub, RequestKind},
    identity::is_valid_device_address,
    message::{Payload, Report},
    sink::Sink,
};
use tokio::time::Duration;

const DEFAULT_CONFIG: &str = "config.yaml";

fn load_config(path: &str) -> anyhow::Result<Config> {
    info!("open and parse config file {}", path);
    let file = std::fs::File::open(path).with_context(|| format!("failed to open file {}", path))?;
    serde_yaml::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("failed to parse config file {}", path))
}

async fn publish(sinks: &mut [Box<dyn Sink>], report: &Report) {
    for sink in sinks.iter_mut() {
        if let Err(e) = sink.update(report).await {
            error!("failed to publish report for {}: {:#}", report.device, e);
        }
    }
}

async fn poll_devices(hub: &Hub, sinks: &mut [Box<dyn Sink>], devices: &[String], kind: RequestKind) {
    for device in devices {
        match hub.poll(device, kind).await {
            Ok(payload) => publish(sinks, &Report::new(device.as_str(), payload)).await,
            Err(e) => error!("failed to poll device {}: {}", device, e),
        }
    }
}

async fn scan(hub: &Hub, sinks: &mut [Box<dyn Sink>]) -> anyhow::Result<()> {
    let samples = hub.scan().await.context("failed to scan for advertisements")?;
    info!("scan found {} sensors", samples.len());
    for sample in samples {
        let report = Report::new(sample.mac.clone(), Payload::Broadcast(sample));
        publish(sinks, &report).await;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cmd = App::new("lywsd03mmc")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Read live readings and hourly history from LYWSD03MMC sensors")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .help("Sets custom config file location")
                .long_help(indoc!(
                    "Sets custom config file location, default to read config.yaml if present
                    The custom config must be a file of YAML 1.2 format.
                    The following configuration keys are supported:
                    notification_timeout: optional, default 15s, wait for a single notification
                    history_progress: optional, default false, print each history record as it arrives
                    scan_duration: optional, default 10s, listening time of --scan
                    scan_retries: optional, default 3, max number of retry when a scan fails
                    connect_retry: optional, default 3, max number of retry when connection fails
                    devices: optional, MAC addresses polled when none are given
                    sinks: optional, default [Console], list of Console or File: {path: ...}
                    "
                ))
                .value_name("FILE")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("history")
                .long("history")
                .help("Download the hourly min/max history")
                .conflicts_with("info"),
        )
        .arg(
            Arg::with_name("info")
                .long("info")
                .help("Show firmware, hardware, units and stored record count"),
        )
        .arg(
            Arg::with_name("scan")
                .long("scan")
                .help("Collect readings from advertisements instead of connecting")
                .conflicts_with_all(&["history", "info"]),
        )
        .arg(
            Arg::with_name("progress")
                .long("progress")
                .help("Print every history record as it arrives"),
        )
        .arg(
            Arg::with_name("devices")
                .value_name("DEVICE")
                .help("MAC addresses of the sensors to poll")
                .multiple(true),
        )
        .get_matches();
    env_logger::init();

    let mut config = match cmd.value_of("config") {
        Some(path) => load_config(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => load_config(DEFAULT_CONFIG)?,
        None => Config::default(),
    };
    if cmd.is_present("progress") {
        config.backend.session.history_progress = true;
    }

    let devices: Vec<String> = match cmd.values_of("devices") {
        Some(values) => values.map(String::from).collect(),
        None => config.devices.clone(),
    };
    for device in &devices {
        if !is_valid_device_address(device) {
            warn!("{} is not a LYWSD03MMC address, polling anyway", device);
        }
    }

    let scanning = cmd.is_present("scan");
    let kind = if cmd.is_present("history") {
        RequestKind::History
    } else if cmd.is_present("info") {
        RequestKind::Info
    } else {
        RequestKind::Reading
    };
    if !scanning && devices.is_empty() {
        bail!("no device given, pass MAC addresses or list them in the config file");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let (hub, backend) = hub::init(config.backend.clone()).context("failed to set up bluetooth")?;
    let backend_handle = thread::spawn(move || backend.serve());

    let sink_configs = config.sinks;
    let result = runtime.block_on(async move {
        let mut sinks = Vec::with_capacity(sink_configs.len());
        for sink in sink_configs {
            sinks.push(sink.into_sink().await?);
        }

        if scanning {
            scan(&hub, &mut sinks).await?;
        } else {
            poll_devices(&hub, &mut sinks, &devices, kind).await;
        }
        Ok::<_, anyhow::Error>(())
    });

    backend_handle
        .join()
        .map_err(|_| anyhow!("bluetooth backend panicked"))?;
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}
