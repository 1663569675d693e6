use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
};

use super::Sink;
use crate::message::{Payload, Report};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    path: String,
}

pub struct FileSink {
    path: String,
    file: File,
}

impl FileSink {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(true)
            .open(&config.path)
            .await
            .with_context(|| format!("failed to open file {}", config.path))?;
        Ok(Self {
            file,
            path: config.path,
        })
    }
}

/// One CSV row per reading, history record or advertisement, tagged by kind.
fn csv_lines(report: &Report) -> Vec<String> {
    match &report.payload {
        Payload::Reading(sample) => vec![format!(
            "reading,{},{},{},{},{}\n",
            report.device,
            report.timestamp.to_rfc3339(),
            sample.temperature,
            sample.humidity,
            sample.battery
        )],
        Payload::History { records, .. } => records
            .values()
            .map(|record| {
                format!(
                    "history,{},{},{},{},{},{},{}\n",
                    report.device,
                    record.index,
                    record.timestamp.to_rfc3339(),
                    record.min_temperature,
                    record.min_humidity,
                    record.max_temperature,
                    record.max_humidity
                )
            })
            .collect(),
        Payload::Info(info) => vec![format!(
            "info,{},{},{},{},{}\n",
            report.device,
            report.timestamp.to_rfc3339(),
            info.firmware,
            info.hardware,
            info.units
        )],
        Payload::Broadcast(sample) => vec![format!(
            "broadcast,{},{},{},{},{},{},{},{}\n",
            sample.mac,
            report.timestamp.to_rfc3339(),
            sample.temperature,
            sample.humidity,
            sample.battery,
            sample.voltage,
            sample.rssi.map(|rssi| rssi.to_string()).unwrap_or_default(),
            sample.malformed
        )],
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn update(&mut self, report: &Report) -> anyhow::Result<()> {
        for line in csv_lines(report) {
            self.file
                .write_all(line.as_bytes())
                .await
                .with_context(|| format!("failed to append to file {}", self.path))?;
        }
        self.file
            .flush()
            .await
            .with_context(|| format!("failed to flush file {}", self.path))?;
        Ok(())
    }
}
