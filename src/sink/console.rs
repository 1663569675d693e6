use async_trait::async_trait;

use super::Sink;
use crate::message::{Payload, Report};

pub struct ConsoleSink;

#[async_trait]
impl Sink for ConsoleSink {
    async fn update(&mut self, report: &Report) -> anyhow::Result<()> {
        match &report.payload {
            Payload::Reading(sample) => println!(
                "[reading] {}: device {} reports temp {}C, humidity {}%, battery {}%",
                report.timestamp, report.device, sample.temperature, sample.humidity, sample.battery
            ),
            Payload::History { records, stop } => {
                let status = match stop {
                    Some(reason) => format!("{:?}", reason),
                    None => "interrupted".to_string(),
                };
                println!(
                    "[history] {}: device {} returned {} records ({})",
                    report.timestamp,
                    report.device,
                    records.len(),
                    status
                );
                for record in records.values() {
                    println!(
                        "  #{} {}: {} to {}C, {} to {}%",
                        record.index,
                        record.timestamp,
                        record.min_temperature,
                        record.max_temperature,
                        record.min_humidity,
                        record.max_humidity
                    );
                }
            }
            Payload::Info(info) => println!(
                "[info] {}: device {} firmware {}, hardware {}, units {}, {} stored records",
                report.timestamp,
                report.device,
                info.firmware,
                info.hardware,
                info.units,
                info.entries.total
            ),
            Payload::Broadcast(sample) => println!(
                "[broadcast] {}: device {} reports temp {}C, humidity {}%, battery {}% ({}V), rssi {:?}{}",
                report.timestamp,
                sample.mac,
                sample.temperature,
                sample.humidity,
                sample.battery,
                sample.voltage,
                sample.rssi,
                if sample.malformed { ", malformed" } else { "" }
            ),
        }
        Ok(())
    }
}
