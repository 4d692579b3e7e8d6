//! Simulated bottle cycle example
//!
//! Run with: cargo run --example bottle_monitor

use fpa_hass::{
    Bottle, BottleId, Device, EntryConfig, FpaIntegration, MemoryClient, Result, Shadow,
    VolumeUnit,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("fpa_hass=debug").init();

    println!("Bottle Monitor");
    println!("==============\n");

    let shadow = Shadow::new(37.0, 4.0, 4.0, VolumeUnit::Oz);
    let device = Device::new("fpa-demo", "Nursery FPA")
        .with_shadow(shadow.clone())
        .with_bottle(Bottle {
            id: BottleId::new(1)?,
            volume: 4.0,
            volume_unit: VolumeUnit::Oz,
            formula: "Similac Pro-Advance".to_string(),
        });

    let client = Arc::new(MemoryClient::new([device.clone()]));
    let integration =
        FpaIntegration::setup_entry(&EntryConfig::new("demo", "demo-token"), client.clone())
            .await?;

    let sensor = integration
        .sensor("fpa-demo")
        .cloned()
        .ok_or_else(|| fpa_hass::Error::DeviceNotFound {
            device_id: "fpa-demo".to_string(),
        })?;

    let mut rx = sensor.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(state) = rx.recv().await {
            println!(
                "  {:<24} {:<18} assumed={}",
                state.status.as_str(),
                state.icon.as_str(),
                state.assumed_state
            );
        }
    });

    println!("Initial: {}\n", sensor.state());

    sensor.start_bottle(BottleId::new(1)?).await?;

    let steps = [
        shadow.clone().with_making_bottle(true),
        shadow.clone(),
        shadow.clone().with_bottle_missing(true),
        shadow.clone(),
    ];
    for step in steps {
        tokio::time::sleep(Duration::from_millis(500)).await;
        client.push(device.clone().with_shadow(step));
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("\nAttributes:");
    for (key, value) in sensor.extra_state_attributes() {
        println!("  {}: {}", key, value);
    }

    integration.unload().await?;
    drop(integration);
    drop(sensor);
    printer.abort();

    Ok(())
}
