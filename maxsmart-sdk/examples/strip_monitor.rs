//! Live monitor for one MaxSmart strip
//!
//! Discovers the strip at the given address (or the first strip that
//! answers a broadcast), prints its ports, then prints every consumption
//! and switch change until Ctrl+C.
//!
//! Run with: cargo run -p maxsmart-sdk --example strip_monitor -- [IP]

use maxsmart_sdk::{discover, ChangeEvent, DeviceSession, DiscoveryOptions, SdkError, SessionConfig};
use std::net::IpAddr;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), SdkError> {
    if let Err(e) = maxsmart_sdk::logging::init_logging_from_env() {
        eprintln!("logging disabled: {}", e);
    }

    let ip: IpAddr = match std::env::args().nth(1) {
        Some(arg) => match arg.parse() {
            Ok(ip) => ip,
            Err(_) => {
                eprintln!("not an IP address: {}", arg);
                return Ok(());
            }
        },
        None => {
            println!("Discovering MaxSmart strips...");
            let devices = discover(&DiscoveryOptions::broadcast(Duration::from_secs(3))).await?;
            match devices.first() {
                Some(device) => {
                    println!("Found {} strip(s), using {}", devices.len(), device.ip_address);
                    device.ip_address
                }
                None => {
                    println!("No strips answered; make sure they are on this network");
                    return Ok(());
                }
            }
        }
    };

    let mut session = DeviceSession::new(ip, SessionConfig::from_env()?);
    session.initialize().await?;

    if let Some(device) = session.descriptor() {
        println!(
            "\n{} ({}) firmware {} over {}",
            device.strip_label(),
            device.serial,
            device.firmware_version,
            device.protocol
        );
    }
    for (port, label) in session.port_mapping()? {
        println!("  Port {}: {}", port, label);
    }

    let state = session.read_state().await?;
    for (index, (switch, watts)) in state.switch_states.iter().zip(&state.watt_values).enumerate() {
        let status = if *switch == 1 { "ON " } else { "OFF" };
        println!("  [{}] {} {:>8.2} W", index + 1, status, watts);
    }

    let mut changes = session.watch_changes("monitor").await?;
    session.start_polling()?;
    println!("\nWatching for changes (Ctrl+C to exit)...");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = changes.recv() => match event {
                Some(ChangeEvent::Consumption { port, port_name, previous_watt, current_watt, .. }) => {
                    let label = port_name.unwrap_or_else(|| format!("Port {}", port));
                    println!("  {}: {:.2} W -> {:.2} W", label, previous_watt, current_watt);
                }
                Some(ChangeEvent::State { port, port_name, current_state, .. }) => {
                    let label = port_name.unwrap_or_else(|| format!("Port {}", port));
                    println!("  {} switched {}", label, if current_state == 1 { "on" } else { "off" });
                }
                None => break,
            },
        }
    }

    if let Some(stats) = session.polling_stats() {
        println!("\n{}", stats);
    }
    session.close().await
}
