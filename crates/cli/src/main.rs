//! mousecfg CLI: command-line mouse configuration tool.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mousecfg_core::buttons::{BindTarget, ButtonBinding, MouseButtonPosition};
use mousecfg_core::config::TransportConfig;
use mousecfg_core::device::{discover_devices, group_by_device, Registry};
use mousecfg_core::event::ConfiguratorEvent;
use mousecfg_core::led::{Color, LedMode, LedZone};
use mousecfg_core::manager::DeviceManager;
use mousecfg_core::safety::{self, WRITE_DISCLAIMER};
use mousecfg_core::transport::{HidTransport, HidapiTransport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Parser)]
#[command(
    name = "mousecfg",
    version,
    about = "Open-source SteelSeries mouse configuration",
    after_help = WRITE_DISCLAIMER
)]
struct Cli {
    /// Transport config file (JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// How long to wait for device answers, in milliseconds.
    #[arg(long, global = true, default_value_t = 500)]
    wait_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List connected supported mice.
    ListDevices,
    /// Show firmware, capabilities, and current settings.
    Info,
    /// Set the color of a lighting zone.
    SetLed {
        /// Zone: logo, wheel, front, side, bottom, all.
        #[arg(long)]
        zone: String,
        /// Color as "r,g,b" or "#rrggbb".
        #[arg(long)]
        color: String,
        /// Effect: off, static, breathing, color-shift. Keeps the current one if omitted.
        #[arg(long)]
        mode: Option<String>,
    },
    /// Set the CPI of one DPI level (rounded to the device's step).
    SetDpi {
        /// DPI level index, starting at 0.
        level: u8,
        /// CPI value.
        cpi: u16,
    },
    /// Remap a button.
    SetButton {
        /// Button: left, right, middle, back, forward, dpi.
        position: String,
        /// Binding kind: mouse, key, macro, dpi, disabled.
        binding: String,
        /// Target: a button name, a HID usage ID, a macro slot, or up/down/cycle.
        #[arg(default_value = "")]
        target: String,
    },
    /// Switch to an onboard profile.
    Profile {
        /// Profile id, starting at 0.
        id: u8,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => TransportConfig::load(path)?,
        None => TransportConfig::default(),
    };
    let registry = Registry::builtin();

    if let Commands::ListDevices = cli.command {
        return list_devices(&registry);
    }

    let mut manager = DeviceManager::new(registry);
    let mut events = manager.events().channel();
    connect_first(&mut manager, &config).await?;

    let wait = Duration::from_millis(cli.wait_ms);
    let result = run_command(&manager, &mut events, cli.command, wait).await;
    if let Err(e) = manager.disconnect().await {
        tracing::warn!(error = %e, "Closing the device failed");
    }
    result
}

fn list_devices(registry: &Registry) -> Result<()> {
    let devices = discover_devices(registry)?;
    if devices.is_empty() {
        println!("No supported mice found.");
        println!("Ensure your mouse is connected and HID access is set up.");
        return Ok(());
    }
    for (filter, interfaces) in group_by_device(devices) {
        let name = registry
            .entries()
            .iter()
            .find(|e| e.filter == filter)
            .map_or("Unknown", |e| e.name);
        println!("{name} ({filter})");
        for info in interfaces {
            println!("  interface {}: {}", info.interface_number, info.path);
        }
    }
    Ok(())
}

/// Open the first supported device with all of its interfaces.
async fn connect_first(manager: &mut DeviceManager, config: &TransportConfig) -> Result<()> {
    let devices = discover_devices(manager.registry())?;
    let (filter, interfaces) = group_by_device(devices)
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("No supported mouse found"))?;

    let transports: Vec<Arc<dyn HidTransport>> = interfaces
        .into_iter()
        .map(|info| {
            let transport = HidapiTransport::new(info, config.clone());
            Arc::new(transport) as Arc<dyn HidTransport>
        })
        .collect();
    let configurator = manager
        .connect(transports)
        .await
        .with_context(|| format!("open device {filter}"))?;
    println!("Connected to {} ({filter})", configurator.name());
    Ok(())
}

async fn run_command(
    manager: &DeviceManager,
    events: &mut UnboundedReceiver<ConfiguratorEvent>,
    command: Commands,
    wait: Duration,
) -> Result<()> {
    match command {
        // Handled before connecting
        Commands::ListDevices => {}
        Commands::Info => {
            print_capabilities(manager);
            match manager.query_firmware_version(wait).await {
                Ok(version) => println!("Firmware: {version}"),
                Err(e) => tracing::warn!(error = %e, "Firmware query failed"),
            }
            manager.request_current_config().await?;
            pump_events(manager, events, wait).await;
        }
        Commands::SetLed { zone, color, mode } => {
            let zone = LedZone::from_name(&zone)
                .ok_or_else(|| anyhow::anyhow!("Unknown zone '{zone}'"))?;
            let color = Color::parse(&color)?;
            eprintln!("{WRITE_DISCLAIMER}\n");
            match mode {
                Some(mode) => {
                    let mode = LedMode::from_name(&mode)
                        .ok_or_else(|| anyhow::anyhow!("Unknown LED mode '{mode}'"))?;
                    manager.set_led_mode(color, zone, mode).await?;
                }
                None => manager.set_led(color, zone).await?,
            }
            println!("{zone} set to {color}");
        }
        Commands::SetDpi { level, cpi } => {
            let caps = manager.dpi_capabilities()?;
            let validated = safety::validate_dpi(&caps, cpi)?;
            eprintln!("{WRITE_DISCLAIMER}\n");
            manager.set_dpi_level(level, cpi).await?;
            println!("DPI level {level} set to {validated}");
        }
        Commands::SetButton {
            position,
            binding,
            target,
        } => {
            let position = MouseButtonPosition::from_name(&position)
                .ok_or_else(|| anyhow::anyhow!("Unknown button '{position}'"))?;
            let binding = ButtonBinding::from_name(&binding).ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown binding '{binding}'. Valid bindings: mouse, key, macro, dpi, disabled"
                )
            })?;
            let target = BindTarget::parse(binding, &target)?;
            eprintln!("{WRITE_DISCLAIMER}\n");
            manager.set_button(position, binding, target).await?;
            println!("Set {position} to {target}");
        }
        Commands::Profile { id } => {
            manager.request_profile(id).await?;
            pump_events(manager, events, wait).await;
        }
    }
    Ok(())
}

fn print_capabilities(manager: &DeviceManager) {
    if let Some(configurator) = manager.active() {
        println!("Capabilities: {}", configurator.capabilities());
    }
    if let Ok(led) = manager.led_capabilities() {
        for (zone, range) in led.iter() {
            println!("  LED zone {zone}: {range:?}");
        }
    }
    if let Ok(dpi) = manager.dpi_capabilities() {
        println!(
            "  DPI: {}..={} step {}, {} levels",
            dpi.min, dpi.max, dpi.step, dpi.levels
        );
    }
    if let Ok(buttons) = manager.buttons_capabilities() {
        for position in buttons.positions() {
            println!("  Button {position}: programmable");
        }
    }
    if let Ok(count) = manager.profile_count() {
        println!("  Onboard profiles: {count}");
    }
}

/// Dispatch input reports and print events until the device goes quiet.
async fn pump_events(
    manager: &DeviceManager,
    events: &mut UnboundedReceiver<ConfiguratorEvent>,
    wait: Duration,
) {
    let Some(configurator) = manager.active() else {
        return;
    };
    let printing = async {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    };
    let _ = tokio::time::timeout(wait, async {
        tokio::select! {
            _ = configurator.run() => {}
            _ = printing => {}
        }
    })
    .await;
}

fn print_event(event: &ConfiguratorEvent) {
    match event {
        ConfiguratorEvent::Connected { .. } => {}
        // Printed by the query that asked for it
        ConfiguratorEvent::FirmwareVersionReceived(_) => {}
        ConfiguratorEvent::LedStateReceived { zone, state } => {
            println!("LED {zone}: {} ({:?})", state.color, state.mode)
        }
        ConfiguratorEvent::DpiLevelsReceived(levels) => println!("DPI levels: {levels}"),
        ConfiguratorEvent::ButtonBindingReceived { position, target } => {
            println!("Button {position}: {target}")
        }
        ConfiguratorEvent::ProfileReceived { id } => println!("Active profile: {id}"),
    }
}
