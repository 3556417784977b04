//! `profiles` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{
    DeviceContext, SandboxConfig, SdkError, SensorKind, SimulationConfig, StreamProfile,
    StreamProfileRequest,
};
use fleet::{select_profile, FleetError, MockContext};

use crate::cli::ProfilesArgs;
use crate::error::CliError;

/// One enumerated camera
#[derive(Serialize)]
struct DeviceListing {
    index: usize,
    name: String,
    serial_number: String,
    valid: bool,
    sensors: Vec<SensorListing>,
}

#[derive(Serialize)]
struct SensorListing {
    name: String,
    kind: SensorKind,
    /// Profile the default request resolves to on this sensor
    #[serde(skip_serializing_if = "Option::is_none")]
    selected: Option<StreamProfile>,
    profiles: Vec<StreamProfile>,
}

/// Execute the `profiles` command
pub fn run_profiles(args: &ProfilesArgs) -> Result<()> {
    let context = MockContext::from_simulation(&SimulationConfig {
        device_count: args.devices,
        ..Default::default()
    });
    info!(api_version = %context.api_version(), devices = args.devices, "Enumerating devices");

    let listings = collect_listings(&context, &SandboxConfig::default())?;

    if args.json {
        let json =
            serde_json::to_string_pretty(&listings).context("Failed to serialize device listing")?;
        println!("{json}");
    } else {
        print_listings(&context.api_version(), &listings);
    }

    Ok(())
}

fn collect_listings(
    context: &dyn DeviceContext,
    config: &SandboxConfig,
) -> Result<Vec<DeviceListing>, CliError> {
    let devices = context
        .query_devices()
        .map_err(enumeration_failed)?;

    let mut listings = Vec::with_capacity(devices.len());
    for (index, device) in devices.iter().enumerate() {
        let mut sensors = Vec::new();
        for sensor in device.sensors() {
            let request = match sensor.kind() {
                SensorKind::Color => Some(&config.color),
                SensorKind::Depth => Some(&config.depth),
                SensorKind::Motion => None,
            };
            let selected = match request {
                Some(request) => select_default(sensor.as_ref(), request)?,
                None => None,
            };
            sensors.push(SensorListing {
                name: sensor.name().to_string(),
                kind: sensor.kind(),
                selected,
                profiles: sensor
                    .stream_profiles()
                    .map_err(enumeration_failed)?,
            });
        }

        listings.push(DeviceListing {
            index,
            name: device.name().to_string(),
            serial_number: device.serial_number().to_string(),
            valid: device.is_valid(),
            sensors,
        });
    }
    Ok(listings)
}

fn select_default(
    sensor: &dyn contracts::Sensor,
    request: &StreamProfileRequest,
) -> Result<Option<StreamProfile>, CliError> {
    select_profile(sensor, request).map_err(enumeration_failed)
}

fn enumeration_failed(e: SdkError) -> CliError {
    CliError::Session(FleetError::Enumeration(e))
}

fn print_listings(api_version: &str, listings: &[DeviceListing]) {
    println!("SDK {api_version}");
    println!("{} DEVICES FOUND!", listings.len());
    for device in listings {
        println!();
        println!(
            "DEVICE {}: {} (serial {}){}",
            device.index,
            device.name,
            device.serial_number,
            if device.valid { "" } else { " [invalid]" }
        );
        for sensor in &device.sensors {
            println!("  {} [{}]", sensor.name, sensor.kind);
            for profile in &sensor.profiles {
                let marker = if sensor.selected.as_ref() == Some(profile) {
                    "*"
                } else {
                    " "
                };
                println!("   {marker} {profile}");
            }
        }
    }
}
