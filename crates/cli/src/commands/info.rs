//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{AppConfig, CalibrationParams, CameraTier};
use serde::Serialize;
use tracing::info;

use super::load_config;
use crate::cli::InfoArgs;

const TIERS: [(CameraTier, f64); 4] = [
    (CameraTier::HighSpeed, 240.0),
    (CameraTier::Fast, 120.0),
    (CameraTier::Standard, 60.0),
    (CameraTier::Basic, 0.0),
];

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo<'a> {
    config: &'a AppConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tiers: Vec<TierInfo>,
}

#[derive(Serialize)]
struct TierInfo {
    tier: CameraTier,
    min_fps: f64,
    params: CalibrationParams,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.config.display(), "Loading configuration info");

    let config = load_config(&args.config)?;

    if args.json {
        let info = ConfigInfo {
            config: &config,
            tiers: if args.tiers { tier_table() } else { Vec::new() },
        };
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config, args)?;
    }

    Ok(())
}

fn tier_table() -> Vec<TierInfo> {
    TIERS
        .iter()
        .map(|&(tier, min_fps)| TierInfo {
            tier,
            min_fps,
            params: tier.params(),
        })
        .collect()
}

fn print_config_info(config: &AppConfig, args: &InfoArgs) -> Result<()> {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 truetime Configuration                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("🕒 Sync");
    println!("   ├─ Servers: {}", config.sync.servers.join(", "));
    println!("   ├─ Port: {}", config.sync.port);
    println!(
        "   ├─ Burst: {} x {} ms timeout, {} ms pause",
        config.sync.burst_size, config.sync.timeout_ms, config.sync.sample_pause_ms
    );
    println!("   └─ Resync every {} s", config.sync.resync_interval_s);

    let calibration = &config.calibration;
    println!("\n📷 Calibration");
    println!("   ├─ Minimum samples: {}", calibration.min_samples);
    println!("   ├─ Flash queue: {}", calibration.flash_queue_capacity);
    println!("   ├─ Stop timeout: {} ms", calibration.stop_timeout_ms);
    match calibration.run_duration_override_s {
        Some(secs) => println!("   └─ Run duration: {} s (override)", secs),
        None => println!("   └─ Run duration: per camera tier"),
    }

    println!("\n💾 Compensation");
    println!(
        "   ├─ State file: {}",
        config.compensation.state_path.display()
    );
    println!(
        "   └─ Fallback refresh: {} Hz",
        config.compensation.fallback_refresh_hz
    );

    if args.tiers {
        println!("\n🎚  Camera tiers");
        println!(
            "   {:<10} {:>7} {:>9} {:>10} {:>8} {:>8} {:>9}",
            "tier", "min fps", "flash ms", "period ms", "run s", "target", "expect ms"
        );
        for tier in tier_table() {
            let p = &tier.params;
            println!(
                "   {:<10} {:>7} {:>9} {:>10} {:>8} {:>8} {:>9}",
                format!("{:?}", tier.tier),
                tier.min_fps,
                p.flash_duration_ms,
                p.flash_period_ms,
                p.run_duration_secs,
                p.target_sample_count,
                p.expected_precision_ms
            );
        }
    }

    println!("\nEffective configuration (TOML):\n");
    let toml = config_loader::ConfigLoader::to_toml(config)
        .context("Failed to serialize configuration")?;
    println!("{}", toml);

    Ok(())
}
