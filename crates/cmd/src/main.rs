// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{collections::BTreeMap, path::PathBuf};

use bandprobe_app::{APP_NAME, AppConfig};
use bandprobe_base::readable_size::ReadableSize;
use bandprobe_common_telemetry::{
    logging::{LogFormat, LoggingOptions, init_tracing_subscriber},
    panic_hook::set_panic_hook,
};
use bandprobe_probe::{
    ProbeConfig, ProbeEndpoints, ProbeSnapshot, SpeedTest, SpeedTestConfig, SpeedTestReport,
    ThroughputProbe,
};
use bandprobe_server::{asset::AssetConfig, http::RestServerConfig};
use clap::{Args, Parser, Subcommand};
use jiff::SignedDuration;
use snafu::{ResultExt, Whatever, whatever};

mod build_info;

#[derive(Debug, Parser)]
#[clap(
name = "bandprobe",
about = "HTTP range server and throughput probe",
author = build_info::AUTHOR,
version = build_info::FULL_VERSION,
long_version = build_info::LONG_VERSION)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Server(ServerArgs),
    Probe(ProbeArgs),
    Speedtest(SpeedtestArgs),
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Serves the media asset with byte-range support until Ctrl+C or SIGTERM.
Examples:

bandprobe server --asset ./media/demo.mp4
bandprobe server --bind 0.0.0.0:3001 --extra trailer=./media/trailer.webm

")]
struct ServerArgs {
    /// Address to listen on
    #[arg(long, env = "BANDPROBE_BIND", default_value = "127.0.0.1:3001")]
    bind: String,

    /// File served at /video
    #[arg(long, env = "BANDPROBE_ASSET", default_value = "assets/video.mp4")]
    asset: PathBuf,

    /// Additional `id=path` files served at /asset/{id}
    #[arg(long = "extra", value_parser = parse_extra_asset)]
    extra_assets: Vec<(String, PathBuf)>,

    /// Transfer buffer per streamed response, e.g. `64KiB`
    #[arg(long, default_value = "64KiB")]
    read_buffer: ReadableSize,

    /// Disable the permissive CORS layer
    #[arg(long)]
    no_cors: bool,

    /// Directory for rotated log files; stdout only when unset
    #[arg(long, env = "BANDPROBE_LOG_DIR")]
    log_dir: Option<String>,

    /// Level filter, e.g. `info` or `debug,hyper=warn`
    #[arg(long, env = "BANDPROBE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    log_json: bool,
}

fn parse_extra_asset(value: &str) -> Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((id, path)) if !id.is_empty() && !path.is_empty() => {
            Ok((id.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected id=path, got {value:?}")),
    }
}

impl ServerArgs {
    fn app_config(&self) -> AppConfig {
        AppConfig::builder()
            .http_config(
                RestServerConfig::builder()
                    .bind_address(self.bind.as_str())
                    .enable_cors(!self.no_cors)
                    .build(),
            )
            .asset_config(
                AssetConfig::builder()
                    .video_path(self.asset.as_path())
                    .extra_assets(self.extra_assets.iter().cloned().collect::<BTreeMap<_, _>>())
                    .read_buffer_size(self.read_buffer)
                    .build(),
            )
            .logging(
                LoggingOptions::builder()
                    .dir(self.log_dir.clone().unwrap_or_default())
                    .maybe_level(self.log_level.clone())
                    .log_format(if self.log_json {
                        LogFormat::Json
                    } else {
                        LogFormat::Text
                    })
                    .build(),
            )
            .build()
    }

    async fn run(&self) -> Result<(), Whatever> { self.app_config().open().run().await }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Measures throughput against a running server by timing random range
requests, printing the current and maximum bitrate after every cycle.
Examples:

bandprobe probe --url http://127.0.0.1:3001
bandprobe probe --url http://10.0.0.2:3001 --interval 1s --cycles 20

")]
struct ProbeArgs {
    /// Server root URL
    #[arg(long, env = "BANDPROBE_URL", default_value = "http://127.0.0.1:3001")]
    url: String,

    /// Time between cycles, e.g. `3s` or `500ms`
    #[arg(long, default_value = "3s")]
    interval: SignedDuration,

    /// Stop after this many cycles; run until Ctrl+C when unset
    #[arg(long)]
    cycles: Option<u64>,

    /// Fixed seed for range selection
    #[arg(long)]
    seed: Option<u64>,
}

impl ProbeArgs {
    async fn run(&self) -> Result<(), Whatever> {
        let _guards = init_tracing_subscriber(APP_NAME);

        if self.interval.is_negative() || self.interval.is_zero() {
            whatever!("interval must be positive, got {}", self.interval);
        }
        let config = ProbeConfig::builder()
            .endpoints(ProbeEndpoints::with_base_url(self.url.as_str()))
            .interval(self.interval)
            .maybe_seed(self.seed)
            .build();
        let handle = ThroughputProbe::new(config)
            .whatever_context("Failed to create throughput probe")?
            .spawn();

        let mut snapshots = handle.subscribe();
        loop {
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = *snapshots.borrow_and_update();
                    println!("{}", format_snapshot(&snapshot));
                    if self.cycles.is_some_and(|limit| snapshot.cycles >= limit) {
                        break;
                    }
                }
                signal = tokio::signal::ctrl_c() => {
                    signal.whatever_context("Failed to listen for Ctrl+C")?;
                    break;
                }
            }
        }

        handle.wait_for_stop().await;
        Ok(())
    }
}

fn format_mbps(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |mbps| format!("{mbps:.1} Mbps"))
}

fn format_snapshot(snapshot: &ProbeSnapshot) -> String {
    format!(
        "#{:<4} current {:>12}  max {:>12}",
        snapshot.cycles,
        format_mbps(snapshot.current_mbps),
        format_mbps(snapshot.max_mbps),
    )
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Runs one ping, download and upload measurement against a running server.
Examples:

bandprobe speedtest --url http://127.0.0.1:3001
bandprobe speedtest --url http://127.0.0.1:3001 --json

")]
struct SpeedtestArgs {
    /// Server root URL
    #[arg(long, env = "BANDPROBE_URL", default_value = "http://127.0.0.1:3001")]
    url: String,

    /// Bytes to download, e.g. `1MiB`
    #[arg(long, default_value = "1MiB")]
    download: ReadableSize,

    /// Bytes to upload, e.g. `1MiB`
    #[arg(long, default_value = "1MiB")]
    upload: ReadableSize,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl SpeedtestArgs {
    async fn run(&self) -> Result<(), Whatever> {
        let _guards = init_tracing_subscriber(APP_NAME);

        let config = SpeedTestConfig::builder()
            .endpoints(ProbeEndpoints::with_base_url(self.url.as_str()))
            .download_size(self.download)
            .upload_size(self.upload)
            .build();
        let report = SpeedTest::new(config)
            .whatever_context("Failed to create speed test")?
            .run()
            .await;

        if self.json {
            let json =
                serde_json::to_string_pretty(&report).whatever_context("Failed to encode report")?;
            println!("{json}");
        } else {
            print_report(&report);
        }
        Ok(())
    }
}

fn print_report(report: &SpeedTestReport) {
    let ping = report
        .ping_ms
        .map_or_else(|| "-".to_string(), |ms| format!("{ms:.1} ms"));
    println!("Ping:     {ping}");
    println!("Download: {}", format_mbps(report.download_mbps));
    println!("Upload:   {}", format_mbps(report.upload_mbps));
}

#[tokio::main]
async fn main() -> Result<(), Whatever> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    set_panic_hook();

    let cli = Cli::parse();
    match cli.commands {
        Commands::Server(args) => args.run().await,
        Commands::Probe(args) => args.run().await,
        Commands::Speedtest(args) => args.run().await,
    }
}
