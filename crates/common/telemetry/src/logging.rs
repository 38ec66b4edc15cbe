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

use std::{
    env,
    io::IsTerminal,
    sync::{Arc, Mutex, Once},
};

use bon::Builder;
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, de};
use smart_default::SmartDefault;
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter, layer::SubscriberExt, registry::LookupSpan,
};

/// Deserializes a string value, using `Default::default()` if the string is
/// empty.
///
/// # Errors
/// Returns an error if deserialization fails.
pub fn empty_string_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        Ok(T::default())
    } else {
        T::deserialize(de::value::StrDeserializer::new(&s)).map_err(|e: de::value::Error| {
            de::Error::custom(format!("invalid value, expect empty string, err: {e}"))
        })
    }
}

/// The default directory name for log files when file logging is enabled.
pub const DEFAULT_LOGGING_DIR: &str = "logs";

/// Configuration options for the logging system.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, Builder)]
#[serde(default)]
pub struct LoggingOptions {
    /// Directory for rotated log files. Empty means stdout only.
    #[default = ""]
    #[builder(default)]
    pub dir: String,

    /// Level filter such as `"info"` or `"debug,hyper=warn"`. Falls back to
    /// `RUST_LOG`, then to `"info"`.
    pub level: Option<String>,

    /// Output format for log lines.
    #[serde(default, deserialize_with = "empty_string_as_default")]
    #[builder(default)]
    pub log_format: LogFormat,

    /// Maximum number of hourly files kept per log kind (720 = 30 days).
    #[default = 720]
    #[builder(default = 720)]
    pub max_log_files: usize,

    /// Whether to also write to stdout when file logging is enabled.
    #[default = true]
    #[builder(default = true)]
    pub append_stdout: bool,
}

/// Available log output formats.
#[derive(
    Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, Default, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per event, with the current span and span list.
    Json,

    /// Human-readable lines:
    /// ```text
    /// 2024-01-01T12:00:00.123Z  INFO bandprobe_server::http: REST server started
    /// ```
    #[default]
    Text,
}

/// Initialize stdout logging with default options.
///
/// The returned guards must be kept alive; dropping them stops the background
/// writer threads.
#[must_use]
pub fn init_tracing_subscriber(app_name: &str) -> Vec<WorkerGuard> {
    init_global_logging(app_name, &LoggingOptions::default())
}

/// Initialize logging for unit and integration tests.
///
/// Reads `UNITTEST_LOG_DIR` (default `/tmp/__unittest_logs`) and
/// `UNITTEST_LOG_LEVEL`. Safe to call from every test; only the first call
/// installs the subscriber.
pub fn init_default_ut_logging() {
    static START: Once = Once::new();

    START.call_once(|| {
        let Ok(mut g) = GLOBAL_UT_LOG_GUARD.as_ref().lock() else {
            return;
        };

        let dir =
            env::var("UNITTEST_LOG_DIR").unwrap_or_else(|_| "/tmp/__unittest_logs".to_string());

        let level = env::var("UNITTEST_LOG_LEVEL").unwrap_or_else(|_| {
            "debug,hyper=warn,hyper_util=warn,tower=warn,reqwest=warn,h2=info".to_string()
        });
        let opts = LoggingOptions {
            dir: dir.clone(),
            level: Some(level),
            ..Default::default()
        };
        *g = Some(init_global_logging("unittest", &opts));

        tracing::info!("logs dir = {}", dir);
    });
}

static GLOBAL_UT_LOG_GUARD: Lazy<Arc<Mutex<Option<Vec<WorkerGuard>>>>> =
    Lazy::new(|| Arc::new(Mutex::new(None)));

const DEFAULT_LOG_TARGETS: &str = "info";

fn fmt_layer<S>(
    writer: NonBlocking,
    format: LogFormat,
    ansi: bool,
) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::Layer::new()
            .json()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::Layer::new()
            .with_writer(writer)
            .with_ansi(ansi)
            .boxed(),
    }
}

fn rolling_appender(dir: &str, prefix: &str, max_log_files: usize) -> RollingFileAppender {
    RollingFileAppender::builder()
        .rotation(Rotation::HOURLY)
        .filename_prefix(prefix)
        .max_log_files(max_log_files)
        .build(dir)
        .unwrap_or_else(|e| panic!("initializing rolling file appender at {dir} failed: {e}"))
}

/// Install the global tracing subscriber.
///
/// Layers, depending on `opts`:
///
/// - stdout (`append_stdout`), ANSI colours only on a terminal
/// - `{app_name}.*` hourly files with every event (`dir` set)
/// - `{app_name}-err.*` hourly files with `ERROR` events only (`dir` set)
///
/// Only the first call in a process has any effect.
///
/// # Panics
///
/// Panics when the log directory cannot be created, the level string does not
/// parse, or another global subscriber is already installed. Logging problems
/// must surface at startup.
pub fn init_global_logging(app_name: &str, opts: &LoggingOptions) -> Vec<WorkerGuard> {
    static START: Once = Once::new();
    let mut guards = vec![];

    START.call_once(|| {
        LogTracer::init().expect("log tracer must be valid");

        let stdout_logging_layer = if opts.append_stdout || opts.dir.is_empty() {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            guards.push(guard);
            Some(fmt_layer(
                writer,
                opts.log_format,
                std::io::stdout().is_terminal(),
            ))
        } else {
            None
        };

        let (file_logging_layer, err_file_logging_layer) = if opts.dir.is_empty() {
            (None, None)
        } else {
            let (writer, guard) = tracing_appender::non_blocking(rolling_appender(
                &opts.dir,
                app_name,
                opts.max_log_files,
            ));
            guards.push(guard);
            let all = fmt_layer(writer, opts.log_format, false);

            let (writer, guard) = tracing_appender::non_blocking(rolling_appender(
                &opts.dir,
                &format!("{app_name}-err"),
                opts.max_log_files,
            ));
            guards.push(guard);
            let errors = fmt_layer(writer, opts.log_format, false)
                .with_filter(filter::LevelFilter::ERROR)
                .boxed();

            (Some(all), Some(errors))
        };

        let filter = opts
            .level
            .as_deref()
            .or(env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())
            .unwrap_or(DEFAULT_LOG_TARGETS)
            .parse::<filter::Targets>()
            .expect("error parsing log level string");

        let subscriber = Registry::default()
            .with(filter)
            .with(stdout_logging_layer)
            .with(file_logging_layer)
            .with(err_file_logging_layer);

        tracing::subscriber::set_global_default(subscriber)
            .expect("error setting global tracing subscriber");
    });

    guards
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_options_from_json() {
        let opts: LoggingOptions =
            serde_json::from_str(r#"{"dir":"/var/log/bandprobe","log_format":"json"}"#).unwrap();
        assert_eq!(opts.dir, "/var/log/bandprobe");
        assert_eq!(opts.log_format, LogFormat::Json);
        assert_eq!(opts.max_log_files, 720);
        assert!(opts.append_stdout);
    }

    #[test]
    fn test_empty_log_format_is_default() {
        let opts: LoggingOptions = serde_json::from_str(r#"{"log_format":""}"#).unwrap();
        assert_eq!(opts.log_format, LogFormat::Text);
    }

    #[test]
    fn test_builder_defaults_match_default() {
        let built = LoggingOptions::builder().level("debug".to_string()).build();
        assert_eq!(built.max_log_files, 720);
        assert!(built.append_stdout);
        assert_eq!(built.level.as_deref(), Some("debug"));
    }
}
