use std::path::Path;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use geefetch::api::{self, DownloadReport};
use geefetch::core::config::GeefetchConfig;

use super::args::{CliArgs, Command, ConfigArg};
use super::errors::AppError;

/// Console logging, plus an appending file writer with `--logfile`.
///
/// The returned guard flushes the file writer when dropped.
fn init_logging(args: &CliArgs) -> Result<Option<WorkerGuard>, AppError> {
    let (own, others) = args.log_levels();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{others},geefetch={own}")));

    let (file_layer, guard) = match &args.logfile {
        Some(path) => {
            let invalid = || AppError::InvalidLogfile {
                path: path.display().to_string(),
            };
            let name = path.file_name().ok_or_else(invalid)?;
            let dir = match path.parent() {
                Some(d) if !d.as_os_str().is_empty() => d,
                _ => Path::new("."),
            };
            std::fs::create_dir_all(dir)?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))?;
    Ok(guard)
}

fn load(arg: &ConfigArg) -> Result<GeefetchConfig, AppError> {
    if !arg.config.exists() {
        return Err(AppError::MissingConfig {
            path: arg.config.display().to_string(),
        });
    }
    info!("Loading config from {:?}", arg.config);
    Ok(GeefetchConfig::load(&arg.config)?)
}

fn log_report(name: &str, report: &DownloadReport) {
    info!("{} download complete!", name);
    info!("Downloaded: {}", report.downloaded);
    info!("Skipped: {}", report.skipped);
    info!("Failed: {}", report.failed);
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    let _guard = init_logging(&args)?;

    match &args.command {
        Command::All(arg) => {
            let config = load(arg)?;
            for (name, report) in api::download_all(&config)? {
                log_report(name, &report);
            }
        }
        Command::Custom { name, config } => {
            let report = api::download_custom(&load(config)?, name)?;
            log_report(name, &report);
        }
        Command::Dynworld(arg) => log_report("dynworld", &api::download_dynworld(&load(arg)?)?),
        Command::Gedi { config, raster, .. } => {
            let config = load(config)?;
            if *raster {
                log_report("gedi_raster", &api::download_gedi_raster(&config)?);
            } else {
                log_report("gedi_vector", &api::download_gedi_vector(&config)?);
            }
        }
        Command::Landsat8(arg) => log_report("landsat8", &api::download_landsat8(&load(arg)?)?),
        Command::Nasadem(arg) => log_report("nasadem", &api::download_nasadem(&load(arg)?)?),
        Command::Palsar2(arg) => log_report("palsar2", &api::download_palsar2(&load(arg)?)?),
        Command::S1(arg) => log_report("s1", &api::download_s1(&load(arg)?)?),
        Command::S2(arg) => log_report("s2", &api::download_s2(&load(arg)?)?),
    }

    Ok(())
}
