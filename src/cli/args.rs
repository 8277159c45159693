use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "geefetch",
    version,
    about = "Download satellite imagery from Google Earth Engine as tiled GeoTIFFs"
)]
pub struct CliArgs {
    /// Log debug messages of geefetch
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Only log errors
    #[arg(long, global = true, overrides_with = "no_quiet", default_value_t = false)]
    pub quiet: bool,

    /// Log at the normal level (default)
    #[arg(long = "no-quiet", global = true, overrides_with = "quiet", default_value_t = false)]
    pub no_quiet: bool,

    /// Also append logs to this file
    #[arg(long, global = true)]
    pub logfile: Option<PathBuf>,

    /// Log debug messages of every component, HTTP client included
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArg {
    /// Path to the YAML config file, or to a directory of YAML files
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download every configured source (s1, s2, gedi, dynworld, palsar2, landsat8)
    All(ConfigArg),
    /// Download a custom source declared under `customs`
    Custom {
        /// Key of the source under `customs`
        name: String,
        #[command(flatten)]
        config: ConfigArg,
    },
    /// Download Dynamic World land cover probabilities
    Dynworld(ConfigArg),
    /// Download GEDI canopy heights
    Gedi {
        #[command(flatten)]
        config: ConfigArg,
        /// Footprints as points (default)
        #[arg(long, conflicts_with = "raster", default_value_t = false)]
        vector: bool,
        /// Monthly rasterized product
        #[arg(long, default_value_t = false)]
        raster: bool,
    },
    /// Download Landsat-8 surface reflectance
    Landsat8(ConfigArg),
    /// Download the NASADEM elevation model
    Nasadem(ConfigArg),
    /// Download PALSAR-2 ScanSAR backscatter
    Palsar2(ConfigArg),
    /// Download Sentinel-1 backscatter
    S1(ConfigArg),
    /// Download Sentinel-2 surface reflectance
    S2(ConfigArg),
}

impl CliArgs {
    /// `(geefetch level, level of other crates)` for the flags given.
    pub fn log_levels(&self) -> (&'static str, &'static str) {
        if self.debug {
            ("debug", "debug")
        } else if self.verbose {
            ("debug", "warn")
        } else if self.quiet {
            ("error", "error")
        } else {
            ("info", "warn")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subcommand_with_default_config() {
        let args = CliArgs::parse_from(["geefetch", "s2"]);
        match &args.command {
            Command::S2(c) => assert_eq!(c.config, PathBuf::from("config.yaml")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(args.log_levels(), ("info", "warn"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::parse_from([
            "geefetch", "gedi", "-c", "france.yaml", "--raster", "-v", "--logfile", "run.log",
        ]);
        assert!(args.verbose);
        assert_eq!(args.logfile, Some(PathBuf::from("run.log")));
        match args.command {
            Command::Gedi { config, raster, vector } => {
                assert!(raster && !vector);
                assert_eq!(config.config, PathBuf::from("france.yaml"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_quiet_and_no_quiet_override() {
        let args = CliArgs::parse_from(["geefetch", "--quiet", "--no-quiet", "s1"]);
        assert!(!args.quiet);
        assert_eq!(args.log_levels().0, "info");
        let args = CliArgs::parse_from(["geefetch", "--quiet", "s1"]);
        assert_eq!(args.log_levels(), ("error", "error"));
    }

    #[test]
    fn test_custom_takes_a_name() {
        let args = CliArgs::parse_from(["geefetch", "custom", "agb"]);
        assert!(matches!(args.command, Command::Custom { ref name, .. } if name == "agb"));
        assert!(CliArgs::try_parse_from(["geefetch", "gedi", "--vector", "--raster"]).is_err());
    }
}
