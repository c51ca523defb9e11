use std::path::PathBuf;

use clap::Parser;
use geomag::collector::FieldComponent;

#[derive(Parser, Debug, Clone)]
#[command(name = "geomag", about = "Run geomagnetic field computations on polygon layers", version)]
pub struct Cli {
    /// List discovered Python environments and exit.
    #[arg(long = "list-envs")]
    pub list_envs: bool,

    /// List the layers of the project and exit.
    #[arg(long = "list-layers")]
    pub list_layers: bool,

    /// Project directory holding GeoJSON and NetCDF layers.
    #[arg(long, value_name = "DIR")]
    pub project: Option<PathBuf>,

    /// Polygon layer to compute over (defaults to the first one).
    #[arg(long, value_name = "NAME")]
    pub layer: Option<String>,

    /// Python interpreter for the worker (defaults to the first discovered).
    #[arg(long, value_name = "PATH")]
    pub python: Option<PathBuf>,

    /// Visualisation scale factor.
    #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
    pub vis: f64,

    /// Grid cell size in degrees.
    #[arg(long = "grid-cell-size", default_value_t = 1.0)]
    pub grid_cell_size: f64,

    /// Maximum spherical harmonic degree.
    #[arg(long = "l-max", default_value_t = 100, allow_negative_numbers = true)]
    pub l_max: i64,

    /// Minimum spherical harmonic degree.
    #[arg(long = "l-min", default_value_t = 0, allow_negative_numbers = true)]
    pub l_min: i64,

    /// Altitude in km above the reference radius.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub altitude: f64,

    /// Field component to compute (Br, By, Bz).
    #[arg(long = "field", default_value = "Br", value_name = "COMPONENT")]
    pub field_component: FieldComponent,

    /// Worker time limit in seconds (overrides GEOMAG_TIMEOUT_SECS).
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Run without asking for confirmation.
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Print reports as plain text instead of rendered Markdown.
    #[arg(long = "no-md")]
    pub no_md: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_dialog() {
        let cli = Cli::try_parse_from(["geomag"]).unwrap();
        assert_eq!(cli.vis, 1.0);
        assert_eq!(cli.grid_cell_size, 1.0);
        assert_eq!(cli.l_max, 100);
        assert_eq!(cli.l_min, 0);
        assert_eq!(cli.altitude, 0.0);
        assert_eq!(cli.field_component, FieldComponent::Br);
        assert!(!cli.yes);
    }

    #[test]
    fn accepts_negative_values_and_component_names() {
        let cli = Cli::try_parse_from([
            "geomag", "--vis", "-2.5", "--altitude", "-100", "--field", "bz", "--yes",
        ])
        .unwrap();
        assert_eq!(cli.vis, -2.5);
        assert_eq!(cli.altitude, -100.0);
        assert_eq!(cli.field_component, FieldComponent::Bz);
        assert!(cli.yes);
    }

    #[test]
    fn unknown_component_is_rejected() {
        assert!(Cli::try_parse_from(["geomag", "--field", "Bx"]).is_err());
    }
}
