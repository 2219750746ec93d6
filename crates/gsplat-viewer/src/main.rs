use anyhow::{Context, Result};
use clap::Parser;
use winit::dpi::LogicalSize;
use winit::event_loop::EventLoop;

use gsplat_engine::cloud::MAX_SH_DEGREE;
use gsplat_engine::device::GpuInit;
use gsplat_engine::logging::{init_logging, LoggingConfig};

mod app;
mod scene;

use app::{ViewerApp, ViewerConfig};

#[derive(Debug, Parser)]
#[command(name = "gsplat-viewer", version, about = "Gaussian splat viewer")]
struct Cli {
    #[arg(long, value_name = "N", default_value_t = 20_000, help = "Number of procedural splats")]
    points: usize,
    #[arg(
        long,
        value_name = "DEGREE",
        default_value_t = 0,
        value_parser = clap::value_parser!(u32).range(0..=i64::from(MAX_SH_DEGREE)),
        help = "Spherical-harmonic degree of the generated cloud"
    )]
    sh_degree: u32,
    #[arg(long, default_value_t = 1.0, help = "Gaussian scale multiplier")]
    scale: f32,
    #[arg(long, value_name = "FILTER", help = "env_logger filter, overrides RUST_LOG")]
    log: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(LoggingConfig {
        env_filter: cli.log.clone(),
        ..LoggingConfig::default()
    });

    let config = ViewerConfig {
        title: "gsplat viewer".to_string(),
        initial_size: LogicalSize::new(1280.0, 720.0),
        points: cli.points,
        sh_degree: cli.sh_degree,
        scale_factor: cli.scale,
    };
    log::info!(
        "starting viewer: {} points, sh degree {}, scale {}",
        config.points,
        config.sh_degree,
        config.scale_factor
    );

    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut app = ViewerApp::new(config, GpuInit::default());
    event_loop
        .run_app(&mut app)
        .context("winit event loop terminated with error")?;

    match app.take_error() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let cli = Cli::try_parse_from(["gsplat-viewer"]).unwrap();
        assert_eq!(cli.points, 20_000);
        assert_eq!(cli.sh_degree, 0);
        assert_eq!(cli.scale, 1.0);
        assert!(cli.log.is_none());
    }

    #[test]
    fn sh_degree_is_bounded() {
        assert!(Cli::try_parse_from(["gsplat-viewer", "--sh-degree", "4"]).is_ok());
        assert!(Cli::try_parse_from(["gsplat-viewer", "--sh-degree", "5"]).is_err());
    }
}
