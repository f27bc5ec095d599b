use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use passport_studio::config::{default_output_dir, load_config};
use passport_studio::image_io::{extract_crop, load_source};
use passport_studio::models::{Background, Clothing, CurveSettings, Offset};
use passport_studio::pipeline::{GenerateRequest, SheetGenerator};
use passport_studio::recipe_io::{load_curves_file, load_curves_for_image};
use passport_studio::sheet::export_sheet;
use passport_studio::viewport::CropSession;
use passport_studio::UnavailableCompositor;

#[derive(Parser)]
#[command(name = "passport-studio")]
#[command(version, about = "Crop, grade and lay out a print-ready passport photo sheet", long_about = None)]
struct Cli {
    /// Source photograph (JPEG or PNG)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Curve settings JSON; defaults to the image's .curves.json sidecar
    #[arg(long, value_name = "FILE")]
    curves: Option<PathBuf>,

    /// Zoom override (0.1 - 4.0); auto-framed when omitted
    #[arg(long, value_name = "Z")]
    zoom: Option<f64>,

    /// Rotation in degrees; anything unparsable counts as 0
    #[arg(long, value_name = "TEXT", allow_hyphen_values = true)]
    rotation: Option<String>,

    /// Horizontal pan in viewport pixels
    #[arg(long, value_name = "PX", allow_hyphen_values = true)]
    pan_x: Option<f64>,

    /// Vertical pan in viewport pixels
    #[arg(long, value_name = "PX", allow_hyphen_values = true)]
    pan_y: Option<f64>,

    /// Background replacement (white, blue, unchanged)
    #[arg(long, value_name = "COLOR", default_value = "unchanged")]
    background: Background,

    /// Clothing replacement (none, blazer-black, blazer-navy, shirt-white, shirt-light-blue)
    #[arg(long, value_name = "STYLE", default_value = "none")]
    clothing: Clothing,

    /// Output directory; defaults to the downloads folder
    #[arg(short, long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Config file; defaults to the per-user config
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli.config.as_deref())?;
    let source = load_source(&cli.input)?;
    let (width, height) = source.dimensions();

    let mut crop = CropSession::new(width, height, &config.viewport);
    if let Some(zoom) = cli.zoom {
        crop.set_zoom(zoom);
    }
    if let Some(text) = &cli.rotation {
        crop.set_rotation_text(text);
    }
    if cli.pan_x.is_some() || cli.pan_y.is_some() {
        let pan = crop.state().pan_offset;
        crop.set_pan(Offset::new(cli.pan_x.unwrap_or(pan.x), cli.pan_y.unwrap_or(pan.y)));
    }
    let region = crop.commit();
    let photo = extract_crop(&source.image, &region).await?;

    let curves = match &cli.curves {
        Some(path) => load_curves_file(path)?,
        None => load_curves_for_image(&cli.input)?.unwrap_or_default(),
    };
    if curves != CurveSettings::default() {
        info!("applying saved curves");
    }

    let generator = SheetGenerator::new(UnavailableCompositor, config.sheet, config.retry);
    let outcome = generator
        .generate(GenerateRequest {
            photo: Arc::new(photo),
            curves,
            background: cli.background,
            clothing: cli.clothing,
        })
        .await?;
    if let Some(warning) = &outcome.warning {
        warn!("{warning}");
        eprintln!("Warning: {warning}");
    }

    let out_dir = match cli.out {
        Some(dir) => dir,
        None => default_output_dir()?,
    };
    let path = export_sheet(&outcome.sheet, &out_dir)?;
    println!("{}", path.display());
    Ok(())
}
