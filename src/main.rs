use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use dicom_imager::{
    enums::{AveragePolicy, SortBy},
    volume::ImagerOptions,
    volume_loader::{VolumeLoader, VolumeLoaderError},
};
use thiserror::Error;

type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
enum CliError {
    #[error("{0}")]
    Loader(#[from] VolumeLoaderError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("No volume could be built from {0}")]
    NotLoaded(PathBuf),

    #[error("Rendered buffer does not match its dimensions")]
    Render,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortOrder {
    ImagePosition,
    TablePosition,
    InstanceNumber,
    None,
}

impl From<SortOrder> for SortBy {
    fn from(order: SortOrder) -> Self {
        match order {
            SortOrder::ImagePosition => SortBy::ImagePositionPatient,
            SortOrder::TablePosition => SortBy::TablePosition,
            SortOrder::InstanceNumber => SortBy::InstanceNumber,
            SortOrder::None => SortBy::None,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Operation {
    /// Sum all planes with calibration applied
    Sum,
    /// Average all planes
    Average,
    /// Multiply all intensities by --factor
    Scale,
}

/// Render a plane of a DICOM series, optionally after collapsing or scaling it.
#[derive(Parser)]
#[command(name = "dicom-imager")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory containing the .dcm files of one series
    input: PathBuf,

    #[arg(long, value_enum, default_value = "instance-number")]
    sort_by: SortOrder,

    #[arg(long, value_enum)]
    operation: Option<Operation>,

    /// Factor for --operation scale
    #[arg(long, default_value_t = 1.0)]
    factor: f64,

    /// Average calibrated values instead of stored values
    #[arg(long)]
    calibrated_average: bool,

    /// Plane to render, defaults to the middle of the stack
    #[arg(long, allow_negative_numbers = true)]
    index: Option<i64>,

    #[arg(long, allow_negative_numbers = true)]
    window_width: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    window_center: Option<f64>,

    #[arg(long)]
    invert: bool,

    /// Output PNG
    #[arg(short, long, default_value = "result.png")]
    output: PathBuf,

    /// Write the (modified) series as DICOM files into this directory
    #[arg(long)]
    save_dicom: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(err) = run(Cli::parse()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let options = ImagerOptions {
        average: if cli.calibrated_average {
            AveragePolicy::Calibrated
        } else {
            AveragePolicy::Raw
        },
        ..Default::default()
    };

    let mut series = VolumeLoader::load_from_directory(&cli.input, cli.sort_by.into(), options)?;
    if !series.model.is_loaded() {
        return Err(CliError::NotLoaded(cli.input));
    }

    let model = &mut series.model;
    match cli.operation {
        Some(Operation::Sum) => model.sum_images(),
        Some(Operation::Average) => model.avg_images(),
        Some(Operation::Scale) => model.scale_images(cli.factor),
        None => {}
    }

    if let Some(index) = cli.index {
        model.set_index(index);
    }
    if let Some(width) = cli.window_width {
        model.set_window_width(width);
    }
    if let Some(center) = cli.window_center {
        model.set_window_center(center);
    }
    model.set_invert(cli.invert);

    log::info!(
        "Rendering plane {} of {} (width {}, center {})",
        model.index(),
        model.depth(),
        model.window_width(),
        model.window_center()
    );
    let image = model
        .get_current_image()
        .ok_or_else(|| CliError::NotLoaded(cli.input.clone()))?;
    image.to_rgba_image().ok_or(CliError::Render)?.save(&cli.output)?;

    if let Some(directory) = cli.save_dicom {
        series.sync();
        series.save_to_directory(directory)?;
    }
    Ok(())
}
