use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "facecloak")]
#[command(about = "Perturb eye and nose-bridge zones to reduce automated face matching")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Detector model locations shared by every subcommand.
#[derive(clap::Args)]
pub struct ModelArgs {
    /// OpenCV face cascade, e.g. haarcascade_frontalface_default.xml
    #[arg(long, env = "FACECLOAK_FACE_CASCADE")]
    #[cfg_attr(feature = "rustface", arg(required_unless_present = "rustface_model"))]
    #[cfg_attr(not(feature = "rustface"), arg(required = true))]
    pub face_cascade: Option<PathBuf>,

    /// OpenCV eye cascade, e.g. haarcascade_eye.xml
    #[arg(long, env = "FACECLOAK_EYE_CASCADE")]
    pub eye_cascade: PathBuf,

    /// Detect faces with a SeetaFace model instead of the face cascade
    #[cfg(feature = "rustface")]
    #[arg(long)]
    pub rustface_model: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Perturb every detected face and write a JPEG
    Process {
        /// Input image (JPEG or PNG)
        #[arg(short, long)]
        input: PathBuf,

        /// Output JPEG path
        #[arg(short, long)]
        output: PathBuf,

        /// social_safe, genai_safe or max_privacy
        #[arg(short, long, default_value = "genai_safe")]
        profile: String,

        /// Noise seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// JPEG quality, 1 to 100
        #[arg(short, long, default_value_t = facecloak_core::DEFAULT_JPEG_QUALITY)]
        quality: u8,

        #[command(flatten)]
        models: ModelArgs,
    },

    /// Count faces without modifying the image
    Analyze {
        /// Input image (JPEG or PNG)
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        models: ModelArgs,
    },
}

fn main() -> anyhow::Result<()> {
    // RUST_LOG controls verbosity, e.g. RUST_LOG=facecloak_core=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            input,
            output,
            profile,
            seed,
            quality,
            models,
        } => cli::process(&input, &output, &profile, seed, quality, &models),
        Commands::Analyze { input, models } => cli::analyze(&input, &models),
    }
}
