use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use flow_data::{StageConfig, TrainStage, TrainingSources};
use flow_data_cli::{
    backend_name, create_device,
    inspect::{check, load_stage_config, save_stage_config, summarize},
    SelectedBackend,
};

#[derive(Parser)]
#[command(name = "flow-data")]
#[command(about = "Inspect optical-flow training stages built from Sintel, FlyingChairs, FlyingThings3D, KITTI and HD1K")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum StageArg {
    Chairs,
    Things,
    Sintel,
    Kitti,
}

impl From<StageArg> for TrainStage {
    fn from(stage: StageArg) -> Self {
        match stage {
            StageArg::Chairs => Self::Chairs,
            StageArg::Things => Self::Things,
            StageArg::Sintel => Self::Sintel,
            StageArg::Kitti => Self::Kitti,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SourcesArg {
    /// C+T+K+S+H
    Full,
    /// C+T+K/S
    SintelThings,
}

impl From<SourcesArg> for TrainingSources {
    fn from(sources: SourcesArg) -> Self {
        match sources {
            SourcesArg::Full => Self::Full,
            SourcesArg::SintelThings => Self::SintelThings,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default stage configuration
    InitConfig {
        /// Output JSON path
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, value_enum)]
        stage: StageArg,

        /// Crop size as HEIGHT WIDTH
        #[arg(long, num_args = 2, required = true, value_names = ["HEIGHT", "WIDTH"])]
        image_size: Vec<usize>,

        #[arg(long, value_enum, default_value = "full")]
        sources: SourcesArg,
    },

    /// Build a stage and print its composition
    Summary {
        /// Stage configuration file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Decode samples and one batch of a stage
    Check {
        /// Stage configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Number of samples to decode
        #[arg(short = 'n', long, default_value_t = 4)]
        samples: usize,
    },

    /// Show backend information
    Info,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::InitConfig {
            output,
            stage,
            image_size,
            sources,
        } => {
            let (height, width) = match image_size.as_slice() {
                [height, width] => (*height, *width),
                _ => anyhow::bail!("--image-size takes HEIGHT WIDTH"),
            };
            let config =
                StageConfig::new(stage.into(), (height, width)).with_sources(sources.into());
            save_stage_config(&config, &output)?;
            println!("Wrote {}", output.display());
            Ok(())
        }

        Commands::Summary { config } => {
            let config = load_stage_config(&config)?;
            let summary = summarize(&config)?;
            println!("Stage {:?} ({:?}):", config.stage, config.sources);
            println!("{summary}");
            Ok(())
        }

        Commands::Check { config, samples } => {
            let config = load_stage_config(&config)?;
            let device = create_device();
            println!("Using backend: {}", backend_name());
            check::<SelectedBackend>(&config, samples, &device)
        }

        Commands::Info => {
            println!("flow-data:");
            println!("  Backend: {}", backend_name());
            println!("  Device: {:?}", create_device());
            Ok(())
        }
    }
}
