use mimalloc::MiMalloc;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use candela::data::NamesData;
use candela::model::{NgramConfig, NgramModel};
use candela::trainer::{evaluate_model, train_model, TrainOptions};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Train a character-level n-gram MLP on a file of newline-separated names.
#[derive(Parser, Debug)]
#[command(name = "candela", version, about)]
struct Cli {
    /// Path to the names file (one name per line, a-z only)
    data: PathBuf,

    /// Number of training epochs
    #[arg(long, default_value_t = 100)]
    epochs: usize,

    /// Learning rate for the manual SGD update
    #[arg(long, default_value_t = 0.1)]
    lr: f32,

    /// Batch size (0 = full batch)
    #[arg(long, default_value_t = 0)]
    batch_size: usize,

    /// Seed for parameter init and the dataset split
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("candela=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let data = NamesData::load(&cli.data, 3, cli.seed)?;

    let config = NgramConfig {
        lr: cli.lr,
        seed: cli.seed,
        ..NgramConfig::default()
    };
    let mut model = NgramModel::new(config);

    let opts = TrainOptions {
        epochs: cli.epochs,
        batch_size: cli.batch_size,
    };
    train_model(&mut model, &data, &opts);
    evaluate_model(&mut model, &data, &opts);

    Ok(())
}
