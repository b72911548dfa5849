//! Retinal OCT Classification CLI
//!
//! Entry point for fine-tuning a pretrained VGG-16 on retinal OCT scans,
//! evaluating the result on the held-out test split, and rendering
//! qualitative prediction grids.

use std::path::{Path, PathBuf};

use anyhow::Result;
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::module::AutodiffModule;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use oct_classifier::backend::{self, default_device, DefaultBackend, TrainingBackend};
use oct_classifier::model::adapter::{adapt_for_classes, load_backbone, resume_from_checkpoint};
use oct_classifier::training::{evaluate, finetune};
use oct_classifier::utils::logging::{init_logging, LogConfig};
use oct_classifier::utils::visualize::{render_prediction_grid, PredictionTile};
use oct_classifier::{
    FineTuneConfig, OctBatcher, OctBurnDataset, OctDataset, Split, Transform, Vgg16Config,
};

/// Retinal OCT Scan Classification
///
/// Fine-tunes a pretrained VGG-16 backbone on retinal OCT scans
/// (CNV / DME / DRUSEN / NORMAL) using the Burn framework.
#[derive(Parser, Debug)]
#[command(name = "oct_classifier")]
#[command(version)]
#[command(about = "Retinal OCT classification by VGG-16 fine-tuning", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fine-tune the classification head on the train/val splits
    Train {
        /// Path to the dataset directory (train/val/test layout)
        #[arg(short, long, default_value = "data/oct2017")]
        data_dir: String,

        /// Path to the pretrained VGG-16 parameter file
        #[arg(short, long, default_value = "weights/vgg16_imagenet")]
        weights: String,

        /// Resume from a previously fine-tuned checkpoint instead of
        /// initializing a fresh head
        #[arg(long)]
        resume: Option<String>,

        /// Number of training epochs
        #[arg(short, long, default_value = "5")]
        epochs: usize,

        /// Batch size
        #[arg(short, long, default_value = "8")]
        batch_size: usize,

        /// Learning rate
        #[arg(short, long, default_value = "0.0001")]
        learning_rate: f64,

        /// Class count of the pretrained checkpoint
        #[arg(long, default_value = "1000")]
        pretrained_classes: usize,

        /// Output directory for checkpoints
        #[arg(short, long, default_value = "output/models")]
        output_dir: String,

        /// Random seed for reproducibility
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Evaluate a fine-tuned checkpoint on the test split
    Evaluate {
        /// Path to the dataset directory
        #[arg(short, long, default_value = "data/oct2017")]
        data_dir: String,

        /// Path to the fine-tuned checkpoint
        #[arg(short, long)]
        model: String,

        /// Batch size
        #[arg(short, long, default_value = "8")]
        batch_size: usize,
    },

    /// Render a grid of test predictions for qualitative inspection
    Visualize {
        /// Path to the dataset directory
        #[arg(short, long, default_value = "data/oct2017")]
        data_dir: String,

        /// Path to the fine-tuned checkpoint
        #[arg(short, long)]
        model: String,

        /// Number of test images to render
        #[arg(short, long, default_value = "8")]
        count: usize,

        /// Output SVG path
        #[arg(short, long, default_value = "output/predictions.svg")]
        output: String,
    },

    /// Show dataset statistics
    Stats {
        /// Path to the dataset directory
        #[arg(short, long, default_value = "data/oct2017")]
        data_dir: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    print_banner();
    backend::log_backend();

    match cli.command {
        Commands::Train {
            data_dir,
            weights,
            resume,
            epochs,
            batch_size,
            learning_rate,
            pretrained_classes,
            output_dir,
            seed,
        } => cmd_train(
            &data_dir,
            &weights,
            resume.as_deref(),
            FineTuneConfig {
                epochs,
                batch_size,
                learning_rate,
                seed,
            },
            pretrained_classes,
            &output_dir,
        ),

        Commands::Evaluate {
            data_dir,
            model,
            batch_size,
        } => cmd_evaluate(&data_dir, &model, batch_size),

        Commands::Visualize {
            data_dir,
            model,
            count,
            output,
        } => cmd_visualize(&data_dir, &model, count, &output),

        Commands::Stats { data_dir } => cmd_stats(&data_dir),
    }
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════╗
 ║   Retinal OCT Classification                     ║
 ║   VGG-16 fine-tuning with Burn + Rust            ║
 ╚══════════════════════════════════════════════════╝
"#
        .green()
    );
}

fn cmd_train(
    data_dir: &str,
    weights: &str,
    resume: Option<&str>,
    config: FineTuneConfig,
    pretrained_classes: usize,
    output_dir: &str,
) -> Result<()> {
    let device = default_device();

    println!("{}", "Loading Dataset...".cyan());
    let dataset = OctDataset::new(data_dir)?;
    dataset.stats(Split::Train).print();

    let num_classes = dataset.num_classes();

    println!();
    println!("{}", "Preparing Model...".cyan());
    let model = match resume {
        Some(checkpoint) => {
            println!("  Resuming from: {}", checkpoint);
            let model_config = Vgg16Config::new().with_num_classes(num_classes);
            resume_from_checkpoint::<TrainingBackend>(
                &model_config,
                Path::new(checkpoint),
                &device,
            )?
        }
        None => {
            let backbone_config = Vgg16Config::new().with_num_classes(pretrained_classes);
            let backbone =
                load_backbone::<TrainingBackend>(&backbone_config, Path::new(weights), &device)?;
            adapt_for_classes(backbone, num_classes, &device)
        }
    };

    let train_dataset =
        OctBurnDataset::from_samples(dataset.samples(Split::Train), Transform::train());

    println!("{}", "Pre-loading Validation Data...".cyan());
    let val_dataset =
        OctBurnDataset::from_samples_cached(dataset.samples(Split::Val), Transform::eval())?;

    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Training samples:   {}", train_dataset.len());
    println!("  Validation samples: {}", val_dataset.len());
    println!("  Classes:            {}", num_classes);
    println!("  Epochs:             {}", config.epochs);
    println!("  Batch size:         {}", config.batch_size);
    println!("  Learning rate:      {}", config.learning_rate);
    println!("  Backend:            {}", backend::backend_name());
    println!();

    println!("{}", "Starting Fine-Tuning...".green().bold());
    println!();

    let result = finetune::run_finetune(model, &train_dataset, &val_dataset, &config, &device)?;

    println!("{}", "Saving Model...".cyan());
    let checkpoint_path =
        finetune::save_checkpoint(&result, &config, Path::new(output_dir))?;
    println!("  💾 Saved to: {:?}", checkpoint_path);
    println!();

    // Final held-out evaluation with the restored best snapshot
    println!("{}", "Evaluating on Test Split...".cyan());
    let test_dataset =
        OctBurnDataset::from_samples(dataset.samples(Split::Test), Transform::eval());
    let test_metrics =
        evaluate::evaluate(&result.model.clone().valid(), &test_dataset, config.batch_size, &device)?;

    println!();
    println!("{}", "Fine-Tuning Complete!".green().bold());
    println!(
        "  Best validation accuracy: {:.2}% (epoch {})",
        100.0 * result.best_val_accuracy,
        result.best_epoch + 1
    );
    println!(
        "  Test loss: {:.4} | Test accuracy: {:.2}%",
        test_metrics.loss,
        100.0 * test_metrics.accuracy
    );
    println!();
    println!("{}", "Next steps:".cyan().bold());
    println!(
        "  • Evaluate:  oct_classifier evaluate --model {:?}",
        checkpoint_path
    );
    println!(
        "  • Visualize: oct_classifier visualize --model {:?}",
        checkpoint_path
    );

    Ok(())
}

fn cmd_evaluate(data_dir: &str, model: &str, batch_size: usize) -> Result<()> {
    let device = default_device();

    info!("Evaluating checkpoint {}", model);

    let dataset = OctDataset::new(data_dir)?;
    let model_config = Vgg16Config::new().with_num_classes(dataset.num_classes());
    let model =
        resume_from_checkpoint::<DefaultBackend>(&model_config, Path::new(model), &device)?;

    let test_dataset =
        OctBurnDataset::from_samples(dataset.samples(Split::Test), Transform::eval());

    println!("{}", "Evaluating on Test Split...".cyan());
    let metrics = evaluate::evaluate(&model, &test_dataset, batch_size, &device)?;

    println!();
    println!("{}", "Test Results:".green().bold());
    println!("  Samples:  {}", metrics.samples);
    println!("  Loss:     {:.4}", metrics.loss);
    println!("  Accuracy: {:.2}%", 100.0 * metrics.accuracy);

    Ok(())
}

fn cmd_visualize(data_dir: &str, model: &str, count: usize, output: &str) -> Result<()> {
    let device = default_device();

    let dataset = OctDataset::new(data_dir)?;
    let class_names = dataset.class_names().to_vec();
    let model_config = Vgg16Config::new().with_num_classes(dataset.num_classes());
    let model =
        resume_from_checkpoint::<DefaultBackend>(&model_config, Path::new(model), &device)?;

    let samples = dataset.samples(Split::Test);
    let count = count.min(samples.len()).max(1);
    let test_dataset = OctBurnDataset::from_samples(&samples[..count], Transform::eval());

    println!(
        "{}",
        format!("Predicting {} test images...", count).cyan()
    );

    let batcher = OctBatcher::<DefaultBackend>::new(
        device.clone(),
        test_dataset.transform().crop_size(),
    );
    let items: Vec<_> = (0..count).filter_map(|i| test_dataset.get(i)).collect();
    let batch = batcher.batch(items, &device);

    let probs = model.forward_softmax(batch.images);
    let predicted: Vec<i64> = probs
        .argmax(1)
        .flatten::<1>(0, 1)
        .into_data()
        .to_vec()
        .map_err(|e| anyhow::anyhow!("failed to read predictions: {:?}", e))?;

    let tiles: Vec<PredictionTile> = samples[..count]
        .iter()
        .zip(predicted.iter())
        .map(|(sample, &pred)| PredictionTile {
            image_path: sample.path.clone(),
            truth: sample.class_name.clone(),
            predicted: class_names
                .get(pred as usize)
                .cloned()
                .unwrap_or_else(|| "?".to_string()),
        })
        .collect();

    let correct = tiles.iter().filter(|t| t.is_correct()).count();
    render_prediction_grid(&tiles, Path::new(output))?;

    println!();
    println!("{}", "Prediction Grid Written".green().bold());
    println!("  Output:  {}", output);
    println!("  Correct: {}/{}", correct, tiles.len());

    Ok(())
}

fn cmd_stats(data_dir: &str) -> Result<()> {
    if !PathBuf::from(data_dir).exists() {
        println!(
            "{} Dataset directory not found: {}",
            "Error:".red(),
            data_dir
        );
        println!();
        println!("Expected structure:");
        println!("  {}/", data_dir);
        println!("  ├── train/{{CNV,DME,DRUSEN,NORMAL}}/*.jpeg");
        println!("  ├── val/{{CNV,DME,DRUSEN,NORMAL}}/*.jpeg");
        println!("  └── test/{{CNV,DME,DRUSEN,NORMAL}}/*.jpeg");
        return Ok(());
    }

    let dataset = OctDataset::new(data_dir)?;
    for split in Split::ALL {
        dataset.stats(split).print();
    }

    Ok(())
}
