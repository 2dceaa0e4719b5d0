//! CLI subcommand handlers.

use crate::{Commands, ConfigAction, ModelsAction};
use std::path::{Path, PathBuf};
use weathervane_core::config::{ServerConfig, TrainingConfig, WeathervaneConfig};
use weathervane_core::domain::FailureReason;
use weathervane_core::tracking::RunStatus;
use weathervane_core::RunTracker;
use weathervane_data::{DataValidator, DatasetSplits, SplitConfig};
use weathervane_model::registry::{ModelRegistry, ModelStage};
use weathervane_model::training::TrainingRunner;
use weathervane_server::{shared, ServerState};

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    config_path: &Path,
    config: WeathervaneConfig,
) -> anyhow::Result<()> {
    match command {
        Commands::Validate {
            data_path,
            output_path,
        } => handle_validate(data_path, output_path, &config),
        Commands::Split {
            data_path,
            output_path,
            val_fraction,
            test_fraction,
            seed,
        } => handle_split(
            data_path,
            output_path,
            val_fraction,
            test_fraction,
            seed,
            &config,
        ),
        Commands::Train {
            data_path,
            models_path,
            artifacts_path,
            arch,
            epochs,
            batch_size,
            learning_rate,
            image_size,
            seed,
        } => {
            let mut training = config.training.clone();
            if let Some(arch) = arch {
                training.architecture = arch;
            }
            if let Some(epochs) = epochs {
                training.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                training.batch_size = batch_size;
            }
            if let Some(lr) = learning_rate {
                training.learning_rate = lr;
            }
            if let Some(size) = image_size {
                training.image_size = size;
            }
            if let Some(seed) = seed {
                training.seed = seed;
            }
            handle_train(data_path, models_path, artifacts_path, training, &config)
        }
        Commands::Serve {
            models_path,
            host,
            port,
        } => {
            let mut server = config.server.clone();
            if let Some(host) = host {
                server.host = host;
            }
            if let Some(port) = port {
                server.port = port;
            }
            let models_path =
                models_path.unwrap_or_else(|| PathBuf::from(&config.registry.models_dir));
            handle_serve(models_path, server).await
        }
        Commands::Models { action } => handle_models(action, &config),
        Commands::Config { action } => handle_config(action, config_path, &config),
    }
}

fn handle_validate(
    data_path: PathBuf,
    output_path: Option<PathBuf>,
    config: &WeathervaneConfig,
) -> anyhow::Result<()> {
    let output = output_path.unwrap_or_else(|| PathBuf::from(&config.registry.artifacts_dir));
    let tracker = RunTracker::new(&output);
    let mut run = tracker.start_run("weather_data_validation", "data_validation");
    run.log_param("data_path", data_path.display());
    run.log_param("min_dimension", config.data.min_dimension);
    run.log_param("max_dimension", config.data.max_dimension);

    let validator = DataValidator::new(&data_path, &output, config.data.clone());
    let report = match validator.run() {
        Ok(report) => report,
        Err(e) => {
            run.finish(RunStatus::Failed);
            tracker.record(&run)?;
            return Err(e.into());
        }
    };

    run.log_metric("total_images", report.structure.total_images as f64);
    run.log_metric("valid_images", report.images.valid_images as f64);
    run.log_metric(
        "corrupted_images",
        report.images.count_by(FailureReason::Corrupted) as f64,
    );
    run.log_metric(
        "wrong_size_images",
        report.images.count_by(FailureReason::WrongSize) as f64,
    );
    if let Some(ratio) = report.balance.imbalance_ratio {
        run.log_metric("imbalance_ratio", ratio);
    }
    run.log_artifact(output.join("data_validation_report.json"));
    run.log_artifact(output.join("validation_summary.txt"));
    run.finish(if report.validation_passed {
        RunStatus::Completed
    } else {
        RunStatus::Failed
    });
    tracker.record(&run)?;

    println!("{}", report.summary_text());
    if !report.validation_passed {
        anyhow::bail!("data validation failed");
    }
    Ok(())
}

fn handle_split(
    data_path: PathBuf,
    output_path: Option<PathBuf>,
    val_fraction: Option<f64>,
    test_fraction: Option<f64>,
    seed: Option<u64>,
    config: &WeathervaneConfig,
) -> anyhow::Result<()> {
    let output = output_path.unwrap_or_else(|| PathBuf::from(&config.registry.artifacts_dir));
    let split_config = SplitConfig {
        val_fraction: val_fraction.unwrap_or(config.training.val_split),
        test_fraction: test_fraction.unwrap_or(config.training.test_split),
        seed: seed.unwrap_or(config.training.seed),
    };

    let validator = DataValidator::new(&data_path, &output, config.data.clone());
    let samples = validator.labeled_images();
    if samples.is_empty() {
        anyhow::bail!("no labeled images found under {}", data_path.display());
    }

    let splits = DatasetSplits::stratified(samples, split_config)?;
    let manifest = splits.save(&output)?;

    println!("Split manifest written to {}", manifest.display());
    println!(
        "  train: {}  val: {}  test: {}",
        splits.train.len(),
        splits.val.len(),
        splits.test.len()
    );
    Ok(())
}

fn handle_train(
    data_path: PathBuf,
    models_path: Option<PathBuf>,
    artifacts_path: Option<PathBuf>,
    training: TrainingConfig,
    config: &WeathervaneConfig,
) -> anyhow::Result<()> {
    let models = models_path.unwrap_or_else(|| PathBuf::from(&config.registry.models_dir));
    let artifacts = artifacts_path.unwrap_or_else(|| PathBuf::from(&config.registry.artifacts_dir));

    let validator = DataValidator::new(&data_path, &artifacts, config.data.clone());
    let samples = validator.labeled_images();
    if samples.is_empty() {
        anyhow::bail!("no labeled images found under {}", data_path.display());
    }

    let splits = DatasetSplits::stratified(
        samples,
        SplitConfig {
            val_fraction: training.val_split,
            test_fraction: training.test_split,
            seed: training.seed,
        },
    )?;

    let tracker = RunTracker::new(&artifacts);
    let mut run = tracker.start_run("weather_classifier_training", "training");
    run.log_param("architecture", &training.architecture);
    run.log_param("epochs", training.epochs);
    run.log_param("batch_size", training.batch_size);
    run.log_param("learning_rate", training.learning_rate);
    run.log_param("image_size", training.image_size);
    run.log_param("seed", training.seed);

    let runner = TrainingRunner::new(models, artifacts, training);
    let artifact = match runner.run(&splits) {
        Ok(artifact) => artifact,
        Err(e) => {
            run.finish(RunStatus::Failed);
            tracker.record(&run)?;
            return Err(e.into());
        }
    };

    if let Some(loss) = artifact.metrics.loss_history.last() {
        run.log_metric("final_loss", *loss);
    }
    if let Some(best) = artifact.metrics.best_val_accuracy {
        run.log_metric("best_val_accuracy", best);
    }
    run.log_metric("test_accuracy", artifact.evaluation.accuracy);
    run.log_metric("test_macro_f1", artifact.evaluation.macro_f1);
    run.log_metric(
        "training_time_secs",
        artifact.metrics.total_training_time_secs,
    );
    run.log_artifact(&artifact.checkpoint_path);
    run.log_artifact(&artifact.metadata_path);
    run.finish(RunStatus::Completed);
    tracker.record(&run)?;

    println!("Trained {}", artifact.model_name);
    println!("  checkpoint:    {}", artifact.checkpoint_path.display());
    println!("  test accuracy: {:.4}", artifact.evaluation.accuracy);
    println!("  macro F1:      {:.4}", artifact.evaluation.macro_f1);
    Ok(())
}

async fn handle_serve(models_path: PathBuf, server: ServerConfig) -> anyhow::Result<()> {
    tracing::info!(models_path = %models_path.display(), "starting prediction server");
    let state = ServerState::new(models_path, server)?;
    weathervane_server::run(shared(state)).await?;
    Ok(())
}

fn handle_models(action: ModelsAction, config: &WeathervaneConfig) -> anyhow::Result<()> {
    match action {
        ModelsAction::List { models_path } => {
            let models =
                models_path.unwrap_or_else(|| PathBuf::from(&config.registry.models_dir));
            let registry = ModelRegistry::load(&models)?;
            if registry.is_empty() {
                println!("No models registered.");
                return Ok(());
            }
            for model in registry.list() {
                let accuracy = model
                    .accuracy
                    .map(|a| format!("{a:.4}"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  v{}  {}  accuracy: {}  created: {}",
                    model.name, model.version, model.stage, accuracy, model.created_at
                );
            }
            Ok(())
        }
        ModelsAction::Promote { name, models_path } => {
            let models =
                models_path.unwrap_or_else(|| PathBuf::from(&config.registry.models_dir));
            let mut registry = ModelRegistry::load(&models)?;
            let promoted = registry.promote(&name)?;
            println!(
                "Promoted {} v{} to {}",
                promoted.name,
                promoted.version,
                ModelStage::Production
            );
            registry.save(&models)?;
            Ok(())
        }
        ModelsAction::Runs { artifacts_path } => {
            let artifacts =
                artifacts_path.unwrap_or_else(|| PathBuf::from(&config.registry.artifacts_dir));
            let runs = RunTracker::new(&artifacts).list()?;
            if runs.is_empty() {
                println!("No runs recorded.");
                return Ok(());
            }
            for run in runs {
                println!(
                    "{}  [{}]  {}  {:?}",
                    run.started_at, run.step, run.name, run.status
                );
                for (key, value) in &run.metrics {
                    println!("    {key}: {value}");
                }
            }
            Ok(())
        }
    }
}

fn handle_config(
    action: ConfigAction,
    config_path: &Path,
    config: &WeathervaneConfig,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            let toml_str = toml::to_string_pretty(&WeathervaneConfig::default())?;
            std::fs::write(config_path, &toml_str)?;
            println!("Created default configuration at: {}", config_path.display());
            Ok(())
        }
        ConfigAction::Show => {
            println!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
    }
}
