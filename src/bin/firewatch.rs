//! firewatch - smoke and fire detection from the terminal
//!
//! Subcommands:
//! - `detect`: run a detection session on a camera, video or image
//! - `models`: list model artifacts and available engines
//! - `train`: train a detector with the external library, then evaluate it

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use firewatch::detect::{BackendRegistry, ModelCatalog};
use firewatch::train::{run_training, TrainParams, UltralyticsCli};
use firewatch::worker::ExitReason;
use firewatch::{AppConfig, Presenter, SourceDescriptor};

#[path = "../ui.rs"]
mod ui;

const PUMP_INTERVAL: Duration = Duration::from_millis(30);

#[derive(Parser, Debug)]
#[command(name = "firewatch", about = "Smoke and fire detection workstation")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE", global = true)]
    ui: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run detection until the source ends or Ctrl-C
    Detect {
        /// camera[:N], /dev/videoN, a video file or an image file
        #[arg(long)]
        source: Option<String>,
        /// Model path or stub:// identifier
        #[arg(long)]
        model: Option<String>,
        /// Confidence threshold (0.01-1.00)
        #[arg(long)]
        conf: Option<f32>,
        /// Save annotated frames to the results directory
        #[arg(long)]
        save: bool,
        /// Hide per-class counts
        #[arg(long)]
        no_stats: bool,
    },

    /// List model artifacts in the weights directory
    Models,

    /// Train a detector and evaluate the best checkpoint
    Train {
        /// TOML file with training hyperparameters
        #[arg(long, value_name = "PATH")]
        params: Option<PathBuf>,
        /// Dataset descriptor (overrides the params file)
        #[arg(long, value_name = "PATH")]
        data: Option<PathBuf>,
        /// Training front end executable
        #[arg(long, default_value = "yolo")]
        program: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    match args.command {
        Command::Detect {
            source,
            model,
            conf,
            save,
            no_stats,
        } => {
            let mut cfg = AppConfig::load()?;
            if let Some(source) = source {
                cfg.session.source = source.parse::<SourceDescriptor>()?;
            }
            match model {
                Some(model) => cfg.session.model = model,
                None => {
                    let catalog = ModelCatalog::new(&cfg.weights_dir);
                    if let Some(fallback) = catalog.fallback_for(&cfg.session.model)? {
                        log::warn!(
                            "model {} not found, using {}",
                            cfg.session.model,
                            fallback.display()
                        );
                        cfg.session.model = fallback.display().to_string();
                    }
                }
            }
            if save {
                cfg.session.save_results = true;
            }
            detect(&ui, cfg, conf, !no_stats)
        }
        Command::Models => list_models(&ui),
        Command::Train {
            params,
            data,
            program,
        } => train(&ui, params, data, program),
    }
}

fn detect(ui: &ui::Ui, cfg: AppConfig, conf: Option<f32>, show_stats: bool) -> Result<()> {
    let registry = Arc::new(BackendRegistry::with_builtin());
    log::info!("engines: {}", registry.list().join(", "));

    let mut presenter = Presenter::new(&cfg, registry);
    if let Some(conf) = conf {
        presenter.set_confidence(conf);
    }
    if presenter.stats_visible() != show_stats {
        presenter.toggle_stats();
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    presenter.start()?;
    let mut bar = ui.status_bar();
    let reason = loop {
        if interrupted.load(Ordering::SeqCst) {
            log::info!("shutdown signal received, stopping detection...");
            presenter.shutdown();
            break ExitReason::Stopped;
        }
        let outcome = presenter.pump();
        bar.update(
            presenter.status(),
            presenter.fps(),
            presenter.resolution(),
            presenter.stats_visible().then(|| presenter.stats()),
        );
        if let Some(reason) = outcome.finished {
            break reason;
        }
        std::thread::sleep(PUMP_INTERVAL);
    };
    bar.finish(presenter.status());

    if presenter.stats_visible() {
        print!("{}", ui::stats_table(presenter.stats()));
    }
    println!(
        "firewatch: {} frame(s) shown, {} saved",
        presenter.last_sequence(),
        presenter.saved_results()
    );
    if presenter.saved_results() > 0 {
        println!("results in {}", presenter.results_dir().display());
    }

    match reason {
        ExitReason::Failed(kind) => Err(anyhow!(
            "detection failed ({}): {}",
            kind,
            presenter.status().text
        )),
        ExitReason::Stopped | ExitReason::Completed => Ok(()),
    }
}

fn list_models(ui: &ui::Ui) -> Result<()> {
    let cfg = AppConfig::load()?;
    let catalog = ModelCatalog::new(&cfg.weights_dir);
    let models = {
        let _stage = ui.stage("Scan weights directory");
        catalog.scan()?
    };
    if models.is_empty() {
        println!("no models in {}", catalog.root().display());
    }
    for model in &models {
        println!("{}", model.display());
    }
    println!(
        "engines: {}",
        BackendRegistry::with_builtin().list().join(", ")
    );
    Ok(())
}

fn train(
    ui: &ui::Ui,
    params: Option<PathBuf>,
    data: Option<PathBuf>,
    program: PathBuf,
) -> Result<()> {
    let mut params = match params {
        Some(path) => TrainParams::load(&path)?,
        None => TrainParams::default(),
    };
    if let Some(data) = data {
        params.data = data;
    }
    let weights_dir = AppConfig::load()?.weights_dir;
    let report = {
        let _stage = ui.stage("Train detector");
        run_training(&UltralyticsCli::new(program), &params, &weights_dir)?
    };
    match &report.best_weights {
        Some(best) => println!("best weights: {}", best.display()),
        None => println!("training finished without a best checkpoint"),
    }
    for split in &report.evaluated {
        println!("evaluated on {} split", split);
    }
    if let Some(exported) = &report.exported {
        println!("exported model: {}", exported.display());
    }
    Ok(())
}
