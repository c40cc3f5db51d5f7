//! Training driver for the external detection library.
//!
//! Hyperparameters live in `TrainParams` (TOML-loadable, defaults tuned for the
//! smoke/fire dataset). A `Trainer` runs the actual training; the built-in one
//! shells out to the library's `yolo` command line. After training, the best
//! weights are validated on the `val` split and then on `test`, exported to
//! ONNX and copied into the weights directory the detector reads from.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

const EXPORT_EXTENSION: &str = "onnx";

/// Training hyperparameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainParams {
    /// Dataset descriptor (YAML with train/val/test paths and class names).
    pub data: PathBuf,
    /// Base model, e.g. `yolov8s.pt`.
    pub model: String,
    /// Start from pretrained weights. Otherwise the architecture YAML is used.
    pub pretrained: bool,
    pub resume: bool,
    pub epochs: u32,
    pub batch: u32,
    pub imgsz: u32,
    pub optimizer: String,
    pub lr0: f64,
    pub lrf: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    pub warmup_epochs: f64,
    pub mosaic: f64,
    pub mixup: f64,
    pub copy_paste: f64,
    pub project: PathBuf,
    pub name: String,
    /// Device selector passed through verbatim; empty lets the library choose.
    pub device: String,
    /// Early-stopping patience in epochs.
    pub patience: u32,
    pub amp: bool,
    pub cos_lr: bool,
    pub verbose: bool,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            data: PathBuf::from("data.yaml"),
            model: "yolov8s.pt".to_string(),
            pretrained: true,
            resume: false,
            epochs: 100,
            batch: 32,
            imgsz: 640,
            optimizer: "SGD".to_string(),
            lr0: 0.01,
            lrf: 0.001,
            momentum: 0.937,
            weight_decay: 0.0005,
            warmup_epochs: 3.0,
            mosaic: 1.0,
            mixup: 0.1,
            copy_paste: 0.1,
            project: PathBuf::from("runs/train"),
            name: "improved_exp".to_string(),
            device: String::new(),
            patience: 50,
            amp: true,
            cos_lr: true,
            verbose: true,
        }
    }
}

impl TrainParams {
    /// Read parameters from a TOML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read training params {}: {}", path.display(), e))?;
        let params: Self = toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid training params {}: {}", path.display(), e))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 || self.batch == 0 {
            return Err(anyhow!("epochs and batch must be greater than zero"));
        }
        if self.imgsz == 0 || self.imgsz % 32 != 0 {
            return Err(anyhow!("imgsz must be a positive multiple of 32"));
        }
        if self.name.trim().is_empty() {
            return Err(anyhow!("run name must not be empty"));
        }
        Ok(())
    }

    /// Model argument: the weights file, or its architecture YAML when not pretrained.
    pub fn model_arg(&self) -> String {
        if self.pretrained {
            self.model.clone()
        } else {
            match self.model.strip_suffix(".pt") {
                Some(stem) => format!("{}.yaml", stem),
                None => self.model.clone(),
            }
        }
    }

    /// `key=value` arguments for a training run.
    pub fn train_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("model={}", self.model_arg()),
            format!("data={}", self.data.display()),
            format!("epochs={}", self.epochs),
            format!("batch={}", self.batch),
            format!("imgsz={}", self.imgsz),
            format!("optimizer={}", self.optimizer),
            format!("lr0={}", self.lr0),
            format!("lrf={}", self.lrf),
            format!("momentum={}", self.momentum),
            format!("weight_decay={}", self.weight_decay),
            format!("warmup_epochs={}", self.warmup_epochs),
            format!("mosaic={}", self.mosaic),
            format!("mixup={}", self.mixup),
            format!("copy_paste={}", self.copy_paste),
            format!("project={}", self.project.display()),
            format!("name={}", self.name),
            format!("resume={}", self.resume),
            format!("patience={}", self.patience),
            format!("verbose={}", self.verbose),
            format!("amp={}", self.amp),
            format!("cos_lr={}", self.cos_lr),
        ];
        if !self.device.trim().is_empty() {
            args.push(format!("device={}", self.device));
        }
        args
    }

    /// Where the library writes the best checkpoint.
    pub fn best_weights(&self) -> PathBuf {
        self.project.join(&self.name).join("weights").join("best.pt")
    }
}

/// Dataset split used for evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Split {
    Val,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Val => f.write_str("val"),
            Split::Test => f.write_str("test"),
        }
    }
}

/// Something that can train and evaluate a detector.
pub trait Trainer {
    fn train(&self, params: &TrainParams) -> Result<()>;

    fn validate(&self, weights: &Path, data: &Path, split: Split) -> Result<()>;

    /// Convert `weights` to ONNX and return the exported file.
    fn export(&self, weights: &Path, imgsz: u32) -> Result<PathBuf>;
}

/// Runs the external library through its `yolo` command line.
#[derive(Clone, Debug)]
pub struct UltralyticsCli {
    program: PathBuf,
}

impl UltralyticsCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn train_command(&self, params: &TrainParams) -> Command {
        let mut command = Command::new(&self.program);
        command.args(["detect", "train"]).args(params.train_args());
        command
    }

    pub fn val_command(&self, weights: &Path, data: &Path, split: Split) -> Command {
        let mut command = Command::new(&self.program);
        command.args(["detect", "val"]).args([
            format!("model={}", weights.display()),
            format!("data={}", data.display()),
            format!("split={}", split),
        ]);
        command
    }

    pub fn export_command(&self, weights: &Path, imgsz: u32) -> Command {
        let mut command = Command::new(&self.program);
        command.arg("export").args([
            format!("model={}", weights.display()),
            "format=onnx".to_string(),
            format!("imgsz={}", imgsz),
        ]);
        command
    }

    fn run(&self, mut command: Command, what: &str) -> Result<()> {
        log::info!("UltralyticsCli: {:?}", command);
        let status = command
            .status()
            .with_context(|| format!("failed to run {} for {}", self.program.display(), what))?;
        if !status.success() {
            return Err(anyhow!("{} exited with {}", what, status));
        }
        Ok(())
    }
}

impl Default for UltralyticsCli {
    fn default() -> Self {
        Self::new("yolo")
    }
}

impl Trainer for UltralyticsCli {
    fn train(&self, params: &TrainParams) -> Result<()> {
        self.run(self.train_command(params), "training")
    }

    fn validate(&self, weights: &Path, data: &Path, split: Split) -> Result<()> {
        self.run(self.val_command(weights, data, split), "validation")
    }

    fn export(&self, weights: &Path, imgsz: u32) -> Result<PathBuf> {
        self.run(self.export_command(weights, imgsz), "export")?;
        let exported = weights.with_extension(EXPORT_EXTENSION);
        if !exported.is_file() {
            return Err(anyhow!("export produced no {}", exported.display()));
        }
        Ok(exported)
    }
}

/// Outcome of a training run.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainReport {
    /// Best checkpoint, when the run produced one.
    pub best_weights: Option<PathBuf>,
    /// Splits the best checkpoint was evaluated on.
    pub evaluated: Vec<Split>,
    /// ONNX copy of the best checkpoint inside the weights directory.
    pub exported: Option<PathBuf>,
}

/// Train, evaluate the best checkpoint on `val` and `test`, then export it
/// into `weights_dir` as `<name>.onnx`.
pub fn run_training(
    trainer: &dyn Trainer,
    params: &TrainParams,
    weights_dir: &Path,
) -> Result<TrainReport> {
    params.validate()?;
    log::info!(
        "training {} on {} for {} epochs",
        params.model_arg(),
        params.data.display(),
        params.epochs
    );
    trainer.train(params).context("training failed")?;

    let best = params.best_weights();
    if !best.is_file() {
        log::warn!("no best checkpoint at {}, skipping evaluation", best.display());
        return Ok(TrainReport {
            best_weights: None,
            evaluated: Vec::new(),
            exported: None,
        });
    }

    let mut evaluated = Vec::new();
    for split in [Split::Val, Split::Test] {
        trainer
            .validate(&best, &params.data, split)
            .with_context(|| format!("evaluation on {} failed", split))?;
        log::info!("evaluated {} on {} split", best.display(), split);
        evaluated.push(split);
    }

    let onnx = trainer
        .export(&best, params.imgsz)
        .context("export to onnx failed")?;
    std::fs::create_dir_all(weights_dir)
        .with_context(|| format!("create weights directory {}", weights_dir.display()))?;
    let exported = weights_dir.join(format!("{}.{}", params.name, EXPORT_EXTENSION));
    std::fs::copy(&onnx, &exported)
        .with_context(|| format!("copy {} to {}", onnx.display(), exported.display()))?;
    log::info!("exported {} to {}", best.display(), exported.display());

    Ok(TrainReport {
        best_weights: Some(best),
        evaluated,
        exported: Some(exported),
    })
}
