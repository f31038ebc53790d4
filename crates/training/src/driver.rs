//! End-to-end training driver: data loading, splitting, the SGD loop with
//! the frozen-backbone classifier, and checkpoint/metrics persistence.

use crate::metrics::{ConfusionMatrix, EpochRecord, TrainingHistory};
use crate::{ADBackend, TrainBackend};
use burn::module::{AutodiffModule, Module};
use burn::optim::momentum::MomentumConfig;
use burn::optim::{GradientsParams, Optimizer, SgdConfig};
use burn::record::{BinFileRecorder, FullPrecisionSettings, RecorderError};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use clap::{Parser, ValueEnum};
use models::{OutputActivation, TransferClassifier, TransferClassifierConfig};
use play_dataset::{
    encode_labels, load_labeled_images, stratified_split, AugmentConfig, BatchConfig, BatchIter,
    EncodedLabels, FillMode, ImageStack, LabelCodec, LabeledDataset,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Hyperparameters for one training run.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub momentum: f64,
    /// Per-step decay: the effective rate at step `t` is
    /// `learning_rate / (1 + lr_decay * t)`.
    pub lr_decay: f64,
    pub val_ratio: f32,
    pub seed: u64,
    pub augment: Option<AugmentConfig>,
    pub activation: OutputActivation,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 32,
            learning_rate: 1e-4,
            momentum: 0.9,
            lr_decay: 1e-4,
            val_ratio: 0.2,
            seed: 17,
            augment: Some(AugmentConfig::default()),
            activation: OutputActivation::Softmax,
        }
    }
}

/// A model paired with the config that will train it.
pub struct CompiledTrainer {
    pub model: TransferClassifier<ADBackend>,
    pub config: TrainingConfig,
}

/// Trained model plus the per-epoch history.
pub struct FitOutcome {
    pub model: TransferClassifier<ADBackend>,
    pub history: TrainingHistory,
}

/// Builds a fresh model for the config, seeding parameter init from the
/// run seed.
pub fn compile(config: TrainingConfig) -> CompiledTrainer {
    let device = <ADBackend as Backend>::Device::default();
    let model = TransferClassifier::<ADBackend>::new(
        TransferClassifierConfig {
            activation: config.activation,
            seed: Some(config.seed),
            ..TransferClassifierConfig::default()
        },
        &device,
    );
    CompiledTrainer { model, config }
}

/// Like [`compile`], but loads pretrained backbone weights before training.
pub fn compile_with_pretrained(
    config: TrainingConfig,
    backbone_path: &Path,
) -> Result<CompiledTrainer, RecorderError> {
    let device = <ADBackend as Backend>::Device::default();
    let trainer = compile(config);
    let model = trainer.model.with_pretrained_backbone(backbone_path, &device)?;
    Ok(CompiledTrainer {
        model,
        config: trainer.config,
    })
}

/// Binary cross-entropy over the two-column rows, mean-reduced. Inputs are
/// clamped away from 0 and 1 to keep the logs finite.
fn bce_loss<B: Backend>(preds: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    let eps = 1e-6;
    let preds = preds.clamp(eps, 1.0 - eps);
    let loss = targets.clone() * preds.clone().log()
        + (targets.neg() + 1.0) * (preds.neg() + 1.0).log();
    loss.neg().mean()
}

fn scalar_of<B: Backend>(t: Tensor<B, 1>) -> f32 {
    t.into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .into_iter()
        .next()
        .unwrap_or(0.0)
}

/// Counts rows where prediction and target agree on the argmax column.
fn count_correct(preds: &[f32], targets: &[f32]) -> usize {
    preds
        .chunks_exact(2)
        .zip(targets.chunks_exact(2))
        .filter(|(p, t)| (p[0] >= p[1]) == (t[0] >= t[1]))
        .count()
}

impl CompiledTrainer {
    /// Runs the SGD loop. The backbone stays frozen through the model's
    /// forward; only head parameters receive updates.
    pub fn fit(
        self,
        train: &LabeledDataset,
        train_labels: &EncodedLabels,
        val: &LabeledDataset,
        val_labels: &EncodedLabels,
    ) -> anyhow::Result<FitOutcome> {
        let device = <ADBackend as Backend>::Device::default();
        let config = self.config;
        let mut model = self.model;
        let mut optim = SgdConfig::new()
            .with_momentum(Some(
                MomentumConfig::new().with_momentum(config.momentum),
            ))
            .init();

        let mut train_iter = BatchIter::new(
            train,
            train_labels,
            BatchConfig {
                batch_size: config.batch_size,
                shuffle: true,
                augment: config.augment,
                seed: config.seed,
            },
        )?;
        let mut val_iter = BatchIter::new(val, val_labels, BatchConfig::evaluation(config.batch_size))?;

        let mut history = TrainingHistory::default();
        let mut step: u64 = 0;
        for epoch in 0..config.epochs {
            train_iter.reset(epoch as u64);
            let mut loss_sum = 0.0f64;
            let mut batches = 0usize;
            let mut correct = 0usize;
            let mut seen = 0usize;
            while let Some(batch) = train_iter.next_batch::<ADBackend>(&device) {
                let preds = model.forward(batch.images);
                let loss = bce_loss(preds.clone(), batch.targets.clone());
                let loss_detached = loss.clone().detach();
                let grads = GradientsParams::from_grads(loss.backward(), &model);
                let lr = config.learning_rate / (1.0 + config.lr_decay * step as f64);
                model = optim.step(lr, model, grads);
                step += 1;

                loss_sum += scalar_of(loss_detached) as f64;
                batches += 1;
                let preds_vec = preds.detach().into_data().to_vec::<f32>().unwrap_or_default();
                let targets_vec = batch
                    .targets
                    .into_data()
                    .to_vec::<f32>()
                    .unwrap_or_default();
                correct += count_correct(&preds_vec, &targets_vec);
                seen += preds_vec.len() / 2;
            }

            let valid_model = model.valid();
            let (val_loss, val_accuracy) = validation_pass(&valid_model, &mut val_iter)?;
            let record = EpochRecord {
                epoch,
                train_loss: if batches == 0 {
                    0.0
                } else {
                    (loss_sum / batches as f64) as f32
                },
                train_accuracy: if seen == 0 {
                    0.0
                } else {
                    correct as f32 / seen as f32
                },
                val_loss,
                val_accuracy,
            };
            println!(
                "epoch {}: train loss {:.4} acc {:.3} | val loss {:.4} acc {:.3}",
                record.epoch,
                record.train_loss,
                record.train_accuracy,
                record.val_loss,
                record.val_accuracy
            );
            history.push(record);
        }

        Ok(FitOutcome { model, history })
    }
}

fn validation_pass(
    model: &TransferClassifier<TrainBackend>,
    iter: &mut BatchIter<'_>,
) -> anyhow::Result<(f32, f32)> {
    let device = <TrainBackend as Backend>::Device::default();
    iter.reset(0);
    let mut loss_sum = 0.0f64;
    let mut batches = 0usize;
    let mut correct = 0usize;
    let mut seen = 0usize;
    while let Some(batch) = iter.next_batch::<TrainBackend>(&device) {
        let preds = model.forward(batch.images);
        let loss = bce_loss(preds.clone(), batch.targets.clone());
        loss_sum += scalar_of(loss) as f64;
        batches += 1;
        let preds_vec = preds.into_data().to_vec::<f32>().unwrap_or_default();
        let targets_vec = batch
            .targets
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default();
        correct += count_correct(&preds_vec, &targets_vec);
        seen += preds_vec.len() / 2;
    }
    let loss = if batches == 0 {
        0.0
    } else {
        (loss_sum / batches as f64) as f32
    };
    let accuracy = if seen == 0 {
        0.0
    } else {
        correct as f32 / seen as f32
    };
    Ok((loss, accuracy))
}

/// Runs the model over the validation set and tallies the confusion
/// matrix, rows true and columns predicted, in the codec's class order.
pub fn evaluate(
    model: &TransferClassifier<TrainBackend>,
    val: &LabeledDataset,
    val_labels: &EncodedLabels,
    codec: &LabelCodec,
    batch_size: usize,
) -> anyhow::Result<ConfusionMatrix> {
    let device = <TrainBackend as Backend>::Device::default();
    let mut iter = BatchIter::new(val, val_labels, BatchConfig::evaluation(batch_size))?;
    let mut matrix = ConfusionMatrix::new(codec.classes().clone());
    while let Some(batch) = iter.next_batch::<TrainBackend>(&device) {
        let preds = model
            .forward(batch.images)
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default();
        let targets = batch
            .targets
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default();
        for (p, t) in preds.chunks_exact(2).zip(targets.chunks_exact(2)) {
            let predicted = codec.class_of_row(&[p[0], p[1]]);
            let truth = codec.class_of_row(&[t[0], t[1]]);
            matrix.record(truth, predicted);
        }
    }
    Ok(matrix)
}

/// Loads a full classifier checkpoint for evaluation.
pub fn load_classifier_from_checkpoint(
    path: &Path,
    activation: OutputActivation,
    device: &<TrainBackend as Backend>::Device,
) -> Result<TransferClassifier<TrainBackend>, RecorderError> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    TransferClassifier::<TrainBackend>::new(
        TransferClassifierConfig {
            activation,
            ..TransferClassifierConfig::default()
        },
        device,
    )
    .load_file(path, &recorder, device)
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ActivationKind {
    Softmax,
    Sigmoid,
}

impl From<ActivationKind> for OutputActivation {
    fn from(kind: ActivationKind) -> Self {
        match kind {
            ActivationKind::Softmax => OutputActivation::Softmax,
            ActivationKind::Sigmoid => OutputActivation::Sigmoid,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum FillModeKind {
    Constant,
    Nearest,
    Reflect,
    Wrap,
}

impl From<FillModeKind> for FillMode {
    fn from(kind: FillModeKind) -> Self {
        match kind {
            FillModeKind::Constant => FillMode::Constant,
            FillModeKind::Nearest => FillMode::Nearest,
            FillModeKind::Reflect => FillMode::Reflect,
            FillModeKind::Wrap => FillMode::Wrap,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "train", about = "Train the play classifier on a labeled image tree")]
pub struct TrainArgs {
    /// Image tree root; each class label names a subdirectory.
    #[arg(long, default_value = "data/google_imgs")]
    pub data_root: PathBuf,
    /// Class labels, comma separated; exactly two.
    #[arg(long, value_delimiter = ',', default_value = "dunk,jumpshot")]
    pub labels: Vec<String>,
    /// Number of epochs.
    #[arg(long, default_value_t = 100)]
    pub epochs: usize,
    /// Batch size.
    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,
    /// Base learning rate.
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,
    /// SGD momentum.
    #[arg(long, default_value_t = 0.9)]
    pub momentum: f64,
    /// Per-step learning rate decay.
    #[arg(long, default_value_t = 1e-4)]
    pub lr_decay: f64,
    /// Fraction of each class held out for validation.
    #[arg(long, default_value_t = 0.2)]
    pub val_ratio: f32,
    /// Seed for the split, shuffling, augmentation, and model init.
    #[arg(long, default_value_t = 17)]
    pub seed: u64,
    /// Disable training-time augmentation.
    #[arg(long, default_value_t = false)]
    pub no_augment: bool,
    /// Out-of-bounds fill for augmentation.
    #[arg(long, value_enum, default_value_t = FillModeKind::Wrap)]
    pub fill_mode: FillModeKind,
    /// Output activation on the head.
    #[arg(long, value_enum, default_value_t = ActivationKind::Softmax)]
    pub activation: ActivationKind,
    /// Pretrained backbone checkpoint to start from.
    #[arg(long)]
    pub pretrained: Option<PathBuf>,
    /// Load the dataset from a saved snapshot instead of the image tree.
    #[arg(long)]
    pub snapshot_in: Option<PathBuf>,
    /// Directory for the dataset snapshot; skipped when absent.
    #[arg(long)]
    pub snapshot_out: Option<PathBuf>,
    /// Run name; prefixes every output file.
    #[arg(long, default_value = "google")]
    pub run_name: String,
    /// Directory for the checkpoint and metric CSVs.
    #[arg(long, default_value = "models")]
    pub out_dir: PathBuf,
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let labels: Vec<&str> = args.labels.iter().map(String::as_str).collect();
    let dataset = match &args.snapshot_in {
        Some(dir) => {
            let stack = ImageStack::load(dir, &args.run_name)?;
            println!(
                "loaded snapshot {} ({} samples)",
                args.run_name,
                stack.samples
            );
            stack.into_dataset()
        }
        None => {
            let (dataset, summary) = load_labeled_images(&args.data_root, &labels)?;
            println!(
                "loaded {} images ({} grayscale dropped, {} alpha converted)",
                summary.loaded, summary.dropped_grayscale, summary.converted_alpha
            );
            for (label, count) in &summary.per_label {
                println!("  {label}: {count}");
            }
            dataset
        }
    };

    let codec = LabelCodec::fit(&dataset, &labels)?;

    if let Some(snapshot_dir) = &args.snapshot_out {
        let stack = ImageStack::from_dataset(&dataset)?;
        let manifest = stack.save(snapshot_dir, &args.run_name)?;
        println!(
            "snapshot {}: {} samples, sha256 {}",
            manifest.name, manifest.samples, manifest.checksum_sha256
        );
    }

    let split = stratified_split(dataset, args.val_ratio, args.seed)?;
    println!(
        "split: {} train / {} val",
        split.train.len(),
        split.val.len()
    );
    let train_labels = encode_labels(&codec, &split.train)?;
    let val_labels = encode_labels(&codec, &split.val)?;

    let config = TrainingConfig {
        epochs: args.epochs,
        batch_size: args.batch_size,
        learning_rate: args.lr,
        momentum: args.momentum,
        lr_decay: args.lr_decay,
        val_ratio: args.val_ratio,
        seed: args.seed,
        augment: if args.no_augment {
            None
        } else {
            Some(AugmentConfig {
                fill_mode: args.fill_mode.into(),
                seed: Some(args.seed),
                ..AugmentConfig::default()
            })
        },
        activation: args.activation.into(),
    };

    let trainer = match &args.pretrained {
        Some(path) => compile_with_pretrained(config, path)
            .map_err(|e| anyhow::anyhow!("failed to load pretrained backbone: {e}"))?,
        None => compile(config),
    };
    let batch_size = trainer.config.batch_size;
    let outcome = trainer.fit(&split.train, &train_labels, &split.val, &val_labels)?;

    fs::create_dir_all(&args.out_dir)?;
    let ckpt_path = args
        .out_dir
        .join(format!("{}_{}ep.bin", args.run_name, args.epochs));
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    outcome
        .model
        .clone()
        .save_file(&ckpt_path, &recorder)
        .map_err(|e| anyhow::anyhow!("failed to save checkpoint: {e}"))?;
    println!("saved checkpoint to {}", ckpt_path.display());

    let history_path = args
        .out_dir
        .join(format!("{}_history.csv", args.run_name));
    outcome.history.save_csv(&history_path)?;

    let matrix = evaluate(
        &outcome.model.valid(),
        &split.val,
        &val_labels,
        &codec,
        batch_size,
    )?;
    println!("validation confusion matrix:\n{matrix}");
    let conmat_path = args.out_dir.join(format!("{}_conmat.csv", args.run_name));
    matrix.save_csv(&conmat_path)?;

    Ok(())
}
