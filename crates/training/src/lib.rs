//! Training and evaluation driver for the play classifier.

pub mod driver;
pub mod metrics;

pub use driver::{
    compile, compile_with_pretrained, evaluate, load_classifier_from_checkpoint, run_train,
    ActivationKind, CompiledTrainer, FillModeKind, FitOutcome, TrainArgs, TrainingConfig,
};
pub use metrics::{ConfusionMatrix, EpochRecord, TrainingHistory};
pub use models::{OutputActivation, TransferClassifier, TransferClassifierConfig};

use burn::backend::Autodiff;

/// Backend alias for training/eval.
pub type TrainBackend = burn_ndarray::NdArray<f32>;
pub type ADBackend = Autodiff<TrainBackend>;
