use clap::Parser;
use play_dataset::{encode_labels, load_labeled_images, stratified_split, LabelCodec};
use std::path::PathBuf;
use training::{evaluate, load_classifier_from_checkpoint, ActivationKind};

#[derive(Parser, Debug)]
#[command(
    name = "eval",
    about = "Evaluate a play classifier checkpoint on the held-out validation split"
)]
struct Args {
    /// Image tree root; each class label names a subdirectory.
    #[arg(long, default_value = "data/google_imgs")]
    data_root: PathBuf,
    /// Class labels, comma separated; exactly two.
    #[arg(long, value_delimiter = ',', default_value = "dunk,jumpshot")]
    labels: Vec<String>,
    /// Checkpoint to evaluate.
    #[arg(long)]
    checkpoint: PathBuf,
    /// Output activation the checkpoint was trained with.
    #[arg(long, value_enum, default_value_t = ActivationKind::Softmax)]
    activation: ActivationKind,
    /// Fraction of each class held out for validation. Must match the
    /// training run to reproduce its split.
    #[arg(long, default_value_t = 0.2)]
    val_ratio: f32,
    /// Split seed. Must match the training run.
    #[arg(long, default_value_t = 17)]
    seed: u64,
    /// Batch size.
    #[arg(long, default_value_t = 32)]
    batch_size: usize,
    /// Optional CSV output path for the confusion matrix.
    #[arg(long)]
    conmat_out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let labels: Vec<&str> = args.labels.iter().map(String::as_str).collect();

    let (dataset, summary) = load_labeled_images(&args.data_root, &labels)?;
    println!("loaded {} images", summary.loaded);
    let codec = LabelCodec::fit(&dataset, &labels)?;
    let split = stratified_split(dataset, args.val_ratio, args.seed)?;
    let val_labels = encode_labels(&codec, &split.val)?;
    println!("evaluating on {} held-out samples", split.val.len());

    let device = Default::default();
    let model = load_classifier_from_checkpoint(&args.checkpoint, args.activation.into(), &device)
        .map_err(|e| {
            anyhow::anyhow!(
                "failed to load checkpoint {}: {e}",
                args.checkpoint.display()
            )
        })?;

    let matrix = evaluate(&model, &split.val, &val_labels, &codec, args.batch_size)?;
    println!("{matrix}");
    println!("accuracy: {:.3}", matrix.accuracy());
    if let Some(path) = &args.conmat_out {
        matrix.save_csv(path)?;
        println!("wrote {}", path.display());
    }
    Ok(())
}
