//! ViSoLex command line.
//!
//! Trains the baseline normalizer with supervised, semi-supervised or weakly
//! supervised self-training, and runs NSW detection or normalization with a
//! trained checkpoint.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use visolex_core::{
    BasicNormalizer, CheckpointStore, HfSubwordTokenizer, HttpCheckpointSource, ModelSource,
    Normalizer, NswDetector, PieceTokenizer, SubwordTokenizer, TrainingMode,
};
use visolex_trainer::baseline::MODEL_FILE;
use visolex_trainer::{BaselineModel, DataHandler, SelfTrainer, Split, TrainingConfig, TrainingData};

const VOCAB_FILE: &str = "vocab.json";

#[derive(Parser)]
#[command(name = "visolex")]
#[command(about = "Detect and normalize non-standard words in Vietnamese social-media text")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON training configuration (missing keys take defaults)
    #[arg(short, long, global = true, env = "VISOLEX_CONFIG")]
    config: Option<PathBuf>,

    /// Pretrained tokenizer.json; the built-in word-piece vocabulary is used otherwise
    #[arg(short, long, global = true)]
    tokenizer: Option<PathBuf>,

    /// Base URL to download missing checkpoints from
    #[arg(long, global = true, env = "VISOLEX_CHECKPOINT_URL")]
    checkpoint_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a normalizer and write checkpoints and results
    Train {
        /// Labeled training split (JSON Lines)
        #[arg(long)]
        train: PathBuf,
        /// Labeled dev split
        #[arg(long)]
        dev: PathBuf,
        /// Labeled test split
        #[arg(long)]
        test: PathBuf,
        /// Unlabeled pool, required for semi and weakly supervised training
        #[arg(long)]
        unlabeled: Option<PathBuf>,
        /// Override the configured training mode
        #[arg(short, long)]
        mode: Option<TrainingMode>,
        /// Put checkpoints, logs and results under this directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Log to stderr instead of the per-run log file
        #[arg(long)]
        stderr: bool,
    },
    /// Print the NSW spans of a sentence as JSON
    Detect {
        /// Use student_last instead of student_best
        #[arg(long)]
        last: bool,
        text: String,
    },
    /// Print the normalized sentence, optionally with its NSW spans
    Normalize {
        /// Also report spans with predictions and confidence scores
        #[arg(short, long)]
        detect: bool,
        /// Use student_last instead of student_best
        #[arg(long)]
        last: bool,
        text: String,
    },
}

/// The tokenizer a run uses, and where its vocabulary lives.
enum Vocabulary {
    Pretrained(Arc<HfSubwordTokenizer>),
    Pieces(Arc<PieceTokenizer>, PathBuf),
}

impl Vocabulary {
    fn open(tokenizer: Option<&Path>, config: &TrainingConfig) -> Result<Self> {
        if let Some(path) = tokenizer {
            let tokenizer = HfSubwordTokenizer::from_file(path)
                .with_context(|| format!("loading tokenizer {}", path.display()))?;
            return Ok(Self::Pretrained(Arc::new(tokenizer)));
        }

        let vocab_path = config.ckpt_dir.join(&config.student_name).join(VOCAB_FILE);
        let tokenizer = if vocab_path.exists() {
            let raw = fs::read_to_string(&vocab_path)
                .with_context(|| format!("reading {}", vocab_path.display()))?;
            PieceTokenizer::from_json(&raw)?
        } else {
            PieceTokenizer::new()
        };
        Ok(Self::Pieces(Arc::new(tokenizer), vocab_path))
    }

    fn shared(&self) -> Arc<dyn SubwordTokenizer> {
        match self {
            Self::Pretrained(tokenizer) => Arc::clone(tokenizer) as Arc<dyn SubwordTokenizer>,
            Self::Pieces(tokenizer, _) => Arc::clone(tokenizer) as Arc<dyn SubwordTokenizer>,
        }
    }

    /// Saves a grown word-piece vocabulary next to the checkpoints.
    fn persist(&self) -> Result<()> {
        if let Self::Pieces(tokenizer, path) = self {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, tokenizer.to_json()?)
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), pieces = tokenizer.vocab_size(), "saved vocabulary");
        }
        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> Result<TrainingConfig> {
    match path {
        Some(path) => TrainingConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(TrainingConfig::default()),
    }
}

fn init_logging(config: &TrainingConfig, to_stderr: bool) -> Result<()> {
    if to_stderr {
        tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_writer(std::io::stderr)
            .init();
        return Ok(());
    }

    fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("creating log dir {}", config.log_dir.display()))?;
    let path = config.log_file();
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    eprintln!("Logging to {}", path.display());
    Ok(())
}

fn train(
    config: TrainingConfig,
    vocabulary_path: Option<&Path>,
    splits: [&Path; 3],
    unlabeled: Option<&Path>,
    to_stderr: bool,
) -> Result<()> {
    config.validate()?;
    init_logging(&config, to_stderr)?;

    let vocabulary = Vocabulary::open(vocabulary_path, &config)?;
    let tokenizer = vocabulary.shared();
    if config.remove_accents() {
        info!(ratio = config.rm_accent_ratio, "accent augmentation enabled");
    }

    info!("Loading data");
    let mut handler = DataHandler::new(Arc::clone(&tokenizer), &config)
        .with_preprocessor(BasicNormalizer::new()?);
    let [train_path, dev_path, test_path] = splits;
    let data = TrainingData {
        train: handler.load_dataset(train_path, Split::Train)?,
        dev: handler.load_dataset(dev_path, Split::Dev)?,
        test: handler.load_dataset(test_path, Split::Test)?,
        unlabeled: unlabeled
            .map(|path| handler.load_dataset(path, Split::Unlabeled))
            .transpose()?,
    };

    info!(student = %config.student_name, mode = %config.training_mode, "Building student");
    let student =
        BaselineModel::new(&config.student_name, config.hidden_size, Arc::clone(&tokenizer));
    let teacher_tokenizer = Arc::clone(&tokenizer);
    let abstain_below = config.abstain_below;
    let mut trainer: SelfTrainer<BaselineModel> = SelfTrainer::new(config, student, data)?
        .with_tokenizer(Arc::clone(&tokenizer))
        .with_teacher_factory(move |hidden_size| {
            Ok(BaselineModel::new("teacher", hidden_size, teacher_tokenizer)
                .with_abstain_below(abstain_below))
        });

    let result = trainer.train()?;
    vocabulary.persist()?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn detector(
    config: &TrainingConfig,
    vocabulary: &Vocabulary,
    checkpoint_url: Option<&str>,
    last: bool,
) -> NswDetector<BaselineModel> {
    let tokenizer = vocabulary.shared();
    let mut store = CheckpointStore::new(&config.ckpt_dir);
    if let Some(url) = checkpoint_url {
        let source = HttpCheckpointSource::new(url).with_files([MODEL_FILE]);
        store = store.with_source(Arc::new(source));
    }
    let key = config.checkpoint_key();
    let source = if last {
        ModelSource::last(store, key)
    } else {
        ModelSource::best(store, key)
    };
    let model =
        BaselineModel::new(&config.student_name, config.hidden_size, Arc::clone(&tokenizer));
    NswDetector::new(model, tokenizer, source)
}

fn init_quiet_logging() {
    tracing_subscriber::fmt()
        .with_max_level(Level::WARN)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Train {
            train: train_path,
            dev,
            test,
            unlabeled,
            mode,
            output,
            stderr,
        } => {
            let mut config = config;
            if let Some(mode) = mode {
                config = config.with_training_mode(mode);
            }
            if let Some(root) = output {
                config = config.with_output_root(root);
            }
            train(
                config,
                cli.tokenizer.as_deref(),
                [train_path.as_path(), dev.as_path(), test.as_path()],
                unlabeled.as_deref(),
                stderr,
            )?;
        }
        Commands::Detect { last, text } => {
            init_quiet_logging();
            let vocabulary = Vocabulary::open(cli.tokenizer.as_deref(), &config)?;
            let spans = detector(&config, &vocabulary, cli.checkpoint_url.as_deref(), last)
                .detect_nsw(&text)
                .context("detection failed")?;
            println!("{}", serde_json::to_string_pretty(&spans)?);
        }
        Commands::Normalize { detect, last, text } => {
            init_quiet_logging();
            let vocabulary = Vocabulary::open(cli.tokenizer.as_deref(), &config)?;
            let normalizer = Normalizer::with_spacing_cleanup(detector(
                &config,
                &vocabulary,
                cli.checkpoint_url.as_deref(),
                last,
            ))?;
            let output = normalizer
                .normalize_sentence(&text, detect)
                .context("normalization failed")?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
