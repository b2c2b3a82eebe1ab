//! # Configuration
//!
//! Hyperparameters for training and the settings of the command line driver.
//!
//! The driver reads its settings from the environment, optionally seeded from a
//! `.env` file. Where the code runs is an explicit [`RunEnvironment`] value,
//! chosen once at startup and passed down, never probed later.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use dotenv::dotenv;
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::error::{EmbeddingError, Result};
use crate::phrases::PhrasesConfig;
use crate::vectors::VectorFormat;

/// Training objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    /// Predict each context word from the target word.
    SkipGram,
    /// Predict the target word from the mean of its context.
    Cbow,
}

impl FromStr for Architecture {
    type Err = EmbeddingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "skipgram" | "skip_gram" | "skip-gram" | "sg" => Ok(Architecture::SkipGram),
            "cbow" => Ok(Architecture::Cbow),
            other => Err(EmbeddingError::InvalidConfig(format!("unknown architecture '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Hyperparameters for one training run.
///
/// # Fields
///
/// * `vector_size` - Embedding dimensionality.
/// * `window` - Maximum number of tokens considered on each side of a target.
/// * `min_count` - Tokens seen fewer times are dropped from the vocabulary.
/// * `epochs` - Full passes over the corpus.
/// * `workers` - Training threads. Advisory; results differ run to run when above 1.
/// * `negative` - Negative samples per positive pair.
/// * `sample` - Down-sampling threshold for frequent tokens, `0.0` disables it.
/// * `alpha` - Initial learning rate.
/// * `min_alpha` - Learning rate reached at the end of the last epoch.
/// * `seed` - Seed for vector initialisation and sampling.
/// * `architecture` - Skip-gram or CBOW.
/// * `show_progress` - Draw a progress bar on stderr.
pub struct TrainingConfig {
    pub vector_size: usize,
    pub window: usize,
    pub min_count: u64,
    pub epochs: usize,
    pub workers: usize,
    pub negative: usize,
    pub sample: f64,
    pub alpha: f32,
    pub min_alpha: f32,
    pub seed: u64,
    pub architecture: Architecture,
    pub show_progress: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            vector_size: 100,
            window: 5,
            min_count: 5,
            epochs: 5,
            workers: num_cpus::get(),
            negative: 5,
            sample: 1e-3,
            alpha: 0.025,
            min_alpha: 0.0001,
            seed: 1,
            architecture: Architecture::SkipGram,
            show_progress: false,
        }
    }
}

impl TrainingConfig {
    /// Check every hyperparameter before any work starts.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("vector_size", self.vector_size),
            ("window", self.window),
            ("epochs", self.epochs),
            ("workers", self.workers),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(EmbeddingError::InvalidConfig(format!("{name} must be positive")));
            }
        }
        if !(self.alpha > 0.0) {
            return Err(EmbeddingError::InvalidConfig("alpha must be positive".to_string()));
        }
        if !(self.min_alpha >= 0.0 && self.min_alpha <= self.alpha) {
            return Err(EmbeddingError::InvalidConfig("min_alpha must lie in [0, alpha]".to_string()));
        }
        if !(self.sample >= 0.0) {
            return Err(EmbeddingError::InvalidConfig("sample must be non-negative".to_string()));
        }
        Ok(())
    }
}

/// Where the driver runs. Picks default data and output locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunEnvironment {
    /// A developer checkout: `data/` in, `models/` out.
    Local,
    /// A hosted notebook or batch runner with mounted `/workspace` volumes.
    Hosted,
}

impl RunEnvironment {
    pub fn data_dir(&self) -> PathBuf {
        match self {
            RunEnvironment::Local => PathBuf::from("data"),
            RunEnvironment::Hosted => PathBuf::from("/workspace/input"),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        match self {
            RunEnvironment::Local => PathBuf::from("models"),
            RunEnvironment::Hosted => PathBuf::from("/workspace/output"),
        }
    }
}

impl FromStr for RunEnvironment {
    type Err = EmbeddingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(RunEnvironment::Local),
            "hosted" => Ok(RunEnvironment::Hosted),
            other => Err(EmbeddingError::InvalidConfig(format!("unknown environment '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Settings for the command line driver.
///
/// # Fields
///
/// * `environment` - Explicit run environment.
/// * `corpus_path` - Newline-delimited documents. Missing file means the built-in sample.
/// * `output_dir` - Where vector files and the model snapshot go.
/// * `log_file` - Append-only log destination.
/// * `log_level` - `error`, `warn`, `info`, `debug` or `trace`.
/// * `vector_format` - Layout of the saved vector file that gets reloaded.
/// * `training` - Training hyperparameters.
/// * `phrases` - Phrase detector settings.
pub struct WorkflowConfig {
    pub environment: RunEnvironment,
    pub corpus_path: PathBuf,
    pub output_dir: PathBuf,
    pub log_file: PathBuf,
    pub log_level: String,
    pub vector_format: VectorFormat,
    pub training: TrainingConfig,
    pub phrases: PhrasesConfig,
}

impl WorkflowConfig {
    /// Defaults for `environment`.
    pub fn new(environment: RunEnvironment) -> Self {
        Self {
            environment,
            corpus_path: environment.data_dir().join("reviews.txt"),
            output_dir: environment.output_dir(),
            log_file: PathBuf::from("logs/embeddings.log"),
            log_level: "info".to_string(),
            vector_format: VectorFormat::Binary,
            training: TrainingConfig {
                show_progress: true,
                ..TrainingConfig::default()
            },
            phrases: PhrasesConfig::default(),
        }
    }

    /// Build the configuration from `EMBEDDINGS_*` environment variables.
    ///
    /// A `.env` file in the working directory is loaded first when present.
    /// Unset variables keep the defaults of the selected environment; set but
    /// unparsable ones are an `InvalidConfig` error.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let environment = env_parse("EMBEDDINGS_ENV")?.unwrap_or(RunEnvironment::Local);
        let mut config = Self::new(environment);

        if let Some(path) = env_parse("EMBEDDINGS_CORPUS")? {
            config.corpus_path = path;
        }
        if let Some(dir) = env_parse("EMBEDDINGS_OUTPUT_DIR")? {
            config.output_dir = dir;
        }
        if let Some(file) = env_parse("EMBEDDINGS_LOG_FILE")? {
            config.log_file = file;
        }
        if let Some(level) = env_parse("EMBEDDINGS_LOG_LEVEL")? {
            config.log_level = level;
        }
        if let Some(format) = env_parse("EMBEDDINGS_VECTOR_FORMAT")? {
            config.vector_format = format;
        }

        let training = &mut config.training;
        if let Some(v) = env_parse("EMBEDDINGS_VECTOR_SIZE")? {
            training.vector_size = v;
        }
        if let Some(v) = env_parse("EMBEDDINGS_WINDOW")? {
            training.window = v;
        }
        if let Some(v) = env_parse("EMBEDDINGS_MIN_COUNT")? {
            training.min_count = v;
        }
        if let Some(v) = env_parse("EMBEDDINGS_EPOCHS")? {
            training.epochs = v;
        }
        if let Some(v) = env_parse("EMBEDDINGS_WORKERS")? {
            training.workers = v;
        }
        if let Some(v) = env_parse("EMBEDDINGS_ARCHITECTURE")? {
            training.architecture = v;
        }

        config.training.validate()?;
        config.log_level()?;
        Ok(config)
    }

    pub fn log_level(&self) -> Result<LevelFilter> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| EmbeddingError::InvalidConfig(format!("unknown log level '{}'", self.log_level)))
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| EmbeddingError::InvalidConfig(format!("{key}={raw} cannot be parsed"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_training_config_is_valid() {
        assert!(TrainingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_fields() {
        for config in [
            TrainingConfig { vector_size: 0, ..TrainingConfig::default() },
            TrainingConfig { window: 0, ..TrainingConfig::default() },
            TrainingConfig { epochs: 0, ..TrainingConfig::default() },
            TrainingConfig { workers: 0, ..TrainingConfig::default() },
        ] {
            assert!(matches!(config.validate(), Err(EmbeddingError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_validate_rejects_bad_rates() {
        let config = TrainingConfig { alpha: 0.01, min_alpha: 0.1, ..TrainingConfig::default() };
        assert!(config.validate().is_err());
        let config = TrainingConfig { sample: -1.0, ..TrainingConfig::default() };
        assert!(config.validate().is_err());
        let config = TrainingConfig { alpha: f32::NAN, ..TrainingConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_count_zero_is_allowed() {
        let config = TrainingConfig { min_count: 0, ..TrainingConfig::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_picks_directories() {
        let local = WorkflowConfig::new(RunEnvironment::Local);
        assert_eq!(local.output_dir, PathBuf::from("models"));
        assert_eq!(local.corpus_path, PathBuf::from("data/reviews.txt"));

        let hosted = WorkflowConfig::new(RunEnvironment::Hosted);
        assert_eq!(hosted.output_dir, PathBuf::from("/workspace/output"));
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("Hosted".parse::<RunEnvironment>().unwrap(), RunEnvironment::Hosted);
        assert_eq!("cbow".parse::<Architecture>().unwrap(), Architecture::Cbow);
        assert_eq!("skip-gram".parse::<Architecture>().unwrap(), Architecture::SkipGram);
        assert!("glove".parse::<Architecture>().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut config = WorkflowConfig::new(RunEnvironment::Local);
        assert_eq!(config.log_level().unwrap(), LevelFilter::Info);
        config.log_level = "loud".to_string();
        assert!(config.log_level().is_err());
    }

    #[test]
    fn test_config_serializes() {
        let config = WorkflowConfig::new(RunEnvironment::Local);
        let json = serde_json::to_string(&config).unwrap();
        let back: WorkflowConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
