use std::fs;
use std::time::Instant;

use anyhow::{Context, Result};
use log::{info, warn, Level};

use rust_embeddings::corpus::read_documents;
use rust_embeddings::logging::{LogConfig, Logger};
use rust_embeddings::{
    count_phrases, CorpusStreamer, EmbeddingWorkflow, Phrases, VectorFormat, Word2Vec, WorkflowConfig,
};

/// Macro to time the execution of a block of code
macro_rules! time_it {
    ($label:expr, $block:expr) => {{
        let start = Instant::now();
        let result = $block;
        let duration = start.elapsed();
        info!("{} took {:.8?}", $label, duration);
        result
    }};
}

/// Used when no corpus file is configured or found.
const SAMPLE_REVIEWS: &[&str] = &[
    "The movie was good, the acting was great and the story was good.",
    "The movie was bad. The acting was terrible and the plot was bad.",
    "A good film with a great cast and special effects.",
    "A bad film, boring and far too long. The special effects were cheap.",
    "Great acting, good story, a film worth watching again.",
    "Terrible plot and bad acting. The movie was boring.",
    "The special effects were great and the movie was fun.",
    "A boring movie with a terrible story and bad special effects.",
    "Good fun, great cast, a movie worth watching.",
    "The film was long and boring but the acting was good.",
];

fn main() -> Result<()> {
    let config = WorkflowConfig::from_env().context("invalid configuration")?;
    let logger = Logger::init(LogConfig::new(&config.log_file, config.log_level()?))
        .with_context(|| format!("cannot open log file {}", config.log_file.display()))?;
    info!(
        "Running in {:?} environment, logging to {}",
        config.environment,
        logger.log_file().display()
    );

    // Document collection
    let documents = if config.corpus_path.exists() {
        read_documents(&config.corpus_path)?
    } else {
        warn!("{} not found, using the built-in sample reviews", config.corpus_path.display());
        SAMPLE_REVIEWS.iter().map(|s| s.to_string()).collect()
    };
    let corpus = CorpusStreamer::new(documents);
    info!("Corpus holds {} documents", corpus.len());

    // Train
    let mut workflow = EmbeddingWorkflow::new(Word2Vec);
    let trained = time_it!("Training", workflow.train(&corpus, &config.training))?;
    info!("Vocabulary size: {}", trained.len());

    // Persist both layouts, then reload the configured one
    fs::create_dir_all(&config.output_dir)?;
    let text_path = config.output_dir.join("vectors.txt");
    let binary_path = config.output_dir.join("vectors.bin");
    workflow.save(&text_path, VectorFormat::Text)?;
    workflow.save(&binary_path, VectorFormat::Binary)?;
    let reload_path = match config.vector_format {
        VectorFormat::Text => &text_path,
        VectorFormat::Binary => &binary_path,
    };
    time_it!("Loading", workflow.load(reload_path, config.vector_format))?;

    // Queries
    if let Some(vectors) = workflow.vectors() {
        let probes: Vec<&str> = vectors.keys().iter().take(4).map(String::as_str).collect();
        if let Some(&first) = probes.first() {
            for (token, score) in workflow.most_similar(&[first], &[], 5)? {
                println!("most_similar({first}) -> {token} ({score:.4})");
            }
        }
        if let [a, b, ..] = probes.as_slice() {
            println!("similarity({a}, {b}) = {:.4}", workflow.similarity(a, b)?);
        }
        if probes.len() >= 3 {
            println!("doesnt_match({probes:?}) = {}", workflow.doesnt_match(&probes)?);
            let analogy = workflow.analogy(&probes[..2], &probes[2..3], 3)?;
            println!("analogy({:?} - {:?}) = {analogy:?}", &probes[..2], &probes[2..3]);
        }
    }

    // Phrases
    let mut phrases = Phrases::new(config.phrases.clone())?;
    phrases.learn(&corpus);
    let counts = count_phrases(&phrases, &corpus);
    if counts.is_empty() {
        logger.log_event(Level::Info, "Phrase detection", Some("no phrase above threshold"), None);
    }
    for (phrase, count) in counts.iter().take(10) {
        println!("{phrase}: {count}");
    }

    Ok(())
}
