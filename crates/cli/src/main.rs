use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use agrosense_rag::{
    advise, EmbeddingClient, EmbeddingSettings, IndexSource, KnowledgeConfig, KnowledgeIndex,
};

mod config;
mod render;
mod validate;

use config::{load_config, resolve_embedding, resolve_knowledge, PathOverrides, DEFAULT_CONFIG};
use validate::SoilForm;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "agrosense", version = VERSION, about = "Soil-aware crop advisory over a local knowledge index")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,
    #[arg(long, global = true)]
    index: Option<PathBuf>,
    #[arg(long, global = true)]
    embeddings: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load or build the knowledge artifacts and report on them
    Index {
        #[arg(long, action = ArgAction::SetTrue)]
        rebuild: bool,
    },
    /// Rank knowledge chunks against free text
    Query {
        text: String,
        #[arg(long = "top-k")]
        top_k: Option<usize>,
        #[arg(long)]
        soil: Option<String>,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Validate a soil reading and print crop and care advice
    Recommend {
        #[arg(long = "soil-type")]
        soil_type: String,
        #[arg(long)]
        moisture: String,
        #[arg(long)]
        organic: String,
        #[arg(long)]
        n: String,
        #[arg(long)]
        p: String,
        #[arg(long)]
        k: String,
        #[arg(long)]
        season: String,
        #[arg(long = "top-k")]
        top_k: Option<usize>,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let file_config = load_config(&config_path)?;

    let overrides = PathOverrides {
        corpus: cli.corpus.clone(),
        index: cli.index.clone(),
        embeddings: cli.embeddings.clone(),
    };
    let knowledge = resolve_knowledge(
        KnowledgeConfig::from_env(),
        file_config.knowledge.as_ref(),
        &overrides,
    );
    let embedding = resolve_embedding(
        EmbeddingSettings::from_env(),
        file_config.embedding.as_ref(),
    )?;
    let client = EmbeddingClient::from_settings(&embedding)?;

    match cli.command {
        Commands::Index { rebuild } => {
            let index = if rebuild {
                KnowledgeIndex::rebuild(&knowledge, client)?
            } else {
                KnowledgeIndex::initialize(&knowledge, client)?
            };
            let source = match index.source() {
                IndexSource::Loaded => "loaded",
                IndexSource::Built => "built",
            };
            println!("chunks: {}", index.len());
            println!("dimensions: {}", index.dimensions());
            println!("model: {}", index.model_id());
            println!("index: {} ({source})", knowledge.index_path.display());
            println!("embeddings: {}", knowledge.embeddings_path.display());
        }
        Commands::Query {
            text,
            top_k,
            soil,
            json,
        } => {
            let index = KnowledgeIndex::initialize(&knowledge, client)?;
            let top_k = top_k.unwrap_or(knowledge.top_k);
            let results = index.query_scored(&text, top_k, soil.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print!("{}", render::ranked_chunks_text(&results));
            }
        }
        Commands::Recommend {
            soil_type,
            moisture,
            organic,
            n,
            p,
            k,
            season,
            top_k,
            json,
        } => {
            let form = SoilForm {
                soil_type,
                moisture,
                organic,
                n,
                p,
                k,
                season,
            };
            let soil = form.validate()?;
            let index = KnowledgeIndex::initialize(&knowledge, client)?;
            let advice = advise(&index, &soil, top_k.unwrap_or(knowledge.top_k))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&advice)?);
            } else {
                print!("{}", render::recommendation_text(&advice.recommendation));
            }
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn recommend_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "agrosense",
            "recommend",
            "--soil-type",
            "sandy",
            "--moisture",
            "low",
            "--organic",
            "poor",
            "--n",
            "20",
            "--p",
            "low",
            "--k",
            "50",
            "--season",
            "kharif",
            "--corpus",
            "data/chunks.json",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.corpus, Some(PathBuf::from("data/chunks.json")));
        match cli.command {
            Commands::Recommend {
                soil_type,
                json,
                top_k,
                ..
            } => {
                assert_eq!(soil_type, "sandy");
                assert!(json);
                assert_eq!(top_k, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn recommend_requires_every_field() {
        let err = Cli::try_parse_from(["agrosense", "recommend", "--soil-type", "clay"]);
        assert!(err.is_err());
    }
}
