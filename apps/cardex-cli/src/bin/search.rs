use std::{env, path::PathBuf};

use cardex_cli::{build_pipeline, init_tracing, load_records, vocab_path};
use cardex_core::config::Config;
use cardex_fuse::Vocabulary;

fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::load()?;

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <query> [records.jsonl]", args[0]);
        eprintln!("Example: {} 'counter target spell' data/cards.jsonl", args[0]);
        std::process::exit(1);
    }
    let query_text = &args[1];
    let records_path = args.get(2).map(PathBuf::from).unwrap_or_else(|| {
        let p: String = config
            .get("data.records_path")
            .unwrap_or_else(|_| "data/cards.jsonl".to_string());
        PathBuf::from(p)
    });
    let top_k: usize = config.get("search.top_k").unwrap_or(10);
    let popularity_field: Option<String> = config.get("search.popularity_field").ok();

    println!("🔍 cardex search\n===============");
    println!("Query: {}", query_text);

    let records = load_records(&records_path)?;
    let vocab = Vocabulary::load(&vocab_path(&config))?;
    let mut pipeline = build_pipeline(&config)?;

    let results = tokio::runtime::Runtime::new()?.block_on(async {
        pipeline.attach(records, vocab).await?;
        pipeline
            .search(query_text, top_k, popularity_field.as_deref())
            .await
    })?;

    println!("\n🔍 Found {} results for: \"{}\"", results.len(), query_text);
    for (i, hit) in results.iter().enumerate() {
        println!("\n  {}. score={:.4}  {}", i + 1, hit.score, hit.name);
        println!("     📝 {}", hit.text);
        if let Some(rank) = hit.popularity {
            println!("     ⭐ popularity rank {}", rank);
        }
    }
    Ok(())
}
