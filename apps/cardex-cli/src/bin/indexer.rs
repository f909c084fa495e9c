use std::{env, path::PathBuf};

use indicatif::{ProgressBar, ProgressStyle};

use cardex_cli::{build_pipeline, init_tracing, load_records, vocab_path};
use cardex_core::config::Config;

fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;

    let args: Vec<String> = env::args().skip(1).collect();
    let mut records_path = None;
    for arg in &args {
        match arg.as_str() {
            "--help" | "-h" => {
                eprintln!("Usage: cardex-indexer <records.jsonl>");
                std::process::exit(0);
            }
            _ if !arg.starts_with('-') => records_path = Some(PathBuf::from(arg)),
            other => {
                eprintln!("Unknown flag: {}", other);
                std::process::exit(1);
            }
        }
    }
    let records_path = records_path.unwrap_or_else(|| {
        let p: String = config
            .get("data.records_path")
            .unwrap_or_else(|_| "data/cards.jsonl".to_string());
        PathBuf::from(p)
    });

    println!("cardex indexer\n==============");
    println!("Records file: {}", records_path.display());
    let records = load_records(&records_path)?;
    println!("Loaded {} records", records.len());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .expect("spinner template"),
    );
    pb.set_message("fusing and uploading...");
    pb.enable_steady_tick(std::time::Duration::from_millis(120));

    let mut pipeline = build_pipeline(&config)?;
    let summary =
        tokio::runtime::Runtime::new()?.block_on(async { pipeline.build_index(records).await })?;
    pb.finish_with_message("indexing completed");

    let vocab_file = vocab_path(&config);
    pipeline
        .vocabulary()
        .ok_or_else(|| anyhow::anyhow!("pipeline ready but vocabulary missing"))?
        .save(&vocab_file)?;

    println!("\n✅ Indexed {} records into '{}'", summary.indexed, summary.collection);
    if summary.duplicates_dropped > 0 {
        println!("📊 Dropped {} duplicate-text records", summary.duplicates_dropped);
    }
    println!("📊 Fused vector width: {}", summary.vector_width);
    println!("💾 Vocabulary saved to {}", vocab_file.display());
    println!("\n💡 To search, use: cargo run --bin cardex-search '<query>' {}", records_path.display());
    Ok(())
}
