use clap::Parser;
use lexicon::cli::{Cli, Commands};
use lexicon::config::Config;
use lexicon::error::Result;
use lexicon::{labeler, search};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load()?;

    match cli.command {
        Commands::Label {
            dir,
            output,
            base_url,
            model,
            max_concurrent,
            batch_size,
            limit,
        } => {
            println!("🏷 lexicon - 装備ラベリング\n");

            // CLIフラグは設定ファイルより優先
            if let Some(base_url) = base_url {
                config.base_url = base_url;
            }
            if let Some(model) = model {
                config.model = model;
            }
            if let Some(max_concurrent) = max_concurrent {
                config.max_concurrent = max_concurrent;
            }
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }

            let summary =
                labeler::label_directory(&config, &dir, &output, limit, cli.verbose).await?;

            println!(
                "\n✅ 完了: 記録 {}件（うちエラーつき {}件） / スキップ {}件",
                summary.recorded, summary.with_errors, summary.skipped
            );
        }

        Commands::Serve { csv, host, port } => {
            println!("🔍 lexicon - タグ検索API\n");
            search::serve(&csv, &host, port).await?;
        }

        Commands::Config { set_api_key, show } => {
            if let Some(key) = set_api_key {
                config.set_api_key(key)?;
                println!("✔ APIキーを設定しました");
            }

            if show {
                println!("設定:");
                println!("  ベースURL: {}", config.base_url);
                println!("  モデル: {}", config.model);
                println!("  並列数: {}", config.max_concurrent);
                println!("  バッチサイズ: {}", config.batch_size);
                println!(
                    "  APIキー: {}",
                    if config.api_key().is_some() { "設定済み" } else { "未設定" }
                );
            }
        }
    }

    Ok(())
}
