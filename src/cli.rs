use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lexicon")]
#[command(about = "装備画像AI自動ラベリング・タグ検索ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 装備ディレクトリを一括ラベリングしてCSVに追記
    Label {
        /// 画像ルートディレクトリ（「装備名_装備ID」サブディレクトリを含む）
        #[arg(required = true)]
        dir: PathBuf,

        /// 出力CSVファイル
        #[arg(short, long, default_value = "equipment_labels.csv")]
        output: PathBuf,

        /// APIベースURL（省略時は設定ファイルの値）
        #[arg(long)]
        base_url: Option<String>,

        /// モデル名（省略時は設定ファイルの値）
        #[arg(short, long)]
        model: Option<String>,

        /// 同時API呼び出し数の上限（1で逐次実行）
        #[arg(short = 'c', long)]
        max_concurrent: Option<usize>,

        /// CSVフラッシュのバッチサイズ（1で1件ごとに書き込み）
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// 処理する装備数の上限（動作確認用）
        #[arg(long)]
        limit: Option<usize>,
    },

    /// ラベリング済みCSVを読み込んでタグ検索APIを起動
    Serve {
        /// 装備ラベルCSVファイル
        #[arg(short, long, default_value = "equipment_labels.csv")]
        csv: PathBuf,

        /// 待ち受けアドレス
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// 待ち受けポート
        #[arg(short, long, default_value = "9000")]
        port: u16,
    },

    /// 設定を表示/編集
    Config {
        /// APIキーを設定
        #[arg(long)]
        set_api_key: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}
