use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mammo-deploy")]
#[command(about = "マンモグラフィ画像を匿名化してリモート評価し、結果を元のパスに戻すツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 前処理・送信・結果取得・パス復元を一括実行
    Run {
        /// DICOMファイル、スタディフォルダ、またはスタディフォルダを含むフォルダ
        #[arg(short, long, required = true)]
        input: PathBuf,

        /// 結果の出力フォルダ
        #[arg(short, long, required = true)]
        output: PathBuf,

        /// アクセスキー（省略時は環境変数/設定ファイル）
        #[arg(long)]
        access_key: Option<String>,

        /// サーバーURL（省略時は環境変数/設定ファイル）
        #[arg(long)]
        server_url: Option<String>,

        /// 前処理ファイルを保存するフォルダ（指定すると削除しない）
        #[arg(long)]
        preprocess_dir: Option<PathBuf>,

        /// 以前の送信で得た結果URL（結果の取得だけを行う）
        #[arg(long)]
        results_url: Option<String>,

        /// 結果画像を生成するか (y/n)。省略時は確認する
        #[arg(long)]
        plot_images: Option<YesNo>,

        /// 利用規約の確認を省略
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// 画像単位の結果CSVからボックス付き画像を生成
    Plot {
        /// 結果CSV（file_path, x1, y1, x2, y2, slice, score）
        #[arg(short, long, required = true)]
        results: PathBuf,

        /// 画像の出力フォルダ
        #[arg(short, long, required = true)]
        output: PathBuf,
    },

    /// 設定を表示/編集
    Config {
        /// アクセスキーを設定
        #[arg(long)]
        set_access_key: Option<String>,

        /// サーバーURLを設定
        #[arg(long)]
        set_server_url: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum YesNo {
    Yes,
    No,
}

impl YesNo {
    pub fn is_yes(&self) -> bool {
        matches!(self, YesNo::Yes)
    }
}

impl std::str::FromStr for YesNo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().trim() {
            "y" | "yes" => Ok(YesNo::Yes),
            "n" | "no" => Ok(YesNo::No),
            _ => Err(format!("Unknown answer: {}. Use y or n", s)),
        }
    }
}
