use clap::Parser;
use dialoguer::Confirm;
use mammo_deploy::{cli, config, error, ingest, plot, reconcile, scanner, scratch, transfer};
use cli::{Cli, Commands, YesNo};
use config::Config;
use error::{DeployError, Result};
use ingest::{DicomFileReader, FrameStore};
use scratch::{PreprocessDir, ScratchRegistry};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use transfer::{PollOutcome, ScoringClient, Submission};

/// `run` サブコマンドの引数
struct RunArgs {
    input: PathBuf,
    output: PathBuf,
    access_key: Option<String>,
    server_url: Option<String>,
    preprocess_dir: Option<PathBuf>,
    results_url: Option<String>,
    plot_images: Option<YesNo>,
    yes: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = Config::load()?;

    match cli.command {
        Commands::Run { input, output, access_key, server_url, preprocess_dir, results_url, plot_images, yes } => {
            println!("🩺 mammo-deploy - 匿名化・リモート評価\n");

            let args = RunArgs { input, output, access_key, server_url, preprocess_dir, results_url, plot_images, yes };
            let registry = ScratchRegistry::new();
            let worker_registry = registry.clone();
            let task = tokio::task::spawn_blocking(move || run(args, &config, &worker_registry));

            tokio::select! {
                joined = task => {
                    joined??;
                }
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("\n⚠ 中断されました。一時ファイルを削除します...");
                    registry.purge();
                    std::process::exit(130);
                }
            }
        }

        Commands::Plot { results, output } => {
            println!("🖼 mammo-deploy - 結果画像の生成\n");

            let outcomes = reconcile::read_image_outcomes(&results)?;
            let written = plot::plot_results(&outcomes, &output, &DicomFileReader)?;
            println!("✔ {}枚の画像を保存: {}", written.len(), output.display());
        }

        Commands::Config { set_access_key, set_server_url, show } => {
            let mut config = config;

            if let Some(key) = set_access_key {
                config.set_access_key(key)?;
                println!("✔ アクセスキーを設定しました");
            }

            if let Some(url) = set_server_url {
                config.set_server_url(url)?;
                println!("✔ サーバーURLを設定しました");
            }

            if show {
                println!("設定:");
                println!("  サーバーURL: {}", config.server_url.as_deref().unwrap_or("未設定"));
                println!("  アクセスキー: {}", if config.access_key.is_some() { "設定済み" } else { "未設定" });
                println!("  最大アップロードサイズ: {} bytes", config.max_archive_bytes);
                println!("  最大スタディ数: {}", config.max_studies);
                println!("  最大画像数: {}", config.max_images);
                println!("  ポーリング: {}秒間隔 / 最大{}回", config.poll_interval_seconds, config.poll_max_attempts);
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// 前処理 → 送信 → 結果取得 → パス復元
fn run(args: RunArgs, config: &Config, registry: &ScratchRegistry) -> Result<()> {
    if !args.input.exists() {
        return Err(DeployError::InputNotFound(args.input.display().to_string()));
    }
    let input = args.input.canonicalize()?;
    std::fs::create_dir_all(&args.output)?;

    let submission = match &args.results_url {
        Some(url) => {
            println!("[1/4] 前処理・送信は省略します（結果URL指定）\n");
            Submission::resume(url)?
        }
        None => match submit_input(&input, &args, config, registry)? {
            Some(submission) => submission,
            None => return Ok(()),
        },
    };
    let results_url = &submission.results_url;

    println!("[3/4] 評価結果を待っています...");
    let dest = submission.results_archive(&args.output);
    let http = transfer::http_client()?;

    let results_zip = match transfer::fetch_results(&http, results_url, &dest, &config.poll_policy())? {
        PollOutcome::Ready(path) => path,
        PollOutcome::NotReady => {
            println!("⚠ 評価がまだ完了していません。しばらくしてから以下で再実行してください:");
            println!("  mammo-deploy run --input {} --output {} --results-url {}", input.display(), args.output.display(), results_url);
            return Ok(());
        }
    };
    println!("✔ 結果を受信\n");

    println!("[4/4] 結果を元のパスに戻しています...");
    let reconciled = reconcile::unhash_results(&results_zip, &input, &args.output)?;
    std::fs::remove_file(&results_zip)?;
    println!("✔ スタディ結果: {}", reconciled.study_csv.display());
    println!("✔ 画像結果: {}", reconciled.image_csv.display());

    if wants_plots(args.plot_images)? {
        let plot_dir = args.output.join(reconciled.session_id.as_str());
        let written = plot::plot_results(&reconciled.images, &plot_dir, &DicomFileReader)?;
        println!("✔ {}枚の結果画像を保存: {}", written.len(), plot_dir.display());
    }

    println!("\n✅ 完了");
    Ok(())
}

/// 前処理して送信する（有効な画像がなければ `None`）
fn submit_input(input: &Path, args: &RunArgs, config: &Config, registry: &ScratchRegistry) -> Result<Option<Submission>> {
    let access_key = config.access_key(args.access_key.as_deref())?;
    let server_url = config.server_url(args.server_url.as_deref())?;

    println!("[1/4] DICOMを前処理中...");
    let preprocess = PreprocessDir::create(args.preprocess_dir.as_deref(), registry)?;
    let layout = scanner::scan_input(input)?;
    let store = FrameStore::new(preprocess.path());
    let summary = ingest::ingest_input(&layout, &store, &DicomFileReader, &config.ingest_limits())?;

    if summary.is_empty() {
        println!("⚠ 評価できるDICOMが見つかりませんでした: {}", input.display());
        return Ok(None);
    }
    println!(
        "✔ {}スタディ / {}画像を前処理（スキップ {}件）",
        summary.studies.len(),
        summary.images,
        summary.skipped
    );
    if summary.truncated {
        println!("⚠ 上限に達したため一部のスタディは送信されません");
    }
    if preprocess.is_kept() {
        println!("  前処理ファイル: {}", preprocess.path().display());
    }
    println!();

    println!("[2/4] 送信中...");
    let archive = transfer::package_store(store.root(), &std::env::temp_dir(), config.max_archive_bytes)?;
    registry.register(archive.path());

    let submitted = confirm_terms(args.yes).and_then(|_| {
        let client = ScoringClient::new(&server_url, &access_key, config.session_timeout())?;
        client.submit(archive.path())
    });

    // 送信の成否にかかわらず一時ファイルは消す
    registry.unregister(archive.path());
    drop(archive);
    drop(preprocess);

    let submission = submitted?;
    println!("✔ 送信完了");
    println!("  結果URL: {}\n", submission.results_url);
    Ok(Some(submission))
}

fn confirm_terms(skip: bool) -> Result<()> {
    if skip {
        return Ok(());
    }
    println!("送信されるのは匿名化した画素データと撮影情報のみです。");
    println!("元のファイルパスや患者情報はサーバーに送られません。");
    let agreed = Confirm::new()
        .with_prompt("利用規約に同意して送信しますか？")
        .default(false)
        .interact()?;
    if agreed {
        Ok(())
    } else {
        Err(DeployError::TermsDeclined)
    }
}

fn wants_plots(answer: Option<YesNo>) -> Result<bool> {
    match answer {
        Some(answer) => Ok(answer.is_yes()),
        None => Ok(Confirm::new()
            .with_prompt("所見のボックスを描いた画像を生成しますか？")
            .default(false)
            .interact()?),
    }
}
