use thiserror::Error;

fn gib(bytes: &u64) -> f64 {
    *bytes as f64 / (1u64 << 30) as f64
}

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("アクセスキーが設定されていません。`--access-key` を指定するか `mammo-deploy config --set-access-key KEY` で設定してください")]
    MissingAccessKey,

    #[error("サーバーURLが設定されていません。`--server-url` を指定するか `mammo-deploy config --set-server-url URL` で設定してください")]
    MissingServerUrl,

    #[error("入力パスが存在しません: {0}")]
    InputNotFound(String),

    #[error("前処理フォルダには新規または空のフォルダを指定してください: {0}")]
    PreprocessDirNotEmpty(String),

    #[error("DICOM読み込みエラー: {0}")]
    Dicom(String),

    #[error(
        "最大ファイルサイズを超えたためアップロードできません ({:.2} GB)。アップロードするデータを {:.2} GB 以下にしてください",
        gib(.size),
        gib(.limit)
    )]
    ArchiveTooLarge { size: u64, limit: u64 },

    #[error("サーバーに接続できないか、応答が不正です: {0}")]
    ServerRejected(String),

    #[error("サーバーがエラーを返しました: {0}")]
    ServerError(String),

    #[error("ファイルのアップロードに失敗しました: {0}")]
    UploadFailed(String),

    #[error("結果URLからセッションIDを取得できません: {0}")]
    InvalidResultsUrl(String),

    #[error("結果ファイルにテーブルがありません: {0}")]
    MissingResultTable(String),

    #[error("利用規約に同意しないと送信できません")]
    TermsDeclined,

    #[error("描画エラー: {0}")]
    Plot(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("CSVエラー: {0}")]
    Csv(#[from] csv::Error),

    #[error("ZIPエラー: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("HTTPエラー: {0}")]
    Http(#[from] reqwest::Error),

    #[error("フレーム保存エラー: {0}")]
    Npy(#[from] ndarray_npy::WriteNpyError),

    #[error("画像保存エラー: {0}")]
    Image(#[from] image::ImageError),

    #[error("入力エラー: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] mammo_deploy_common::Error),
}

pub type Result<T> = std::result::Result<T, DeployError>;
