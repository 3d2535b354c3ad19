//! 評価サーバーとの通信
//!
//! - `POST /new`    : セッションID取得
//! - `POST /upload` : ZIP送信、結果URL取得
//! - `GET <結果URL>` : 結果ZIPの取得（200以外は未完了として再試行）

use crate::error::{DeployError, Result};
use indicatif::ProgressBar;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde_json::json;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// サーバーが割り当てたセッションID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        SessionId(value.into())
    }

    /// 結果URLの末尾（`<session_id>.zip`）から復元
    pub fn from_results_url(url: &str) -> Result<Self> {
        let last = url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        let id = last.strip_suffix(".zip").unwrap_or(last);
        if id.is_empty() {
            return Err(DeployError::InvalidResultsUrl(url.to_string()));
        }
        Ok(SessionId(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 送信結果
#[derive(Debug, Clone)]
pub struct Submission {
    pub session_id: SessionId,
    pub results_url: String,
}

impl Submission {
    /// `--results-url` で再開する場合（IDはURL末尾から復元）
    pub fn resume(results_url: &str) -> Result<Self> {
        Ok(Self {
            session_id: SessionId::from_results_url(results_url)?,
            results_url: results_url.to_string(),
        })
    }

    /// 結果ZIPの保存先 `<output>/<session_id>.zip`
    pub fn results_archive(&self, output: &Path) -> PathBuf {
        output.join(format!("{}.zip", self.session_id))
    }
}

/// ポーリング設定（呼び出し時に固定）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Ready(PathBuf),
    /// 上限回数に達した（同じURLで後から再開できる）
    NotReady,
}

pub struct ScoringClient {
    http: Client,
    server_url: String,
    access_key: String,
    session_timeout: Duration,
}

impl ScoringClient {
    pub fn new(server_url: &str, access_key: &str, session_timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            server_url: server_url.trim_end_matches('/').to_string(),
            access_key: access_key.to_string(),
            session_timeout,
        })
    }

    /// セッションを開始
    pub fn open_session(&self) -> Result<SessionId> {
        let response = self
            .http
            .post(format!("{}/new", self.server_url))
            .json(&json!({ "sender": self.access_key }))
            .timeout(self.session_timeout)
            .send()
            .map_err(|e| DeployError::ServerRejected(e.to_string()))?;

        let body = accept(response, DeployError::ServerRejected)?;
        let session = SessionId::new(body.trim());
        debug!("セッションID: {}", session);
        Ok(session)
    }

    /// ZIPを送信して結果URLを受け取る
    pub fn upload(&self, session: &SessionId, archive: &Path) -> Result<String> {
        let part = Part::file(archive)?.mime_str("application/zip")?;
        let form = Form::new().part("zip_file", part);

        let response = self
            .http
            .post(format!("{}/upload", self.server_url))
            .header("SessionId", session.as_str())
            .header("AccessKey", self.access_key.as_str())
            .multipart(form)
            .send()
            .map_err(|e| DeployError::UploadFailed(e.to_string()))?;

        let body = accept(response, DeployError::UploadFailed)?;
        Ok(body.trim().to_string())
    }

    /// セッション開始から送信まで
    pub fn submit(&self, archive: &Path) -> Result<Submission> {
        let session_id = self.open_session()?;
        let results_url = self.upload(&session_id, archive)?;
        info!("送信完了: session={}", session_id);
        Ok(Submission {
            session_id,
            results_url,
        })
    }
}

/// 通信用クライアント（アップロードとポーリングはタイムアウトなし）
pub fn http_client() -> Result<Client> {
    Ok(Client::builder().timeout(None::<Duration>).build()?)
}

/// 200以外、または `ERROR` で始まる本文を失敗として扱う
fn accept(response: Response, on_status: fn(String) -> DeployError) -> Result<String> {
    let status = response.status();
    let body = response.text()?;
    if status != StatusCode::OK {
        return Err(on_status(format!("{}: {}", status, body)));
    }
    if body.starts_with("ERROR") {
        return Err(DeployError::ServerError(body));
    }
    Ok(body)
}

/// 結果ZIPが用意されるまでポーリングして保存する
///
/// 各試行は1回のGET。上限回数を超えたら `NotReady` を返す。
pub fn fetch_results(http: &Client, url: &str, dest: &Path, policy: &PollPolicy) -> Result<PollOutcome> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_message("結果を生成中です。お待ちください...");
    spinner.enable_steady_tick(Duration::from_millis(200));

    for attempt in 1..=policy.max_attempts {
        match http.get(url).send() {
            Ok(response) if response.status() == StatusCode::OK => {
                let bytes = response.bytes()?;
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(dest, &bytes)?;
                spinner.finish_and_clear();
                return Ok(PollOutcome::Ready(dest.to_path_buf()));
            }
            Ok(response) => {
                debug!("結果未完了 ({}/{}): {}", attempt, policy.max_attempts, response.status());
            }
            Err(e) => {
                warn!("結果の確認に失敗 ({}/{}): {}", attempt, policy.max_attempts, e);
            }
        }

        if attempt < policy.max_attempts {
            std::thread::sleep(policy.interval);
        }
    }

    spinner.finish_and_clear();
    Ok(PollOutcome::NotReady)
}
