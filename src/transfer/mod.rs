//! 送信プロトコル
//!
//! 前処理ストアをZIP化 → セッション開始 → アップロード → 結果のポーリング

pub mod archive;
pub mod client;

pub use archive::package_store;
pub use client::{fetch_results, http_client, PollOutcome, PollPolicy, ScoringClient, SessionId, Submission};
