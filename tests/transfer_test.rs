//! 送信・結果取得テスト
//!
//! ローカルに立てた簡易HTTPサーバーに対してプロトコルを検証

use mammo_deploy::error::DeployError;
use mammo_deploy::transfer::{fetch_results, http_client, package_store, PollOutcome, PollPolicy, ScoringClient, SessionId};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

/// サーバーが受け取ったリクエスト
#[derive(Debug)]
struct Recorded {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

/// 用意した応答を順番に1接続ずつ返すサーバー
fn serve(responses: Vec<(u16, &'static str)>) -> (String, Receiver<Recorded>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for (status, body) in responses {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let request = read_request(&mut reader);
            let _ = tx.send(request);

            let head = format!(
                "HTTP/1.1 {} Test\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(body.as_bytes());
            let _ = stream.flush();
        }
    });

    (format!("http://{}", addr), rx)
}

fn read_request(reader: &mut impl BufRead) -> Recorded {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let mut body = Vec::new();
    if let Some(length) = headers.get("content-length") {
        body.resize(length.parse().unwrap(), 0);
        reader.read_exact(&mut body).unwrap();
    } else if headers.get("transfer-encoding").map(|v| v.contains("chunked")) == Some(true) {
        loop {
            let mut size = String::new();
            reader.read_line(&mut size).unwrap();
            let size = usize::from_str_radix(size.trim(), 16).unwrap();
            let mut chunk = vec![0; size + 2];
            reader.read_exact(&mut chunk).unwrap();
            if size == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..size]);
        }
    }

    Recorded {
        method,
        path,
        headers,
        body,
    }
}

fn client(url: &str) -> ScoringClient {
    ScoringClient::new(url, "key-123", Duration::from_secs(5)).unwrap()
}

fn fast_policy(max_attempts: u32) -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(10),
        max_attempts,
    }
}

/// セッション開始は送信者をJSONで送りIDを受け取る
#[test]
fn test_open_session() {
    let (url, requests) = serve(vec![(200, "sess42\n")]);
    let session = client(&url).open_session().unwrap();
    assert_eq!(session, SessionId::new("sess42"));

    let request = requests.recv().unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/new");
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["sender"], "key-123");
}

/// `ERROR` で始まる本文はサーバーエラー
#[test]
fn test_open_session_error_body() {
    let (url, _requests) = serve(vec![(200, "ERROR: unknown sender")]);
    let err = client(&url).open_session().unwrap_err();
    assert!(matches!(err, DeployError::ServerError(ref body) if body.contains("unknown sender")));
}

/// 200以外は拒否
#[test]
fn test_open_session_rejected_status() {
    let (url, _requests) = serve(vec![(503, "busy")]);
    let err = client(&url).open_session().unwrap_err();
    assert!(matches!(err, DeployError::ServerRejected(_)));
}

/// 送信はヘッダーで認証し `zip_file` パートでZIPを送る
#[test]
fn test_submit_sends_session_headers_and_archive() {
    let (url, requests) = serve(vec![
        (200, "sess42"),
        (200, "http://results.example/out/sess42.zip\n"),
    ]);
    let dir = tempdir().unwrap();
    let archive = dir.path().join("x_upload.zip");
    std::fs::write(&archive, b"PK-archive-bytes").unwrap();

    let submission = client(&url).submit(&archive).unwrap();
    assert_eq!(submission.session_id.as_str(), "sess42");
    assert_eq!(submission.results_url, "http://results.example/out/sess42.zip");

    let _new = requests.recv().unwrap();
    let upload = requests.recv().unwrap();
    assert_eq!(upload.path, "/upload");
    assert_eq!(upload.headers.get("sessionid").map(String::as_str), Some("sess42"));
    assert_eq!(upload.headers.get("accesskey").map(String::as_str), Some("key-123"));
    assert!(upload.headers["content-type"].starts_with("multipart/form-data"));

    let body = String::from_utf8_lossy(&upload.body);
    assert!(body.contains("name=\"zip_file\""));
    assert!(body.contains("application/zip"));
    assert!(body.contains("PK-archive-bytes"));
}

/// 結果URLの形式によらず保存先は /new のセッションIDで決まる
#[test]
fn test_results_archive_named_by_session_from_new() {
    let (url, _requests) = serve(vec![
        (200, "sess42"),
        (200, "https://host/download?session=sess42"),
    ]);
    let dir = tempdir().unwrap();
    let archive = dir.path().join("x_upload.zip");
    std::fs::write(&archive, b"PK").unwrap();

    let submission = client(&url).submit(&archive).unwrap();
    assert_eq!(submission.session_id, SessionId::new("sess42"));
    assert_eq!(submission.results_archive(dir.path()), dir.path().join("sess42.zip"));
}

/// 未完了の間は再試行し、完了したら保存する
#[test]
fn test_fetch_results_retries_until_ready() {
    let (url, requests) = serve(vec![(404, ""), (404, ""), (200, "results-zip")]);
    let dir = tempdir().unwrap();
    let dest = dir.path().join("sess42.zip");

    let outcome = fetch_results(
        &http_client().unwrap(),
        &format!("{}/out/sess42.zip", url),
        &dest,
        &fast_policy(5),
    )
    .unwrap();

    assert_eq!(outcome, PollOutcome::Ready(dest.clone()));
    assert_eq!(std::fs::read(&dest).unwrap(), b"results-zip");
    assert_eq!(requests.try_iter().count(), 3);
}

/// 上限回数に達したら未完了を返す
#[test]
fn test_fetch_results_gives_up_after_max_attempts() {
    let (url, requests) = serve(vec![(404, ""), (404, ""), (404, "")]);
    let dir = tempdir().unwrap();
    let dest = dir.path().join("sess42.zip");

    let outcome = fetch_results(
        &http_client().unwrap(),
        &format!("{}/out/sess42.zip", url),
        &dest,
        &fast_policy(3),
    )
    .unwrap();

    assert_eq!(outcome, PollOutcome::NotReady);
    assert!(!dest.exists());
    assert_eq!(requests.try_iter().count(), 3);
}

/// サイズ超過のアーカイブは一時フォルダに残らない
#[test]
fn test_oversized_archive_is_removed() {
    let store = tempdir().unwrap();
    let scratch = tempdir().unwrap();
    std::fs::create_dir_all(store.path().join("aaaa1111")).unwrap();
    std::fs::write(store.path().join("aaaa1111/study_metadata.json"), vec![b'x'; 4096]).unwrap();

    let err = package_store(store.path(), scratch.path(), 16).unwrap_err();
    assert!(matches!(err, DeployError::ArchiveTooLarge { limit: 16, .. }));
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}
