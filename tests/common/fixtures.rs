//! Access-log corpora used across harnesses.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// One line in the `combined_timing` layout.
pub const COMBINED_LINE: &str =
    r#"127.0.0.1 - - [10/Nov/2023:13:55:36 +0000] "GET /api/test HTTP/1.1" 200 1024 0.012 0.020"#;

/// One line in the `nginx_upstream` layout.
pub const UPSTREAM_LINE: &str = r#"172.0.0.12 - - [04/Mar/2018:13:49:52 +0000] http "GET /foo?query=t HTTP/1.0" 200 2133 "-" "KeepAliveClient" "-" 1.005 1.854"#;

/// Well-formed `combined_timing` lines with varied methods, paths and codes.
pub const CORPUS_COMBINED: &[&str] = &[
    r#"10.0.0.1 - - [10/Nov/2023:13:55:36 +0000] "GET /api/test HTTP/1.1" 200 1024 0.012 0.020"#,
    r#"10.0.0.2 - - [10/Nov/2023:13:55:37 +0000] "POST /api/orders HTTP/1.1" 201 88 0.140 0.151"#,
    r#"10.0.0.3 - - [10/Nov/2023:13:55:37 +0000] "GET /static/app.js HTTP/2.0" 304 0 - 0.001"#,
    r#"10.0.0.4 - - [10/Nov/2023:13:55:38 +0000] "DELETE /api/orders/7 HTTP/1.1" 404 153 0.004 0.005"#,
    r#"10.0.0.5 - - [10/Nov/2023:13:55:39 +0000] "GET /healthz HTTP/1.1" 200 2 0.000 0.000"#,
    r#"10.0.0.6 - - [10/Nov/2023:13:55:40 +0000] "PUT /api/users/42 HTTP/1.1" 500 512 1.250 1.300"#,
];

/// Lines no layout can read.
pub const CORPUS_MALFORMED: &[&str] = &[
    "",
    "-",
    "GET /half",
    r#"10.0.0.9 - - [not a date +0000] "GET / HTTP/1.1" 200 1 0.1 0.1"#,
];

/// `n` distinct `combined_timing` lines, paths `/item/0` onwards.
pub fn combined_lines(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            format!(
                r#"10.1.0.{} - - [10/Nov/2023:13:55:{:02} +0000] "GET /item/{i} HTTP/1.1" 200 {} 0.010 0.020"#,
                i % 255,
                i % 60,
                100 + i
            )
        })
        .collect()
}

/// Append lines to `path`, each terminated by `\n`.
pub fn append_lines<S: AsRef<str>>(path: &Path, lines: &[S]) {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .expect("open log for append");
    for line in lines {
        writeln!(file, "{}", line.as_ref()).expect("append line");
    }
    file.flush().expect("flush log");
}

/// Poll `check` every 20ms until it holds or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// `GET /monitor` on a running server, decoded as JSON.
pub async fn get_monitor(addr: std::net::SocketAddr) -> serde_json::Value {
    reqwest::get(format!("http://{addr}/monitor"))
        .await
        .expect("monitor reachable")
        .error_for_status()
        .expect("monitor answered 200")
        .json()
        .await
        .expect("monitor body is JSON")
}
