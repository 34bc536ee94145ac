//! Runs the job runner against a shell script standing in for yt-dlp
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mediagrab::config::FallbackPaths;
use mediagrab::job::{JobEvent, JobRequest, JobRunner};
use mediagrab::tools::BinaryLocator;
use tokio::sync::mpsc;

fn install_fake_ytdlp(managed: &Path, body: &str) {
    let path = managed.join("yt-dlp");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn runner_for(managed: &Path) -> Arc<JobRunner> {
    Arc::new(JobRunner::new(BinaryLocator::new(
        managed.to_path_buf(),
        FallbackPaths::default(),
    )))
}

#[tokio::test]
async fn successful_job_reports_title_path_and_size() {
    let managed = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let media = out.path().join("Fake Title.mp4");
    install_fake_ytdlp(
        managed.path(),
        &format!(
            "echo 'Fake Title'\n\
             echo '[download]  50.0% of 1.00MiB at 1.00MiB/s ETA 00:01'\n\
             printf 'hello' > '{0}'\n\
             echo '{0}'",
            media.display()
        ),
    );

    let runner = runner_for(managed.path());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = runner
        .run(&JobRequest::new("https://example.com/v", out.path()), Some(tx))
        .await;

    assert!(result.success, "{}", result.message);
    assert!(!result.cancelled);
    assert_eq!(result.title.as_deref(), Some("Fake Title"));
    assert_eq!(result.output_path.as_deref(), Some(media.as_path()));
    assert_eq!(result.file_size_bytes, Some(5));
    assert_eq!(result.exit_code, Some(0));

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert!(events.iter().any(|e| matches!(e, JobEvent::Progress(p) if p.percent == 50.0)));
    assert_eq!(events.last(), Some(&JobEvent::Complete(result)));
    assert!(!runner.is_busy());
}

#[tokio::test]
async fn nonzero_exit_carries_output_tail() {
    let managed = tempfile::tempdir().unwrap();
    install_fake_ytdlp(
        managed.path(),
        "echo 'ERROR: Unsupported URL' >&2\nexit 2",
    );

    let runner = runner_for(managed.path());
    let result = runner
        .run(&JobRequest::new("https://example.com/nope", managed.path()), None)
        .await;

    assert!(!result.success);
    assert!(!result.cancelled);
    assert_eq!(result.exit_code, Some(2));
    assert!(result.message.contains("Unsupported URL"), "{}", result.message);
}

#[tokio::test]
async fn cancel_kills_job_and_second_job_is_rejected_meanwhile() {
    let managed = tempfile::tempdir().unwrap();
    install_fake_ytdlp(managed.path(), "echo 'Slow Title'\nexec sleep 30");

    let runner = runner_for(managed.path());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let job = {
        let runner = Arc::clone(&runner);
        let request = JobRequest::new("https://example.com/slow", managed.path());
        tokio::spawn(async move { runner.run(&request, Some(tx)).await })
    };

    // Wait until the script is running and has printed its title
    loop {
        match rx.recv().await {
            Some(JobEvent::Log(line)) if line == "Slow Title" => break,
            Some(_) => continue,
            None => panic!("job ended before producing output"),
        }
    }
    assert!(runner.is_busy());

    let rejected = runner
        .run(&JobRequest::new("https://example.com/other", managed.path()), None)
        .await;
    assert!(!rejected.success);
    assert!(rejected.message.contains("already running"), "{}", rejected.message);

    assert!(runner.cancel());
    let result = tokio::time::timeout(Duration::from_secs(10), job)
        .await
        .expect("cancelled job did not finish")
        .unwrap();

    assert!(result.cancelled);
    assert!(!result.success);
    assert_eq!(result.title.as_deref(), Some("Slow Title"));
    assert!(!runner.is_busy());
    assert!(!runner.cancel());
}

#[tokio::test]
async fn invalid_utf8_output_is_decoded_and_keeps_draining() {
    let managed = tempfile::tempdir().unwrap();
    // Far more output than a pipe buffer holds, after a byte that is not UTF-8
    install_fake_ytdlp(
        managed.path(),
        "printf 'bad \\377 name\\n'\n\
         printf 'warn \\377\\n' >&2\n\
         i=0\n\
         while [ $i -lt 20000 ]; do\n\
           echo \"[download] line $i of a long listing that fills the pipe\"\n\
           echo \"stderr line $i of a long listing that fills the pipe\" >&2\n\
           i=$((i+1))\n\
         done\n\
         exit 0",
    );

    let runner = runner_for(managed.path());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = tokio::time::timeout(
        Duration::from_secs(30),
        runner.run(&JobRequest::new("https://example.com/v", managed.path()), Some(tx)),
    )
    .await
    .expect("job stalled on undecodable output");

    assert!(result.success, "{}", result.message);
    assert_eq!(result.title.as_deref(), Some("bad \u{FFFD} name"));

    let mut logs = 0;
    let mut saw_stderr_replacement = false;
    while let Some(event) = rx.recv().await {
        if let JobEvent::Log(line) = event {
            logs += 1;
            saw_stderr_replacement |= line == "warn \u{FFFD}";
        }
    }
    assert!(saw_stderr_replacement);
    assert!(logs >= 40_000, "only {logs} log lines forwarded");
}

#[tokio::test]
async fn cancel_kills_job_after_its_output_closed() {
    let managed = tempfile::tempdir().unwrap();
    install_fake_ytdlp(
        managed.path(),
        "echo 'Detached Title'\nexec >&- 2>&-\nexec sleep 30",
    );

    let runner = runner_for(managed.path());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let job = {
        let runner = Arc::clone(&runner);
        let request = JobRequest::new("https://example.com/detached", managed.path());
        tokio::spawn(async move { runner.run(&request, Some(tx)).await })
    };

    loop {
        match rx.recv().await {
            Some(JobEvent::Log(line)) if line == "Detached Title" => break,
            Some(_) => continue,
            None => panic!("job ended before producing output"),
        }
    }
    // Let the runner reach the point where both pipes are closed
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(runner.cancel());
    let result = tokio::time::timeout(Duration::from_secs(10), job)
        .await
        .expect("cancel did not kill the process")
        .unwrap();

    assert!(result.cancelled);
    assert_eq!(result.title.as_deref(), Some("Detached Title"));
    assert!(!runner.is_busy());
}

#[tokio::test]
async fn missing_output_file_still_succeeds_with_zero_size() {
    let managed = tempfile::tempdir().unwrap();
    let gone = managed.path().join("Moved Away.mp4");
    install_fake_ytdlp(
        managed.path(),
        &format!("echo 'Moved Away'\necho '{}'", gone.display()),
    );

    let runner = runner_for(managed.path());
    let result = runner
        .run(&JobRequest::new("https://example.com/v", managed.path()), None)
        .await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.output_path.as_deref(), Some(gone.as_path()));
    assert_eq!(result.file_size_bytes, Some(0));
}
