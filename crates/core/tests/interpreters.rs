//! Runs that need real interpreters installed.
//!
//! Enabled with `--features integration-tests`.

#![cfg(feature = "integration-tests")]

mod common;

use common::*;
use sv_protocol::process_models::ProcessStatus;
use tokio_stream::StreamExt;

#[tokio::test]
async fn test_python_script() {
    let h = harness();
    let script_id = h
        .add_script("python", "import sys\nprint('from python')\nprint(sys.argv[1])\n")
        .await;

    let args = vec!["arg".to_string()];
    let record = h.supervisor.run_script(h.owner, script_id, &args).await.unwrap();
    let events = collect_events(h.supervisor.stream_output(record.id).await.unwrap()).await;

    assert_eq!(stdout_lines(&events), vec!["from python".to_string(), "arg".to_string()]);
    let (status, exit_code, _) = assert_single_end(&events);
    assert_eq!(status, ProcessStatus::Success);
    assert_eq!(exit_code, Some(0));
}

#[tokio::test]
async fn test_golang_script() {
    let h = harness();
    let source = "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"from go\")\n}\n";
    let script_id = h.add_script("golang", source).await;

    let record = h.supervisor.run_script(h.owner, script_id, &[]).await.unwrap();
    // `go run` compiles first, which can take longer than the default wait.
    let stream = h.supervisor.stream_output(record.id).await.unwrap();
    let events: Vec<_> = with_timeout(120, stream.collect()).await;

    assert_eq!(stdout_lines(&events), vec!["from go".to_string()]);
    let (status, _, _) = assert_single_end(&events);
    assert_eq!(status, ProcessStatus::Success);
}
