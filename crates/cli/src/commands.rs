//! Subcommand implementations.
//!
//! Every invocation builds a fresh supervisor over the file store in the
//! configured state directory. Runs started by an earlier invocation have
//! no live handle here, so `stop` reaches them through their recorded pid.

use color_eyre::eyre::{eyre, Result, WrapErr};
use colored::{ColoredString, Colorize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use sv_core::access::InMemoryScriptCatalog;
use sv_core::config::loader::load_config;
use sv_core::relay::ChannelSink;
use sv_core::sse;
use sv_core::store::FileProcessStore;
use sv_core::Supervisor;
use sv_protocol::config_models::SupervisorConfig;
use sv_protocol::ipc::StreamEvent;
use sv_protocol::process_models::{ProcessRecord, ProcessStatus};
use sv_protocol::script_models::{ScriptSource, ScriptType};
use tokio_stream::StreamExt;
use tracing::debug;
use uuid::Uuid;

use crate::cli::OutputFormat;

/// The single user of a local installation.
pub const LOCAL_USER: Uuid = Uuid::from_u128(1);

/// Exit code reported when a run is interrupted with Ctrl-C.
const INTERRUPTED: u8 = 130;

pub struct Context {
    config: SupervisorConfig,
    supervisor: Supervisor,
    catalog: Arc<InMemoryScriptCatalog>,
}

impl Context {
    pub async fn load(root: &Path) -> Result<Self> {
        let config = load_config(root)?;
        let store = FileProcessStore::open(&config.state_dir)
            .await
            .wrap_err_with(|| {
                format!("cannot open process store at {}", config.state_dir.display())
            })?;
        let catalog = Arc::new(InMemoryScriptCatalog::new());
        let supervisor = Supervisor::new(&config, Arc::new(store), catalog.clone());

        debug!(state_dir = %config.state_dir.display(), "supervisor ready");
        Ok(Self {
            config,
            supervisor,
            catalog,
        })
    }
}

/// Run a script file and relay its output until the `end` event.
pub async fn run(
    ctx: &Context,
    file: &Path,
    script_type: Option<String>,
    format: OutputFormat,
    args: &[String],
) -> Result<ExitCode> {
    let path =
        std::fs::canonicalize(file).wrap_err_with(|| format!("cannot find {}", file.display()))?;
    let content = std::fs::read_to_string(&path)
        .wrap_err_with(|| format!("cannot read {}", path.display()))?;
    let script_type = match script_type {
        Some(t) => t,
        None => infer_script_type(&path)
            .map(|t| t.to_string())
            .ok_or_else(|| {
                eyre!("cannot infer the script type of {}; pass --type", path.display())
            })?,
    };

    let script = ScriptSource {
        id: script_id_for(&path),
        owner_id: LOCAL_USER,
        name: display_name(&path),
        content,
        script_type,
    };
    let script_id = script.id;
    ctx.catalog.insert(script).await;

    let record = ctx.supervisor.run_script(LOCAL_USER, script_id, args).await?;
    if format == OutputFormat::Text {
        eprintln!("{} {}", "process".dimmed(), record.id.to_string().cyan());
    }

    let (sink, mut stream) = ChannelSink::pair(record.id, ctx.config.channel_capacity);
    let relay = ctx.supervisor.attach(record.id, sink).await?;

    let mut code = ExitCode::FAILURE;
    loop {
        tokio::select! {
            event = stream.next() => match event {
                Some(event) => {
                    if let StreamEvent::End { status, exit_code, .. } = &event {
                        code = exit_code_for(*status, *exit_code);
                    }
                    print_event(format, &event)?;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                eprintln!("{} stopping {}", "interrupted,".yellow(), record.id);
                // Dropping the stream is a disconnect; the relay stops the run.
                drop(stream);
                relay.await?;
                return Ok(ExitCode::from(INTERRUPTED));
            }
        }
    }

    relay.await?;
    Ok(code)
}

pub async fn stop(ctx: &Context, process_id: Uuid) -> Result<ExitCode> {
    ctx.supervisor.stop_process(LOCAL_USER, process_id).await?;
    println!("{} {}", "stopped".yellow(), process_id);
    Ok(ExitCode::SUCCESS)
}

pub async fn list(ctx: &Context, json: bool) -> Result<ExitCode> {
    let records = ctx.supervisor.list_processes(LOCAL_USER).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(ExitCode::SUCCESS);
    }

    if records.is_empty() {
        println!("{}", "no processes".dimmed());
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{:<36}  {:<8}  {:>7}  {:>5}  {}",
        "ID".bold(),
        "STATUS".bold(),
        "PID".bold(),
        "EXIT".bold(),
        "STARTED".bold()
    );
    for record in &records {
        print_row(record);
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn show(ctx: &Context, process_id: Uuid) -> Result<ExitCode> {
    let record = ctx.supervisor.get_process(LOCAL_USER, process_id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(ExitCode::SUCCESS)
}

fn print_row(record: &ProcessRecord) {
    let pid = record.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
    let exit = record.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string());
    // Pad before coloring: escape codes would break the column width.
    let status = colored_status(record.status, &format!("{:<8}", record.status.as_str()));
    println!(
        "{:<36}  {}  {:>7}  {:>5}  {}",
        record.id,
        status,
        pid,
        exit,
        record.start_time.format("%Y-%m-%d %H:%M:%S")
    );
}

fn print_event(format: OutputFormat, event: &StreamEvent) -> Result<()> {
    let mut out = std::io::stdout().lock();
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(event)?)?,
        OutputFormat::Sse => write!(out, "{}", sse::encode(event))?,
        OutputFormat::Text => match event {
            StreamEvent::Stdout { text } => writeln!(out, "{text}")?,
            StreamEvent::Stderr { text } => eprintln!("{}", text.red()),
            StreamEvent::End {
                status,
                exit_code,
                error,
            } => {
                let code = exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string());
                eprintln!(
                    "{} {} (exit code {})",
                    "finished".bold(),
                    colored_status(*status, status.as_str()),
                    code
                );
                if !error.is_empty() && *status != ProcessStatus::Success {
                    eprintln!("{}", error.dimmed());
                }
            }
        },
    }
    out.flush()?;
    Ok(())
}

fn colored_status(status: ProcessStatus, text: &str) -> ColoredString {
    match status {
        ProcessStatus::Running => text.cyan(),
        ProcessStatus::Success => text.green(),
        ProcessStatus::Stopped => text.yellow(),
        ProcessStatus::Failed | ProcessStatus::Error => text.red(),
    }
}

/// Process exit code mirroring the script's own where possible.
fn exit_code_for(status: ProcessStatus, exit_code: Option<i32>) -> ExitCode {
    match (status, exit_code) {
        (ProcessStatus::Success, _) => ExitCode::SUCCESS,
        (ProcessStatus::Failed, Some(code)) => u8::try_from(code)
            .ok()
            .filter(|c| *c != 0)
            .map(ExitCode::from)
            .unwrap_or(ExitCode::FAILURE),
        _ => ExitCode::FAILURE,
    }
}

fn infer_script_type(path: &Path) -> Option<ScriptType> {
    match path.extension()?.to_str()? {
        "py" => Some(ScriptType::Python),
        "go" => Some(ScriptType::Golang),
        "sh" => Some(ScriptType::Shell),
        _ => None,
    }
}

/// Stable script id: the same file always maps to the same script, so a
/// second concurrent run of it is rejected.
fn script_id_for(path: &Path) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, path.to_string_lossy().as_bytes())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Root used when `--root` is not given.
pub fn default_root() -> Result<PathBuf> {
    std::env::current_dir().wrap_err("cannot determine the current directory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_script_type() {
        assert_eq!(infer_script_type(Path::new("a/job.py")), Some(ScriptType::Python));
        assert_eq!(infer_script_type(Path::new("main.go")), Some(ScriptType::Golang));
        assert_eq!(infer_script_type(Path::new("run.sh")), Some(ScriptType::Shell));
        assert_eq!(infer_script_type(Path::new("README")), None);
    }

    #[test]
    fn test_script_id_is_stable_per_path() {
        let a = script_id_for(Path::new("/work/a.sh"));
        assert_eq!(a, script_id_for(Path::new("/work/a.sh")));
        assert_ne!(a, script_id_for(Path::new("/work/b.sh")));
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_code_for(ProcessStatus::Success, Some(0)), ExitCode::SUCCESS);
        assert_eq!(exit_code_for(ProcessStatus::Failed, Some(7)), ExitCode::from(7));
        assert_eq!(exit_code_for(ProcessStatus::Failed, Some(-1)), ExitCode::FAILURE);
        assert_eq!(exit_code_for(ProcessStatus::Stopped, Some(-1)), ExitCode::FAILURE);
    }
}
