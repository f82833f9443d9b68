use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use habitkit_client::{ClientConfig, HabiticaClient};
use habitkit_core::{
    ActionRequest, KeepTasks, ScoreDirection, Snapshot, TaskStatus, TaskType,
};
use habitkit_store::{ActionExecutor, DataStore, RefreshOutcome};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "habitctl", version, about = "Inspect and act on a Habitica account")]
struct Args {
    /// TOML file with `user_id`, `api_token` and optional client settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = "HABITICA_USER_ID")]
    user_id: Option<String>,

    #[arg(long, global = true, env = "HABITICA_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    #[arg(long, global = true, env = "HABITICA_BASE_URL")]
    base_url: Option<String>,

    /// Request ceiling per minute.
    #[arg(long, global = true)]
    rpm: Option<u32>,

    /// Log filter, e.g. `debug` or `habitkit_client=debug`.
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Fetch everything and print a summary.
    Refresh,
    /// List tasks, optionally filtered by kind and status.
    Tasks {
        #[arg(long)]
        kind: Option<TaskType>,
        #[arg(long)]
        status: Option<TaskStatus>,
    },
    /// Tags not referenced by any task.
    UnusedTags,
    /// Toggle resting in the inn.
    Sleep,
    Score {
        task: String,
        #[arg(long)]
        down: bool,
    },
    /// Score one checklist item.
    Check { task: String, item: String },
    LeaveChallenge {
        id: String,
        /// Delete the challenge's tasks instead of keeping them.
        #[arg(long)]
        remove_tasks: bool,
    },
    DeleteTag { id: String },
    /// Unlink a task from its (broken) challenge.
    Unlink {
        task: String,
        #[arg(long)]
        remove: bool,
    },
    Cast {
        spell: String,
        #[arg(long)]
        target: Option<String>,
    },
    BuyPotion,
}

impl Cmd {
    fn action(&self) -> Option<ActionRequest> {
        let keep = |remove: bool| if remove { KeepTasks::Remove } else { KeepTasks::Keep };
        Some(match self {
            Cmd::Refresh | Cmd::Tasks { .. } | Cmd::UnusedTags => return None,
            Cmd::Sleep => ActionRequest::ToggleSleep,
            Cmd::Score { task, down } => ActionRequest::ScoreTask {
                task_id: task.clone(),
                direction: if *down { ScoreDirection::Down } else { ScoreDirection::Up },
            },
            Cmd::Check { task, item } => ActionRequest::ScoreChecklistItem {
                task_id: task.clone(),
                item_id: item.clone(),
            },
            Cmd::LeaveChallenge { id, remove_tasks } => ActionRequest::LeaveChallenge {
                challenge_id: id.clone(),
                keep: keep(*remove_tasks),
            },
            Cmd::DeleteTag { id } => ActionRequest::DeleteTag { tag_id: id.clone() },
            Cmd::Unlink { task, remove } => ActionRequest::UnlinkTask {
                task_id: task.clone(),
                keep: keep(*remove),
            },
            Cmd::Cast { spell, target } => ActionRequest::CastSkill {
                spell_id: spell.clone(),
                target_id: target.clone(),
            },
            Cmd::BuyPotion => ActionRequest::BuyHealthPotion,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_new(&args.log).context("parse --log filter")?)
        .init();

    let config = build_config(&args)?;
    let api = HabiticaClient::new(&config).context("build http client")?;
    let store = Arc::new(DataStore::new(Arc::new(api)));

    let outcome = store.refresh().await;
    let Some(snapshot) = store.get_snapshot() else {
        bail!("initial refresh failed: {}", describe_failure(&outcome));
    };

    let out = match &args.cmd {
        Cmd::Refresh => json!({
            "outcome": outcome_json(&outcome),
            "summary": summary(&snapshot),
        }),
        Cmd::Tasks { kind, status } => {
            let mut tasks: Vec<_> = snapshot
                .tasks
                .values()
                .filter(|t| kind.map_or(true, |k| t.kind == k))
                .filter(|t| status.map_or(true, |s| t.status == Some(s)))
                .collect();
            tasks.sort_by(|a, b| (a.kind, a.status, &a.text).cmp(&(b.kind, b.status, &b.text)));
            serde_json::to_value(tasks)?
        }
        Cmd::UnusedTags => serde_json::to_value(snapshot.unused_tags())?,
        cmd => {
            let Some(request) = cmd.action() else {
                bail!("no action for {cmd:?}");
            };
            info!(action = request.name(), "sending action");
            let done = ActionExecutor::new(Arc::clone(&store))
                .perform_action(request)
                .await
                .context("perform action")?;
            let action = done.request.name();
            let payload = done.payload.value().cloned().unwrap_or(Value::Null);
            let patched = done.patched;
            let reconcile = done.reconciled().await;
            json!({
                "action": action,
                "result": payload,
                "patched": patched,
                "reconcile": reconcile.as_ref().map(outcome_json),
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Config file first, then flags and environment on top.
fn build_config(args: &Args) -> anyhow::Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load_from(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => {
            let (Some(user_id), Some(token)) = (&args.user_id, &args.api_token) else {
                bail!("set --user-id and --api-token (or HABITICA_USER_ID / HABITICA_API_TOKEN), or pass --config");
            };
            ClientConfig::new(user_id.clone(), token.clone())
        }
    };
    if args.config.is_some() {
        if let Some(user_id) = &args.user_id {
            config.user_id = user_id.clone();
        }
        if let Some(token) = &args.api_token {
            config.api_token = token.clone();
        }
    }
    if let Some(url) = &args.base_url {
        config.base_url = url.clone();
    }
    if let Some(rpm) = args.rpm {
        config.requests_per_minute = rpm;
    }
    config.validate().context("invalid client config")?;
    Ok(config)
}

fn describe_failure(outcome: &RefreshOutcome) -> String {
    match &outcome.failure {
        Some(failure) => failure.to_string(),
        None => format!("{:?}", outcome.status),
    }
}

fn outcome_json(outcome: &RefreshOutcome) -> Value {
    json!({
        "status": format!("{:?}", outcome.status),
        "warnings": outcome.warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "failure": outcome.failure.as_ref().map(ToString::to_string),
    })
}

fn summary(snapshot: &Snapshot) -> Value {
    let categories: serde_json::Map<String, Value> = snapshot
        .category_index
        .categories()
        .map(|(category, ids)| (category.to_string(), json!(ids.len())))
        .collect();
    json!({
        "user": snapshot.user.username,
        "sleeping": snapshot.user.sleeping,
        "stats": snapshot.stats,
        "fetched_at": snapshot.fetched_at.to_rfc3339(),
        "categories": categories,
        "tags": snapshot.tags.len(),
        "unused_tags": snapshot.unused_tags().len(),
        "challenges": snapshot.challenges.len(),
        "challenge_tasks": snapshot.category_index.challenge_linked.len(),
        "broken_tasks": snapshot.category_index.broken.len(),
        "party": snapshot.party.as_ref().map(|p| p.name.clone()),
    })
}
