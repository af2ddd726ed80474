//! Subcommand handlers. Each returns whether every node succeeded; the
//! caller owns closing the collection.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use fleet::{CommandOptions, ExecutableResult, FleetError, Node, NodeKey, Nodes, OsInfo};
use serde::Serialize;
use tokio::task::JoinSet;

/// Which nodes `exec` runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Default,
    Node(NodeKey),
    All,
}

#[derive(Debug, Serialize)]
struct NodeReport {
    index: usize,
    name: String,
    remote: bool,
    default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    os: Option<OsInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    working_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn label(node: &Node) -> String {
    if node.name().is_empty() {
        format!("#{}", node.index())
    } else {
        node.name().to_string()
    }
}

/// Initializes every node concurrently and prints what was learned.
pub async fn info(nodes: Arc<Nodes>, json: bool) -> Result<bool> {
    let positions: Vec<usize> = (0..nodes.len()).collect();
    let outcomes = for_each(&nodes, positions, |nodes, position| async move {
        nodes.get(position)?.initialize().await
    })
    .await?;
    let default_index = nodes.default_node().ok().map(|n| n.index());

    let mut reports = Vec::with_capacity(outcomes.len());
    for (position, outcome) in outcomes {
        let node = nodes.get(position)?;
        reports.push(NodeReport {
            index: position,
            name: label(node),
            remote: node.is_remote(),
            default: Some(node.index()) == default_index,
            os: node.os_info().cloned(),
            working_path: node.working_path().map(ToString::to_string),
            error: outcome.err().map(|e| e.to_string()),
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            let marker = if report.default { "*" } else { " " };
            let kind = if report.remote { "remote" } else { "local" };
            match &report.error {
                Some(error) => println!(
                    "{marker} {:>3} {:<16} {kind:<6} error: {error}",
                    report.index, report.name
                ),
                None => println!(
                    "{marker} {:>3} {:<16} {kind:<6} {} {}  {}",
                    report.index,
                    report.name,
                    report.os.as_ref().map_or("", |os| os.operating_system.as_str()),
                    report.os.as_ref().map_or("", |os| os.kernel_release.as_str()),
                    report.working_path.as_deref().unwrap_or(""),
                ),
            }
        }
    }
    Ok(reports.iter().all(|r| r.error.is_none()))
}

/// Runs `command` through the shell of each targeted node and prints its
/// output. Output from several nodes is prefixed with the node label.
pub async fn exec(nodes: Arc<Nodes>, target: Target, command: String) -> Result<bool> {
    let positions = match target {
        Target::Default => vec![nodes.default_node()?.index().as_usize()],
        Target::Node(key) => vec![nodes.get(key)?.index().as_usize()],
        Target::All => (0..nodes.len()).collect(),
    };
    let prefixed = positions.len() > 1;
    let command = Arc::new(command);

    let outcomes = for_each(&nodes, positions, move |nodes, position| {
        let command = command.clone();
        async move { nodes.get(position)?.execute(&command, CommandOptions::shell()).await }
    })
    .await?;

    let mut all_ok = true;
    for (position, outcome) in outcomes {
        let name = label(nodes.get(position)?);
        match outcome {
            Ok(result) => {
                all_ok &= result.is_success();
                print_result(prefixed.then_some(name.as_str()), &result);
            }
            Err(e) => {
                all_ok = false;
                tracing::error!(node = %name, error = %e, "command could not run");
            }
        }
    }
    Ok(all_ok)
}

fn print_result(prefix: Option<&str>, result: &ExecutableResult) {
    match prefix {
        None => {
            print!("{}", result.stdout);
            eprint!("{}", result.stderr);
        }
        Some(prefix) => {
            for line in result.stdout.lines() {
                println!("[{prefix}] {line}");
            }
            for line in result.stderr.lines() {
                eprintln!("[{prefix}] {line}");
            }
        }
    }
}

/// Runs `f` for each listed position on its own task and returns the
/// outcomes in position order.
async fn for_each<T, F, Fut>(
    nodes: &Arc<Nodes>,
    positions: Vec<usize>,
    f: F,
) -> Result<Vec<(usize, Result<T, FleetError>)>>
where
    T: Send + 'static,
    F: Fn(Arc<Nodes>, usize) -> Fut,
    Fut: Future<Output = Result<T, FleetError>> + Send + 'static,
{
    let mut set = JoinSet::new();
    for position in positions {
        let outcome = f(nodes.clone(), position);
        set.spawn(async move { (position, outcome.await) });
    }

    let mut outcomes = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        outcomes.push(joined?);
    }
    outcomes.sort_by_key(|(position, _)| *position);
    Ok(outcomes)
}
