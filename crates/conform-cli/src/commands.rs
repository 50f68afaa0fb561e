use std::path::PathBuf;

use anyhow::{Context, Result};
use conform_domain::Facts;
use conform_engine::reconcile;
use conform_provider::{FileTemplates, SimulatedHost};
use conform_report::{RedbSink, ReportSink};

use crate::manifest;
use crate::output;

pub fn apply(policy: PathBuf, facts: Option<PathBuf>, report_db: Option<PathBuf>) -> Result<()> {
    run(policy, facts, report_db, false)
}

pub fn diff(policy: PathBuf, facts: Option<PathBuf>, report_db: Option<PathBuf>) -> Result<()> {
    run(policy, facts, report_db, true)
}

fn run(
    policy_path: PathBuf,
    facts_path: Option<PathBuf>,
    report_db: Option<PathBuf>,
    dry_run: bool,
) -> Result<()> {
    let mut policy = manifest::load_policy(&policy_path)?;

    let mut host = SimulatedHost::new();
    host.facts = load_facts(facts_path)?;

    let outcome = reconcile(&mut policy, &mut host.env(), &FileTemplates::new(), dry_run)?;
    print!("{}", output::render_outcome(&outcome));

    if let Some(path) = report_db {
        let mut sink = RedbSink::open(&path)
            .with_context(|| format!("opening report database {}", path.display()))?;
        let host_id = match host.facts.get("sys.hostname") {
            Some(hostname) => Some(sink.record_host(hostname)?),
            None => None,
        };
        sink.record_run(&outcome.record(host_id))?;
    }

    if outcome.failed() {
        std::process::exit(1);
    }
    Ok(())
}

pub fn graph(policy_path: PathBuf, facts_path: Option<PathBuf>) -> Result<()> {
    let mut policy = manifest::load_policy(&policy_path)?;
    let facts = load_facts(facts_path)?;

    let order = policy.normalize(&facts, &FileTemplates::new())?;
    print!("{}", output::render_graph(&policy, &order));
    Ok(())
}

pub fn pack(policy_path: PathBuf) -> Result<()> {
    let policy = manifest::load_policy(&policy_path)?;
    for resource in policy.resources() {
        println!("{}", resource.pack());
    }
    Ok(())
}

fn load_facts(path: Option<PathBuf>) -> Result<Facts> {
    match path {
        Some(path) => {
            Facts::load(&path).with_context(|| format!("reading facts file {}", path.display()))
        }
        None => Ok(Facts::new()),
    }
}
