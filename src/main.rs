use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::*;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use slurm_relay::config::{seconds, Command, Config};
use slurm_relay::{
    Job, JobState, LocalSession, PollOptions, ReconcileOptions, Slurm, SlurmError, SshSession,
};

fn colorize(state: &JobState) -> ColoredString {
    let text = state.to_string();
    match state {
        JobState::Running | JobState::Completing => text.green(),
        JobState::Pending | JobState::Configuring | JobState::Requeued => text.yellow(),
        JobState::Completed => text.bright_green().bold(),
        JobState::Cancelled { .. } => text.magenta(),
        state if state.is_terminal() => text.red().bold(),
        _ => text.normal(),
    }
}

fn print_job(job: &Job, depth: usize) {
    let end = job
        .end_time()
        .map(|t| t.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:indent$}{:<10} {:<12} {:<14} {:<16} {}",
        "",
        job.job_id().bold(),
        job.account(),
        colorize(job.state()),
        job.exec_host().unwrap_or("-"),
        end,
        indent = depth * 2,
    );
    for child in job.children() {
        print_job(child, depth + 1);
    }
}

fn print_jobs(jobs: &[Job]) {
    if jobs.is_empty() {
        eprintln!("{}", "No jobs.".dimmed());
    }
    for job in jobs {
        print_job(job, 0);
    }
}

/// Cancelled on the first Ctrl-C.
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-c detected, stopping the poll");
            child.cancel();
        }
    });
    token
}

async fn wait_for(
    slurm: &Slurm,
    job: &mut Job,
    interval: u64,
    timeout: Option<u64>,
) -> Result<(), SlurmError> {
    let mut options =
        PollOptions::new(Duration::from_secs(interval)).with_cancellation(ctrl_c_token());
    if let Some(timeout) = seconds(timeout) {
        options = options.with_timeout(timeout);
    }
    info!(job_id = job.job_id(), "waiting for job to leave the queue");
    slurm.poll_to_completion(job, &options).await
}

async fn run(cli: &Config, slurm: &Slurm) -> Result<(), SlurmError> {
    match &cli.command {
        Command::Submit {
            wait,
            interval,
            timeout,
            ..
        } => {
            // `job_spec` only returns `None` for other subcommands.
            let Some(spec) = cli.command.job_spec()? else {
                return Ok(());
            };
            let mut job = slurm.submit(&spec, false).await?;
            print_job(&job, 0);
            if *wait {
                wait_for(slurm, &mut job, *interval, *timeout).await?;
                print_job(&job, 0);
            }
        }
        Command::Find { job } => print_jobs(&slurm.find(job.as_deref(), None).await?),
        Command::Get { job } => {
            if let Some(job) = slurm.get(job, true).await? {
                print_job(&job, 0);
            }
        }
        Command::Cancel { jobs } => {
            for job in jobs {
                slurm.cancel(job).await?;
                println!("{} {}", "Cancelled".magenta(), job);
            }
        }
        Command::Wait {
            job,
            interval,
            timeout,
        } => {
            let Some(mut job) = slurm.get(job, true).await? else {
                return Ok(());
            };
            wait_for(slurm, &mut job, *interval, *timeout).await?;
            print_job(&job, 0);
        }
        Command::Queue => print_jobs(&slurm.queued().await?),
        Command::History => print_jobs(&slurm.accounted().await?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), SlurmError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Config::parse();
    let reconcile = ReconcileOptions {
        dedup: !cli.no_dedup,
        ..Default::default()
    };

    match &cli.host {
        Some(host) => {
            let session = Arc::new(SshSession::connect(host).await?);
            let mut slurm = Slurm::from_shared(session.clone()).with_reconcile(reconcile);
            if let Some(user) = &cli.user {
                slurm = slurm.with_user(user.as_str());
            }
            let result = run(&cli, &slurm).await;
            drop(slurm);
            if let Ok(session) = Arc::try_unwrap(session) {
                session.close().await;
            }
            result
        }
        None => {
            if !cli.local {
                info!("No --host given, running scheduler commands locally");
            }
            let mut slurm = Slurm::new(LocalSession::new()).with_reconcile(reconcile);
            if let Some(user) = &cli.user {
                slurm = slurm.with_user(user.as_str());
            }
            run(&cli, &slurm).await
        }
    }
}
