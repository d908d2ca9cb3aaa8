use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};

use speedy_digest::db::Repository;
use speedy_digest::error::{AppError, Result};
use speedy_digest::models::OwnerId;
use speedy_digest::pipeline::{
    self, weekly_batch_dedupe_key, Collaborators, PipelineContext, PipelineEvent, Worker,
};
use speedy_digest::pipeline::events::WeeklyDigestRequested;
use speedy_digest::search::search;
use speedy_digest::services::BroadcastNotifier;
use speedy_digest::Config;

/// How often the worker checks whether an owner's week has closed.
const SCHEDULE_INTERVAL: Duration = Duration::from_secs(3600);
const SEARCH_LIMIT: usize = 10;

const USAGE: &str = "Usage: digest-worker <command>

  --worker                          run the pipeline until Ctrl-C
  --import <owner> [collection]     import bookmarks and summarize new ones
  --classify <owner> [--force]      assign themes to summaries
  --digest [owner] [YYYY-MM-DD]     generate weekly digests
  --retry <owner> <summary-id>      retry a failed summary
  --search <owner> <query...>       semantic search over summaries
  --usage <owner>                   month-to-date cost and budget
  --inbox <owner>                   print and clear unread notifications";

#[tokio::main]
async fn main() -> Result<()> {
    // Warnings everywhere, job lifecycle from this crate
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into())
                .add_directive(
                    "speedy_digest=info"
                        .parse()
                        .map_err(|e| AppError::Config(format!("bad log directive: {}", e)))?,
                ),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else {
        println!("{}", USAGE);
        return Ok(());
    };

    let config = Config::load()?;
    let repo = Repository::new(&config.db_path).await?;
    let notifier = Arc::new(BroadcastNotifier::new(256));
    let ctx = PipelineContext::new(repo, &config, Collaborators::from_config(&config, notifier)?)?;
    let worker = ctx.worker(&config);

    match command.as_str() {
        "--worker" => run_worker(&ctx, &worker).await?,
        "--import" => {
            let owner = owner_arg(&args, 2)?;
            let collection = args
                .get(3)
                .map(|c| c.parse::<i64>())
                .transpose()
                .map_err(|e| AppError::Invalid(format!("bad collection id: {}", e)))?;
            pipeline::request_import(&ctx, &owner, collection).await?;
            drain(&worker).await?;
            println!("Import finished for {}", owner);
        }
        "--classify" => {
            let owner = owner_arg(&args, 2)?;
            let force = args.iter().skip(3).any(|a| a == "--force");
            pipeline::request_classify(&ctx, &owner, force).await?;
            drain(&worker).await?;
            println!("Themes updated for {}", owner);
        }
        "--digest" => {
            // Either argument may be omitted; a date is recognised by parsing.
            let mut owner = None;
            let mut start = None;
            for arg in args.iter().skip(2) {
                match NaiveDate::parse_from_str(arg, "%Y-%m-%d") {
                    Ok(date) => start = Some(date),
                    Err(_) => owner = Some(OwnerId::new(arg.as_str())),
                }
            }
            pipeline::request_digest(&ctx, owner.as_ref(), start).await?;
            drain(&worker).await?;
            println!("Digest generation finished");
        }
        "--retry" => {
            let owner = owner_arg(&args, 2)?;
            let summary_id = args
                .get(3)
                .ok_or_else(|| AppError::Invalid("--retry needs a summary id".into()))?;
            pipeline::retry_summary(&ctx, &owner, summary_id).await?;
            drain(&worker).await?;
            match ctx.repo.get_summary(&owner, summary_id).await? {
                Some(summary) => println!("Summary {} is {}", summary.id, summary.status.as_str()),
                None => println!("Summary {} no longer exists", summary_id),
            }
        }
        "--search" => {
            let owner = owner_arg(&args, 2)?;
            let query = args.get(3..).map(|q| q.join(" ")).unwrap_or_default();
            let hits = search(&ctx, &owner, &query, SEARCH_LIMIT).await?;
            if hits.is_empty() {
                println!("No matches");
            }
            for hit in hits {
                println!("{:.3}  {}  [{}]", hit.similarity, hit.title, hit.theme.as_deref().unwrap_or("-"));
            }
        }
        "--usage" => {
            let owner = owner_arg(&args, 2)?;
            let now = Utc::now();
            let spent = ctx.ledger.monthly_cost(&owner, now).await?;
            match ctx.ledger.monthly_budget(&owner).await? {
                Some(cap) => println!("Spent ${} of ${} this month", spent, cap),
                None => println!("Spent ${} this month (no cap)", spent),
            }
            for ((provider, model), cost) in ctx.ledger.monthly_breakdown(&owner, now).await? {
                println!("  {:<10} {:<32} ${}", provider, model, cost);
            }
        }
        "--inbox" => {
            let owner = owner_arg(&args, 2)?;
            for n in ctx.repo.unread_notifications(&owner).await? {
                println!("{}  {:<18} {}", n.created_at.format("%Y-%m-%d %H:%M"), n.event, n.data);
            }
            ctx.repo.mark_notifications_read(&owner).await?;
        }
        _ => {
            eprintln!("Unknown command: {}\n\n{}", command, USAGE);
        }
    }

    Ok(())
}

fn owner_arg(args: &[String], index: usize) -> Result<OwnerId> {
    args.get(index)
        .map(|a| OwnerId::new(a.as_str()))
        .ok_or_else(|| AppError::Invalid(format!("{} needs an owner id", args[1])))
}

async fn drain(worker: &Worker) -> Result<()> {
    worker.recover().await?;
    let attempts = worker.run_until_idle().await?;
    tracing::info!(attempts, "Queue drained");
    Ok(())
}

async fn run_worker(ctx: &PipelineContext, worker: &Worker) -> Result<()> {
    let scheduler = tokio::spawn(schedule_weekly_digests(ctx.clone()));

    worker
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
        })
        .await?;

    scheduler.abort();
    Ok(())
}

/// Queue the digest batch every hour; each owner gets the week that has
/// just ended in their own offset, once.
async fn schedule_weekly_digests(ctx: PipelineContext) {
    let mut interval = tokio::time::interval(SCHEDULE_INTERVAL);
    loop {
        interval.tick().await;
        let now = Utc::now();
        let event = PipelineEvent::WeeklyDigestRequested(WeeklyDigestRequested {
            owner_id: None,
            period_start: None,
        });
        match ctx.queue.send_once(event, weekly_batch_dedupe_key(now)).await {
            Ok((job_id, true)) => tracing::info!(%job_id, "Scheduled weekly digests"),
            Ok((_, false)) => {}
            Err(e) => tracing::error!(error = %e, "Failed to schedule weekly digests"),
        }
    }
}
