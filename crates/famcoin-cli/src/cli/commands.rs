use anyhow::Context;
use chrono::Local;
use famcoin_client::keys::{TaskFilter, TransactionPage};
use famcoin_client::{
    ApiClient, CacheConfig, ClientConfig, ClientError, ClientResult, FamilyClient, QueryCache,
    TaskAssignment,
};
use serde::Serialize;
use tracing::debug;

use super::args::{Cli, Command, GlobalArgs, TasksArgs};
use crate::exit_codes;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let family = connect(&cli.global)?;

    if let (Some(email), Some(password)) = (&cli.global.email, &cli.global.password) {
        if !matches!(cli.cmd, Command::Login) {
            if let Err(e) = family.login(email, password).await {
                return Ok(report(&e));
            }
        }
    }

    match run(&family, &cli.global, cli.cmd).await {
        Ok(()) => Ok(exit_codes::SUCCESS),
        Err(e) => Ok(report(&e)),
    }
}

fn connect(global: &GlobalArgs) -> anyhow::Result<FamilyClient> {
    let mut config = ClientConfig::from_env();
    if let Some(url) = &global.url {
        config = config.with_url(url);
    }
    debug!(url = %config.url, "connecting");
    let api = ApiClient::new(config).context("invalid client configuration")?;
    Ok(FamilyClient::new(api, QueryCache::new(CacheConfig::default())))
}

fn report(err: &ClientError) -> i32 {
    eprintln!("error: {}", err.user_message());
    debug!(error = ?err, "command failed");
    match err {
        ClientError::Unauthorized { .. } => exit_codes::AUTH_FAILED,
        ClientError::InsufficientBalance { .. } => exit_codes::INSUFFICIENT_BALANCE,
        ClientError::Config { .. } => exit_codes::CONFIG_ERROR,
        _ => exit_codes::REQUEST_FAILED,
    }
}

fn emit<T: Serialize>(json: bool, value: &T, summary: impl FnOnce(&T)) {
    if json {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("failed to encode output: {}", e),
        }
    } else {
        summary(value);
    }
}

async fn run(family: &FamilyClient, global: &GlobalArgs, cmd: Command) -> ClientResult<()> {
    let json = global.json;

    match cmd {
        Command::Login => {
            let (Some(email), Some(password)) = (&global.email, &global.password) else {
                return Err(ClientError::Config {
                    message: "login needs --email and --password".to_string(),
                });
            };
            let auth = family.login(email, password).await?;
            println!("FAMCOIN_ACCESS_TOKEN={}", auth.access_token);
            println!("FAMCOIN_REFRESH_TOKEN={}", auth.refresh_token);
        }
        Command::Me => {
            let me = family.current_user().data().await?;
            emit(json, &me, |u| println!("{} ({:?}) {}", u.name, u.role, u.id));
        }
        Command::Children => {
            let children = family.children().data().await?;
            emit(json, &children, |list| {
                for child in list {
                    println!("{}  {}", child.id, child.name);
                }
            });
        }
        Command::Tasks(args) => {
            let tasks = family.tasks(task_filter(&args)).data().await?;
            emit(json, &tasks, |list| print_tasks(list));
        }
        Command::CompleteTask { id } => {
            let assignment = family.complete_task(&id).await?;
            emit(json, &assignment, |a| println!("{} -> {:?}", a.id, a.status));
        }
        Command::ApproveTask { id } => {
            let assignment = family.approve_task(&id).await?;
            emit(json, &assignment, |a| {
                println!("{} approved, +{} coins", a.id, a.task.coin_value)
            });
        }
        Command::RejectTask { id, reason } => {
            let assignment = family.reject_task(&id, &reason).await?;
            emit(json, &assignment, |a| println!("{} -> {:?}", a.id, a.status));
        }
        Command::Wallet(args) => {
            let wallet = family.wallet(args.child.as_deref()).data().await?;
            emit(json, &wallet, |w| {
                println!(
                    "balance {}  (earned {}, spent {})",
                    w.balance, w.total_earned, w.total_spent
                )
            });
        }
        Command::Transactions(args) => {
            let page = TransactionPage {
                child_id: args.child,
                limit: args.limit,
                offset: args.offset,
            };
            let transactions = family.transactions(page).data().await?;
            emit(json, &transactions, |list| {
                for tx in list {
                    println!(
                        "{}  {:?} {:>6}  {}",
                        tx.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                        tx.kind,
                        tx.amount,
                        tx.description
                    );
                }
            });
        }
        Command::Savings(args) => {
            let savings = family.savings(args.child.as_deref()).data().await?;
            emit(json, &savings, |s| {
                println!("saved {:.2}  (interest earned {:.2})", s.balance, s.total_earned)
            });
        }
        Command::Progress(args) => {
            let progress = family.gamification(args.child.as_deref()).data().await?;
            emit(json, &progress, |g| {
                let unlocked = g.badges.iter().filter(|b| b.unlocked).count();
                println!(
                    "level {}  xp {}/{}  badges {}/{}",
                    g.current_level,
                    g.current_xp,
                    g.xp_for_next_level,
                    unlocked,
                    g.badges.len()
                );
            });
        }
        Command::Rewards { active } => {
            let rewards = family.rewards(active.then_some(true)).data().await?;
            emit(json, &rewards, |list| {
                for r in list {
                    let state = if r.is_active { "" } else { "  (inactive)" };
                    println!("{}  {:>5}  {}{}", r.id, r.coin_cost, r.name, state);
                }
            });
        }
        Command::Redeem { reward_id } => {
            let rewards = family.rewards(Some(true)).data().await?;
            let reward = rewards
                .iter()
                .find(|r| r.id == reward_id)
                .ok_or_else(|| ClientError::Api {
                    status: 404,
                    message: Some(format!("No active reward with id {}", reward_id)),
                })?;
            let redemption = family.request_redemption(reward).await?;
            emit(json, &redemption, |r| {
                println!("requested {} -> {:?}", r.reward.name, r.status)
            });
        }
        Command::Redemptions { status } => {
            let redemptions = family.redemptions(status.map(Into::into)).data().await?;
            emit(json, &redemptions, |list| {
                for r in list {
                    println!(
                        "{}  {:?}  {}  {}",
                        r.id,
                        r.status,
                        r.child_name.as_deref().unwrap_or(&r.child_id),
                        r.reward.name
                    );
                }
            });
        }
        Command::ApproveRedemption { id } => {
            let redemption = family.approve_redemption(&id).await?;
            emit(json, &redemption, |r| println!("{} -> {:?}", r.id, r.status));
        }
        Command::RejectRedemption { id, reason } => {
            let redemption = family.reject_redemption(&id, &reason).await?;
            emit(json, &redemption, |r| println!("{} -> {:?}", r.id, r.status));
        }
        Command::Notifications => {
            let notifications = family.notifications().data().await?;
            emit(json, &notifications, |list| {
                for n in list {
                    let marker = if n.is_read { ' ' } else { '*' };
                    println!("{} {}  {}", marker, n.title, n.message);
                }
            });
        }
        Command::MarkAllRead => {
            family.mark_all_notifications_read().await?;
            println!("all notifications marked read");
        }
        Command::WatchTasks(args) => watch_tasks(family, &args, json).await?,
    }

    Ok(())
}

fn task_filter(args: &TasksArgs) -> TaskFilter {
    TaskFilter {
        child_id: args.child.clone(),
        status: args.status.map(Into::into),
    }
}

fn print_tasks(list: &[TaskAssignment]) {
    if list.is_empty() {
        println!("no tasks");
    }
    for t in list {
        println!(
            "{}  {:<9}  {:>4}c  {}  {}",
            t.id,
            t.status.as_str(),
            t.task.coin_value,
            t.child_name.as_deref().unwrap_or(&t.child_id),
            t.task.title
        );
    }
}

async fn watch_tasks(family: &FamilyClient, args: &TasksArgs, json: bool) -> ClientResult<()> {
    let mut tasks = family.tasks(task_filter(args));
    let initial = tasks.data().await?;

    eprintln!(
        "Polling every {}s. Press Ctrl+C to stop.\n",
        family.cache().config().poll_interval().as_secs()
    );
    eprintln!("[{}] initial", Local::now().format("%H:%M:%S"));
    emit(json, &initial, |list| print_tasks(list));
    let mut last = initial;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Stopping watch loop.");
                break;
            }
            alive = tasks.changed() => {
                if !alive {
                    break;
                }
            }
        }

        if let Some(e) = tasks.error() {
            eprintln!("[{}] refresh failed: {}", Local::now().format("%H:%M:%S"), e.user_message());
            continue;
        }
        let Some(current) = tasks.cached() else {
            continue;
        };
        if current == last {
            continue;
        }

        eprintln!("---");
        eprintln!("[{}] tasks changed", Local::now().format("%H:%M:%S"));
        emit(json, &current, |list| print_tasks(list));
        last = current;
    }

    Ok(())
}
