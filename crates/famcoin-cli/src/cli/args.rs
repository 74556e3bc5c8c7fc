use clap::{Parser, Subcommand, ValueEnum};
use famcoin_client::{RedemptionStatus, TaskStatus};

#[derive(Parser)]
#[command(
    name = "famcoin",
    version,
    about = "Family chores and coins: tasks, wallets, rewards and redemptions from the terminal"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Parser, Debug, Clone)]
pub struct GlobalArgs {
    /// API base URL
    #[arg(long, global = true, env = "FAMCOIN_API_URL")]
    pub url: Option<String>,

    /// Sign in with this email before running the command
    #[arg(long, global = true, env = "FAMCOIN_EMAIL")]
    pub email: Option<String>,

    #[arg(long, global = true, env = "FAMCOIN_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Print raw JSON instead of a summary
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Sign in and print the credential pair for FAMCOIN_ACCESS_TOKEN / FAMCOIN_REFRESH_TOKEN
    Login,
    /// Show the signed-in user
    Me,
    /// List children in the family
    Children,
    /// List task assignments
    Tasks(TasksArgs),
    /// Mark an assignment as done (child)
    CompleteTask { id: String },
    /// Approve a completed assignment and pay out (parent)
    ApproveTask { id: String },
    /// Send a completed assignment back (parent)
    RejectTask {
        id: String,
        #[arg(long)]
        reason: String,
    },
    /// Show a wallet balance
    Wallet(ChildArgs),
    /// Show wallet transactions
    Transactions(TransactionsArgs),
    /// Show savings balance
    Savings(ChildArgs),
    /// Show level, XP and badges
    Progress(ChildArgs),
    /// List rewards
    Rewards {
        /// Only rewards that can currently be redeemed
        #[arg(long)]
        active: bool,
    },
    /// Redeem a reward (child)
    Redeem { reward_id: String },
    /// List redemptions
    Redemptions {
        #[arg(long, value_enum)]
        status: Option<RedemptionStatusArg>,
    },
    ApproveRedemption { id: String },
    RejectRedemption {
        id: String,
        #[arg(long)]
        reason: String,
    },
    /// List notifications
    Notifications,
    /// Mark every notification as read
    MarkAllRead,
    /// Print the task list whenever it changes; polls until Ctrl+C
    WatchTasks(TasksArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ChildArgs {
    /// Child id (parents); omit for the signed-in child
    #[arg(long)]
    pub child: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct TasksArgs {
    #[arg(long)]
    pub child: Option<String>,

    #[arg(long, value_enum)]
    pub status: Option<TaskStatusArg>,
}

#[derive(Parser, Debug, Clone)]
pub struct TransactionsArgs {
    #[arg(long)]
    pub child: Option<String>,

    #[arg(long, default_value_t = 20)]
    pub limit: u32,

    #[arg(long, default_value_t = 0)]
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TaskStatusArg {
    Pending,
    Completed,
    Approved,
    Rejected,
}

impl From<TaskStatusArg> for TaskStatus {
    fn from(arg: TaskStatusArg) -> Self {
        match arg {
            TaskStatusArg::Pending => TaskStatus::Pending,
            TaskStatusArg::Completed => TaskStatus::Completed,
            TaskStatusArg::Approved => TaskStatus::Approved,
            TaskStatusArg::Rejected => TaskStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RedemptionStatusArg {
    Pending,
    Approved,
    Rejected,
}

impl From<RedemptionStatusArg> for RedemptionStatus {
    fn from(arg: RedemptionStatusArg) -> Self {
        match arg {
            RedemptionStatusArg::Pending => RedemptionStatus::Pending,
            RedemptionStatusArg::Approved => RedemptionStatus::Approved,
            RedemptionStatusArg::Rejected => RedemptionStatus::Rejected,
        }
    }
}
