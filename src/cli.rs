use crate::models::{ContentType, VoteDirection};
use crate::thread::SortKey;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "discussion-client")]
#[command(version)]
#[command(about = "Live comment-thread client for Q&A discussion boards")]
pub struct Args {
    /// TOML config file (base_url, session_cookie, [page] ...)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Discussion server base URL; overrides config and DISCUSSION_BASE_URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Increase logging verbosity (default info, -v debug, -vv trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Follow a question's push stream and print new comments as they arrive
    Watch {
        question: u64,

        /// Treat the question as closed: AI comments are dropped
        #[arg(long)]
        closed: bool,

        /// Ring the terminal bell when the stored preference allows it
        #[arg(long)]
        sound: bool,
    },

    /// Fetch and print the subtree under a comment
    Thread {
        comment: u64,

        /// Order of the top-level replies
        #[arg(long, value_enum, default_value = "oldest")]
        sort: SortKey,

        /// Nesting depth after which replies are folded
        #[arg(long)]
        max_depth: Option<u32>,
    },

    /// Vote on a question, answer or comment
    Vote {
        #[arg(value_enum)]
        target: TargetKind,
        id: u64,
        #[arg(value_enum)]
        direction: DirectionArg,
    },

    /// Ask an AI personality to respond to a question, answer or comment
    AiRespond {
        #[arg(value_enum)]
        target: TargetKind,
        id: u64,

        /// Personality id (see `personalities`)
        #[arg(long, short)]
        personality: u64,

        /// Question the target belongs to, for placing the result
        #[arg(long)]
        question: Option<u64>,
    },

    /// List the available AI personalities
    Personalities,

    /// Delete one of your comments
    Delete {
        comment: u64,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Accept a top-level comment as the answer
    Accept { comment: u64 },

    /// Mark a question answered (or unanswered with --undo)
    MarkAnswered {
        question: u64,
        #[arg(long)]
        undo: bool,
    },

    /// Render a markdown file the way the comment preview does
    Preview { file: PathBuf },

    /// Turn the new-comment sound on or off
    Sound {
        #[arg(value_enum)]
        state: Toggle,
    },

    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TargetKind {
    Question,
    Answer,
    Comment,
}

impl Args {
    /// Default log directive for the `-v` count, used when `RUST_LOG` is unset.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "discussion_client=info",
            1 => "discussion_client=debug",
            _ => "discussion_client=trace",
        }
    }
}

impl From<TargetKind> for ContentType {
    fn from(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Question => ContentType::Question,
            TargetKind::Answer => ContentType::Answer,
            TargetKind::Comment => ContentType::Comment,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DirectionArg {
    Up,
    Down,
}

impl From<DirectionArg> for VoteDirection {
    fn from(d: DirectionArg) -> Self {
        match d {
            DirectionArg::Up => VoteDirection::Up,
            DirectionArg::Down => VoteDirection::Down,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}
