use chrono::Utc;
use clap::{CommandFactory, Parser};
use colored::*;
use std::io::{self, BufRead, Write};
use std::process;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use discussion_client::cli::{Args, Command, TargetKind, Toggle};
use discussion_client::config::DEFAULT_BASE_URL;
use discussion_client::document::{lock, ThreadModal, VoteWidget};
use discussion_client::preferences::{PreferenceStore, NOTIFICATION_SOUND};
use discussion_client::preview::{CmarkRenderer, MarkdownEditor};
use discussion_client::render::{self, CommentFragment};
use discussion_client::responder::ResponderOutcome;
use discussion_client::sync::TerminalBell;
use discussion_client::thread::{sort_entries, SortEntry, ThreadController};
use discussion_client::{
    ApiClient, ClientConfig, ClientError, ContentType, NotificationKind, Result, SharedDocument, VoteTarget,
};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.log_directive());

    if let Err(e) = run(args).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn init_logging(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let cfg = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::new(DEFAULT_BASE_URL),
    };
    let mut cfg = cfg.apply_env();
    if let Some(url) = &args.base_url {
        cfg.base_url = url.trim_end_matches('/').to_string();
    }
    Ok(cfg)
}

async fn run(args: Args) -> Result<()> {
    if let Command::Completions { shell } = args.command {
        clap_complete::generate(shell, &mut Args::command(), "discussion-client", &mut io::stdout());
        return Ok(());
    }

    let mut cfg = load_config(&args)?;

    match args.command {
        Command::Watch { question, closed, sound } => {
            cfg.page.question_id = Some(question);
            cfg.page.question_answered |= closed;
            cfg.page.current_location = format!("/questions/{question}");
            watch(cfg, sound).await
        }
        Command::Thread { comment, sort, max_depth } => {
            let doc = discussion_client::new_shared_document();
            let mut threads = ThreadController::new(cfg.page.clone(), ApiClient::new(&cfg), doc.clone());
            if let Some(depth) = max_depth {
                threads = threads.with_max_depth(depth);
            }
            threads.continue_thread(comment).await?;

            let fragments = match lock(&doc)?.modal.take() {
                Some(ThreadModal::Loaded { fragments, .. }) => fragments,
                _ => Vec::new(),
            };
            if fragments.is_empty() {
                println!("{}", "No replies.".dimmed());
                return Ok(());
            }
            let mut entries: Vec<SortEntry> = fragments
                .iter()
                .map(|f| SortEntry { id: f.id, score: f.score, created_at: f.created_at, pinned: f.accepted })
                .collect();
            sort_entries(&mut entries, sort);
            for entry in entries {
                if let Some(f) = fragments.iter().find(|f| f.id == entry.id) {
                    print_tree(f);
                }
            }
            Ok(())
        }
        Command::Vote { target, id, direction } => {
            let target = match target {
                TargetKind::Question => VoteTarget::Question(id),
                TargetKind::Answer => VoteTarget::Answer(id),
                TargetKind::Comment => VoteTarget::Comment(id),
            };
            let page = discussion_client::Page::new(&cfg);
            lock(&page.doc)?.add_vote_widget(target, VoteWidget::default());
            let outcome = page.votes.cast_vote(target, direction.into()).await;
            print_notification(&page.doc);
            let widget = outcome?;
            println!("vote is now {:?}", widget.state);
            Ok(())
        }
        Command::AiRespond { target, id, personality, question } => {
            let content_type = ContentType::from(target);
            cfg.page.question_id = question.or((content_type == ContentType::Question).then_some(id));
            let page = discussion_client::Page::new(&cfg);
            let name = page.responder.find_personality(personality).await?.name;
            println!("{} {}", "Asking".dimmed(), name.cyan().bold());

            let outcome = page.responder.request_ai_response(content_type, id, personality).await;
            print_notification(&page.doc);
            match outcome? {
                ResponderOutcome::Merged(ids) => {
                    let doc = lock(&page.doc)?;
                    for id in ids {
                        if let Some(f) = doc.fragment(id, Utc::now()) {
                            print_comment(&f);
                        }
                    }
                }
                ResponderOutcome::Fragment(html) => println!("{}", plain_text(&html)),
                ResponderOutcome::AlreadyPresent | ResponderOutcome::Empty => {}
            }
            Ok(())
        }
        Command::Personalities => {
            for p in ApiClient::new(&cfg).personalities().await? {
                let about = p.description.or(p.expertise).unwrap_or_default();
                println!("{:>4}  {}  {}", p.id, p.name.bold(), about.dimmed());
            }
            Ok(())
        }
        Command::Delete { comment, yes } => {
            cfg.page.require_auth()?;
            if !yes && !confirm(&format!("Delete comment #{comment}?"))? {
                return Err(ClientError::Cancelled);
            }
            let ack = ApiClient::new(&cfg).delete_comment(comment).await?;
            println!("{}", ack.message.unwrap_or_else(|| "Comment deleted".into()).green());
            Ok(())
        }
        Command::Accept { comment } => {
            cfg.page.require_auth()?;
            ApiClient::new(&cfg).accept_comment(comment).await?;
            println!("{}", "Answer accepted".green());
            Ok(())
        }
        Command::MarkAnswered { question, undo } => {
            cfg.page.question_id = Some(question);
            let page = discussion_client::Page::new(&cfg);
            let outcome = page.thread.set_answered(!undo).await;
            print_notification(&page.doc);
            outcome
        }
        Command::Preview { file } => {
            let source = std::fs::read_to_string(&file)?;
            let mut editor = MarkdownEditor::new(source);
            editor.toggle_preview(&CmarkRenderer);
            println!("{}", editor.preview_html());
            Ok(())
        }
        Command::Sound { state } => {
            let path = cfg
                .resolved_preferences_path()
                .ok_or_else(|| ClientError::Config("no config directory for preferences".into()))?;
            let mut store = PreferenceStore::open(&path);
            store.set_bool(NOTIFICATION_SOUND, state == Toggle::On)?;
            println!("notification sound {} ({})", if state == Toggle::On { "on" } else { "off" }, path.display());
            Ok(())
        }
        Command::Completions { .. } => Ok(()),
    }
}

async fn watch(cfg: ClientConfig, sound: bool) -> Result<()> {
    let page = discussion_client::Page::new(&cfg);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut client = page.sync_client(&cfg).with_updates(tx);
    if sound {
        let prefs = cfg
            .resolved_preferences_path()
            .map(PreferenceStore::open)
            .unwrap_or_else(PreferenceStore::in_memory);
        client = client.with_sound(Arc::new(TerminalBell), prefs);
    }
    let handle = client.start()?;
    println!(
        "{} {} {}",
        "Watching".green().bold(),
        cfg.base_url,
        "(Ctrl-C to stop)".dimmed()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            report = rx.recv() => {
                let Some(report) = report else { break };
                let doc = lock(&page.doc)?;
                for id in report.inserted {
                    if let Some(f) = doc.fragment(id, Utc::now()) {
                        print_comment(&f);
                    }
                }
            }
        }
    }

    handle.close().await;
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

fn print_notification(doc: &SharedDocument) {
    let Ok(doc) = lock(doc) else { return };
    if let Some(n) = doc.notifications.latest() {
        let msg = match n.kind {
            NotificationKind::Success => n.message.green(),
            NotificationKind::Error => n.message.red(),
            NotificationKind::Info => n.message.normal(),
        };
        println!("{msg}");
    }
}

fn print_comment(f: &CommentFragment) {
    let pad = "  ".repeat(f.level as usize);
    let author = match &f.author {
        Some(a) if a.is_ai => format!("{} {}", a.username.cyan().bold(), "AI".magenta()),
        Some(a) => a.username.bold().to_string(),
        None => "[deleted]".dimmed().to_string(),
    };
    let score = match f.score {
        s if s > 0 => format!("+{s}").green(),
        s if s < 0 => s.to_string().red(),
        s => s.to_string().normal(),
    };
    let accepted = if f.accepted { " accepted".green().bold().to_string() } else { String::new() };
    println!(
        "{pad}{} {} {} {}{}",
        format!("#{}", f.id).dimmed(),
        author,
        score,
        f.relative_time.dimmed(),
        accepted
    );
    for line in plain_text(&f.body_html).lines().filter(|l| !l.trim().is_empty()) {
        println!("{pad}  {line}");
    }
    if f.remaining_replies > 0 {
        println!("{pad}  {}", render::load_more_label(f.remaining_replies).blue());
    }
    if f.continue_thread {
        println!("{pad}  {}", "Continue this thread".blue());
    }
}

fn print_tree(f: &CommentFragment) {
    print_comment(f);
    for reply in &f.replies {
        print_tree(reply);
    }
}

/// Crude tag stripper for terminal display of server-rendered HTML.
fn plain_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .split('\n')
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}
