/// Umber - command-line front-end for the Umber URL shortener

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use umber_client::{
    account::{RegisterForm, RegisterOutcome},
    links::{LinkCollection, SortDirection, SortField, SortSpec},
    notify::{Notification, NotificationLevel},
    preferences::ThemeMode,
    qr::QrState,
    ClientConfig, ClientContext,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SortArg {
    /// Click count
    Clicks,
    /// Creation date
    Date,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ThemeArg {
    Light,
    Dark,
    System,
}

impl From<ThemeArg> for ThemeMode {
    fn from(arg: ThemeArg) -> Self {
        match arg {
            ThemeArg::Light => ThemeMode::Light,
            ThemeArg::Dark => ThemeMode::Dark,
            ThemeArg::System => ThemeMode::System,
        }
    }
}

#[derive(Parser)]
#[command(name = "umber")]
#[command(about = "Umber URL shortener client", long_about = None)]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with username and password
    Login {
        username: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account
    Register {
        username: String,
        email: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
        /// Accept the Terms of Service and Privacy Policy
        #[arg(long)]
        accept_terms: bool,
    },
    /// Log out
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Shorten a URL
    Shorten { url: String },
    /// List links (newest five unless --all)
    List {
        #[arg(long)]
        all: bool,
        #[arg(long, value_enum)]
        sort: Option<SortArg>,
        /// Sort descending
        #[arg(long)]
        desc: bool,
    },
    /// Delete a link by id
    Delete { id: String },
    /// Copy a link's short URL to the clipboard
    Copy { id: String },
    /// Show link statistics
    Stats,
    /// Fetch a link's QR code
    Qr {
        key: String,
        /// Save the image into this directory
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show or set the theme
    Theme {
        #[arg(value_enum)]
        mode: Option<ThemeArg>,
    },
    /// Load profile, history and statistics together
    Dashboard,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = ClientConfig::from_env().context("Failed to load configuration")?;

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("umber_client={}", config.logging.level).into());
    if config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }

    let ctx = ClientContext::new(config)
        .await
        .context("Failed to create client context")?;
    let mut toasts = ctx.notifier.subscribe();

    let result = run(&ctx, cli).await;
    print_toasts(&mut toasts);
    result
}

async fn run(ctx: &ClientContext, cli: Cli) -> Result<()> {
    let json = cli.json;

    match cli.command {
        Commands::Login { username, password } => {
            let password = password_or_prompt(password)?;
            let target = ctx.account.login(&username, &password).await?;
            println!("Logged in. Continue at {}", target);
        }
        Commands::Register {
            username,
            email,
            password,
            accept_terms,
        } => {
            let password = password_or_prompt(password)?;
            let form = RegisterForm {
                username,
                email,
                confirm_password: password.clone(),
                password,
                terms_accepted: accept_terms,
            };
            match ctx.account.register(&form).await? {
                RegisterOutcome::SignedIn => println!("Account created, you are logged in."),
                RegisterOutcome::LoginRequired => println!("Account created, please log in."),
            }
        }
        Commands::Logout => ctx.account.logout()?,
        Commands::Whoami => {
            let profile = ctx.account.fetch_profile().await?;
            if json {
                print_json(&profile)?;
            } else {
                println!("{}", profile.display_name());
                if let Some(email) = &profile.email {
                    println!("{}", email);
                }
            }
        }
        Commands::Shorten { url } => {
            let dashboard = ctx.dashboard();
            let created = dashboard.shorten(&url).await?;
            if json {
                print_json(&created)?;
            } else {
                println!("{}", created.short_url);
                if let Some(remaining) = created.links_remaining {
                    println!("{} links remaining", remaining);
                }
            }
        }
        Commands::List { all, sort, desc } => {
            let view = if all {
                ctx.history_view()
            } else {
                ctx.compact_view()
            };
            view.load().await?;
            if let Some(sort) = sort {
                let field = match sort {
                    SortArg::Clicks => SortField::Clicks,
                    SortArg::Date => SortField::CreatedAt,
                };
                let direction = if desc {
                    SortDirection::Descending
                } else {
                    SortDirection::Ascending
                };
                view.sort_by(SortSpec::new(field, direction));
            }
            print_links(&view.links(), json)?;
        }
        Commands::Delete { id } => {
            let view = ctx.history_view();
            view.load().await?;
            let secret = view
                .links()
                .get(&id)
                .and_then(|record| record.secret_key.clone());
            view.delete(&id, secret.as_ref()).await?;
        }
        Commands::Copy { id } => {
            let view = ctx.history_view();
            view.load().await?;
            let short_url = view.copy_short_url(&id)?;
            println!("{}", short_url);
        }
        Commands::Stats => {
            let panel = ctx.stats_panel();
            let stats = panel.load().await?;
            if json {
                print_json(&stats)?;
            } else {
                println!("Total links:  {}", stats.total_links);
                println!("Total clicks: {}", stats.total_clicks);
                println!("Active links: {}", stats.active_links);
            }
        }
        Commands::Qr { key, out } => {
            let mut view = ctx.qr.open(&key);
            let asset = view.settled().await;
            match (&asset.state, out) {
                (QrState::Ready, Some(dir)) => {
                    if let Some(path) = ctx.qr.download(&asset, &dir).await? {
                        println!("{}", path.display());
                    }
                }
                (QrState::Ready, None) => {
                    println!("{}", asset.data_url().unwrap_or_default());
                }
                (QrState::Failed(message), _) => anyhow::bail!("{}", message),
                (QrState::Loading, _) => anyhow::bail!("QR code did not finish loading"),
            }
        }
        Commands::Theme { mode } => {
            if let Some(mode) = mode {
                ctx.theme.set_mode(mode.into())?;
            }
            println!("{}", ctx.theme.mode());
        }
        Commands::Dashboard => {
            let dashboard = ctx.dashboard();
            let profile = dashboard.mount().await?;
            if let Some(profile) = profile {
                println!("Welcome, {}", profile.display_name());
            }
            let stats = dashboard.stats().target();
            println!(
                "{} links, {} clicks, {} active",
                stats.total_links, stats.total_clicks, stats.active_links
            );
            print_links(&dashboard.history().links(), json)?;
        }
    }

    Ok(())
}

fn password_or_prompt(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }

    eprint!("Password: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn print_links(links: &LinkCollection, json: bool) -> Result<()> {
    if json {
        return print_json(&links.records());
    }

    if links.is_empty() {
        println!("No links yet.");
        return Ok(());
    }

    println!("{:<10} {:<40} {:>7}  {:<8} {}", "ID", "SHORT URL", "CLICKS", "STATUS", "CREATED");
    for link in links {
        println!(
            "{:<10} {:<40} {:>7}  {:<8} {}",
            link.id,
            link.short_url,
            link.clicks,
            if link.is_active() { "active" } else { "inactive" },
            link.created_at.format("%Y-%m-%d %H:%M"),
        );
        println!("           -> {}", link.original_url);
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_toasts(toasts: &mut broadcast::Receiver<Notification>) {
    while let Ok(toast) = toasts.try_recv() {
        let marker = match toast.level {
            NotificationLevel::Success => "✓",
            NotificationLevel::Error => "✗",
            NotificationLevel::Info => "•",
        };
        eprintln!("{} {}", marker, toast.message);
    }
}
