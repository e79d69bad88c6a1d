use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};

use mail_dispenser::config::{Config, load_config, resolve_db_path};
use mail_dispenser::daemon::schedule::now_epoch;
use mail_dispenser::daemon::{DaemonConfig, run_daemon};
use mail_dispenser::domain::email::{ExpirationPolicy, MessageId, OpenTarget, TimeUnit};
use mail_dispenser::format::{format_epoch, format_remaining, format_size};
use mail_dispenser::mail::api::{HttpMailboxApi, MailboxApi};
use mail_dispenser::mail::decoders::render_body;
use mail_dispenser::store::lifecycle::{
    EmailStore, notification_permission, set_notification_permission, time_remaining,
};
use mail_dispenser::store::sqlite::SqliteStorage;
use mail_dispenser::terminal::run_tui;

#[derive(Parser)]
#[command(name = "mail_dispenser")]
#[command(about = "Disposable email addresses with expiry tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args)]
struct PolicyArgs {
    /// Keep the address until it is deleted by hand
    #[arg(long, conflicts_with_all = ["hours", "custom"])]
    never: bool,

    /// Expire after this many hours
    #[arg(long, conflicts_with = "custom", allow_negative_numbers = true)]
    hours: Option<f64>,

    /// Expire after a custom amount of --unit
    #[arg(long, allow_hyphen_values = true)]
    custom: Option<String>,

    /// minutes, hours, days or weeks
    #[arg(long, requires = "custom")]
    unit: Option<String>,
}

impl PolicyArgs {
    /// The requested policy, rejected up front so a bad flag never costs a mailbox.
    fn policy(&self, cfg: &Config) -> Result<ExpirationPolicy> {
        let policy = if self.never {
            ExpirationPolicy::Never
        } else if let Some(h) = self.hours {
            ExpirationPolicy::Hours(h)
        } else if let Some(m) = &self.custom {
            let unit: TimeUnit = self.unit.as_deref().unwrap_or("hours").parse()?;
            ExpirationPolicy::custom(m, unit)?
        } else {
            cfg.default_policy()
        };
        policy.lifetime_secs()?;
        Ok(policy)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Generate a new address and start tracking it
    Generate {
        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Show tracked addresses and their time left
    List,

    /// Fetch and list the messages of an address
    Inbox { address: String },

    /// Show one message
    Read {
        address: String,
        id: MessageId,

        /// Open an attachment's download link in the browser
        #[arg(long)]
        open_attachment: Option<String>,

        /// Download an attachment into the current directory
        #[arg(long)]
        save: Option<String>,
    },

    /// Stop tracking an address
    Delete { address: String },

    /// Stop tracking every address
    Clear,

    /// Allow or deny desktop notifications for new mail
    Notifications {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },

    /// Run the daemon: sweep/poll/notify
    Daemon {
        /// Poll interval in seconds (defaults to the config value)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Run the TUI
    Tui {
        /// Open a message, as address#id (used by notification clicks)
        #[arg(long)]
        open: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let cfg = load_config().map_err(|e| anyhow!("Configuration error: {e}"))?;
    let db_path = resolve_db_path(&cfg)?;
    let mut store = EmailStore::restore(SqliteStorage::open(&db_path)?)?;
    let api = HttpMailboxApi::new(&cfg.api_base)?;
    let now = now_epoch();

    match cli.cmd {
        Command::Generate { policy } => {
            let policy = policy.policy(&cfg)?;
            let address = store.generate(&api)?;
            store.commit(&address, policy, now)?;
            println!("{address}");
            Ok(())
        }

        Command::List => {
            store.sweep_expired(now)?;
            if store.is_empty() {
                println!("No addresses. Run: mail_dispenser generate");
                return Ok(());
            }
            let width = store
                .entries()
                .iter()
                .map(|e| e.address.len())
                .max()
                .unwrap_or(0);
            println!("{:<width$}  {:<16}  {:>10}  MSGS", "ADDRESS", "CREATED", "LEFT");
            for e in store.entries() {
                println!(
                    "{:<width$}  {:<16}  {:>10}  {}",
                    e.address,
                    format_epoch(e.created_at),
                    format_remaining(time_remaining(e, now)),
                    e.message_count
                );
            }
            Ok(())
        }

        Command::Inbox { address } => {
            let messages = api.get_messages(&address)?;
            store.record_message_count(&address, messages.len() as u32)?;
            if messages.is_empty() {
                println!("No messages for {address}");
            }
            for m in &messages {
                println!("{:>10}  {}  {:<30}  {}", m.id, m.date, m.from, m.subject);
            }
            Ok(())
        }

        Command::Read {
            address,
            id,
            open_attachment,
            save,
        } => {
            let msg = api.read_message(&address, id)?;
            println!("From:    {}", msg.from);
            println!("Subject: {}", msg.subject);
            println!("Date:    {}", msg.date);
            for att in &msg.attachments {
                println!(
                    "Attachment: {} ({}) {}",
                    att.filename,
                    format_size(att.size),
                    api.download_url(&address, id, &att.filename)?
                );
            }
            println!();
            println!("{}", render_body(&msg, 100));

            if let Some(file) = open_attachment {
                open::that(api.download_url(&address, id, &file)?.as_str())?;
            }
            if let Some(file) = save {
                let bytes = api.download(&address, id, &file)?;
                let name = std::path::Path::new(&file)
                    .file_name()
                    .ok_or_else(|| anyhow!("invalid file name {file}"))?;
                std::fs::write(name, &bytes)?;
                println!("Saved {} ({})", file, format_size(bytes.len() as u64));
            }
            Ok(())
        }

        Command::Delete { address } => {
            store.delete(&address)?;
            println!("Deleted {address}");
            Ok(())
        }

        Command::Clear => {
            store.clear()?;
            println!("Cleared all addresses");
            Ok(())
        }

        Command::Notifications { state } => {
            set_notification_permission(store.storage(), state == "on")?;
            println!(
                "Desktop notifications {}",
                if notification_permission(store.storage()) {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            Ok(())
        }

        Command::Daemon { interval } => run_daemon(
            &mut store,
            &api,
            DaemonConfig {
                poll_interval_secs: interval.unwrap_or(cfg.poll_interval_secs),
                terminal: cfg.terminal(),
            },
        ),

        Command::Tui { open } => {
            let open = match open {
                Some(s) => {
                    Some(OpenTarget::parse(&s).ok_or_else(|| anyhow!("expected address#id"))?)
                }
                None => None,
            };
            run_tui(store, Arc::new(api), cfg.poll_interval_secs, open)
        }
    }
}
