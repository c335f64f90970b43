//! keybox: a local password box
//!
//! Commands:
//!   init [-u]                  - create the box, or change the master password
//!   add                        - add a password, or patch one with --id
//!   remove <ids..>             - remove by id, (category, account), or everything
//!   list                       - table of stored passwords
//!   find <word>                - search every field
//!   info <ids..>               - full detail as JSON
//!   upgrade                    - migrate the box file to the newest format
//!   generate [len]             - random passwords, no box needed
//!   config show                - display the effective configuration

mod generate;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};

use keybox_core::config::KeyboxConfig;
use keybox_core::types::short_id;
use keybox_store::{Entry, EntryPatch, FileRepository, PasswordBox};

use crate::generate::Charset;

const ROW_FORMAT_WIDTHS: [usize; 4] = [10, 15, 16, 16];

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "keybox",
    version,
    about = "Local password box",
    long_about = "keybox: keep credentials encrypted under one master password in a single file"
)]
struct Cli {
    /// Path to the keybox config.toml
    #[arg(long, env = "KEYBOX_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Box file (overrides config store.path)
    #[arg(long, env = "KEYBOX_FILE", global = true)]
    file: Option<PathBuf>,

    /// Master password (prompted when absent)
    #[arg(long, env = "KEYBOX_MASTER", hide_env_values = true, global = true)]
    master: Option<String>,

    /// Force debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the password box, or change its master password
    Init {
        /// Change the master password of an existing box
        #[arg(long, short = 'u')]
        update: bool,
    },

    /// Add a new password, or update an existing one with --id
    Add {
        /// Id (or unique id prefix) of the password to update
        #[arg(long)]
        id: Option<String>,
        #[arg(long, short = 'c')]
        category: Option<String>,
        #[arg(long, short = 'u')]
        account: Option<String>,
        /// Password value (prompted when absent)
        #[arg(long, short = 'p', env = "KEYBOX_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        #[arg(long)]
        site: Option<String>,
        /// Tag, repeatable; replaces all existing tags
        #[arg(long = "tag", short = 't')]
        tags: Vec<String>,
        /// Opaque extension data
        #[arg(long)]
        ext: Option<String>,
        /// Exclude from default listings
        #[arg(long, conflicts_with = "visible")]
        hidden: bool,
        /// Include in default listings again
        #[arg(long)]
        visible: bool,
    },

    /// Remove passwords by ids or (category, account)
    #[command(visible_aliases = ["rm", "del", "delete"])]
    Remove {
        ids: Vec<String>,
        /// Remove every match; with no ids, remove everything
        #[arg(long, short = 'a')]
        all: bool,
        #[arg(long, short = 'c', requires = "account", conflicts_with = "ids")]
        category: Option<String>,
        #[arg(long, short = 'u', requires = "category")]
        account: Option<String>,
    },

    /// List all passwords
    #[command(visible_alias = "ls")]
    List {
        /// Don't print the header line
        #[arg(long)]
        no_header: bool,
        /// Include hidden passwords
        #[arg(long, short = 'H')]
        hidden: bool,
    },

    /// Find passwords by id, category, account, password, site or tag
    Find {
        word: String,
        /// Print only the password
        #[arg(long, short = 'p')]
        just_password: bool,
        /// Print only the first match
        #[arg(long, short = 'f')]
        just_first: bool,
    },

    /// Show full information of passwords
    #[command(visible_alias = "show")]
    Info {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Show every match of an ambiguous id
        #[arg(long, short = 'a')]
        all: bool,
    },

    /// Upgrade the box file to the newest format
    #[command(visible_alias = "up")]
    Upgrade,

    /// Generate random passwords
    #[command(visible_alias = "gen")]
    Generate {
        /// Password length (default: config generate.length)
        len: Option<usize>,
        /// Number of passwords
        #[arg(long, short = 'n', default_value_t = 1,
              value_parser = clap::value_parser!(u16).range(1..))]
        number: u16,
        #[arg(long, short = 'd')]
        digit: bool,
        #[arg(long, short = 'c')]
        lower_char: bool,
        #[arg(long, short = 'C')]
        upper_char: bool,
        #[arg(long, short = 's')]
        special_char: bool,
        /// Custom special character set (default: config generate.special_chars)
        #[arg(long)]
        special_set: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (defaults merged with the config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = KeyboxConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;

    let level = if cli.debug { "debug" } else { config.log.level.as_str() };
    init_logging(level, &config.log.format);

    let box_path = cli
        .file
        .clone()
        .unwrap_or_else(|| expand_tilde(&config.store.path));
    tracing::debug!(config = %config_path.display(), file = %box_path.display(), "keybox starting");

    match cli.command {
        Commands::Init { update } => cmd_init(&box_path, cli.master, update),
        Commands::Add {
            id,
            category,
            account,
            password,
            site,
            tags,
            ext,
            hidden,
            visible,
        } => {
            let hidden = match (hidden, visible) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let patch = EntryPatch {
                id,
                category,
                account,
                password: None,
                site,
                tags: (!tags.is_empty()).then_some(tags),
                ext,
                hidden,
            };
            cmd_add(&box_path, cli.master, patch, password)
        }
        Commands::Remove {
            ids,
            all,
            category,
            account,
        } => cmd_remove(&box_path, cli.master, &ids, all, category.zip(account)),
        Commands::List { no_header, hidden } => {
            cmd_list(&box_path, cli.master, no_header, hidden)
        }
        Commands::Find {
            word,
            just_password,
            just_first,
        } => cmd_find(&box_path, cli.master, &word, just_password, just_first),
        Commands::Info { ids, all } => cmd_info(&box_path, cli.master, &ids, all),
        Commands::Upgrade => cmd_upgrade(&box_path, cli.master),
        Commands::Generate {
            len,
            number,
            digit,
            lower_char,
            upper_char,
            special_char,
            special_set,
        } => {
            let charset = Charset {
                digits: digit,
                lowercase: lower_char,
                uppercase: upper_char,
                special: special_char,
                special_set: special_set.unwrap_or_else(|| config.generate.special_chars.clone()),
            };
            cmd_generate(&charset, len.unwrap_or(config.generate.length), number.into())
        }
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
    }
}

// ── Config / logging ──────────────────────────────────────────────────────────

fn default_config_path() -> PathBuf {
    expand_tilde(Path::new("~/.config/keybox/config.toml"))
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

// ── Box helpers ───────────────────────────────────────────────────────────────

fn prompt_secret(prompt: &str) -> Result<SecretString> {
    let value = rpassword::prompt_password(prompt).context("reading password from terminal")?;
    Ok(SecretString::from(value))
}

/// Prompt twice and require both answers to agree.
fn prompt_confirmed(prompt: &str, repeat: &str, what: &str) -> Result<SecretString> {
    let first = prompt_secret(prompt)?;
    let second = prompt_secret(repeat)?;
    if first.expose_secret() != second.expose_secret() {
        bail!("{what} mismatch");
    }
    Ok(first)
}

fn master_password(flag: Option<String>) -> Result<SecretString> {
    match flag {
        Some(master) => Ok(SecretString::from(master)),
        None => prompt_secret("Type the master password: "),
    }
}

/// Open and unlock an existing box.
fn open_box(path: &Path, master: Option<String>) -> Result<PasswordBox<FileRepository>> {
    if !path.exists() {
        bail!(
            "password box not found at {}\nRun `keybox init` to create it.",
            path.display()
        );
    }
    let pwbox = PasswordBox::new(FileRepository::new(path));
    pwbox
        .init(master_password(master)?)
        .with_context(|| format!("opening {}", path.display()))?;
    Ok(pwbox)
}

fn format_updated_at(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

fn format_row(cols: [&str; 5]) -> String {
    let [w0, w1, w2, w3] = ROW_FORMAT_WIDTHS;
    format!(
        "{:<w0$}{:<w1$}{:<w2$}{:<w3$}{}",
        cols[0], cols[1], cols[2], cols[3], cols[4]
    )
}

fn format_entry(entry: &Entry) -> String {
    format_row([
        entry.short_id(),
        &entry.category,
        entry.plain_account.as_str(),
        entry.plain_password.as_str(),
        &format_updated_at(entry.last_updated_at),
    ])
}

// ── `keybox init` ─────────────────────────────────────────────────────────────

fn cmd_init(path: &Path, master: Option<String>, update: bool) -> Result<()> {
    if update {
        let pwbox = open_box(path, master)?;
        let new_master = prompt_confirmed(
            "Type a new master password: ",
            "Repeat the new master password: ",
            "new master password",
        )?;
        pwbox.update(new_master)?;
        println!("master password updated");
        return Ok(());
    }

    let master = match master {
        Some(master) => SecretString::from(master),
        None => prompt_confirmed(
            "Type the master password: ",
            "Repeat the master password: ",
            "master password",
        )?,
    };
    let pwbox = PasswordBox::new(FileRepository::new(path));
    pwbox
        .init(master)
        .with_context(|| format!("initializing {}", path.display()))?;
    println!(
        "password box ready: {} (version {}, {} passwords)",
        path.display(),
        pwbox.version(),
        pwbox.len()
    );
    Ok(())
}

// ── `keybox add` ──────────────────────────────────────────────────────────────

fn cmd_add(
    path: &Path,
    master: Option<String>,
    mut patch: EntryPatch,
    password: Option<String>,
) -> Result<()> {
    let pwbox = open_box(path, master)?;

    patch.password = match password {
        Some(password) => Some(password),
        None => {
            let password =
                prompt_confirmed("Type the password: ", "Repeat the password: ", "passwords")?;
            let password = password.expose_secret().to_owned();
            // An empty answer keeps the stored password when updating.
            if password.is_empty() && patch.id.is_some() {
                None
            } else {
                Some(password)
            }
        }
    };
    let (id, created) = pwbox.add(patch)?;
    println!(
        "password {} {}",
        short_id(&id),
        if created { "added" } else { "updated" }
    );
    Ok(())
}

// ── `keybox remove` ───────────────────────────────────────────────────────────

fn cmd_remove(
    path: &Path,
    master: Option<String>,
    ids: &[String],
    all: bool,
    by_account: Option<(String, String)>,
) -> Result<()> {
    if ids.is_empty() && by_account.is_none() && !all {
        bail!("nothing to remove: give ids, --category with --account, or --all");
    }
    let pwbox = open_box(path, master)?;

    let deleted = if !ids.is_empty() {
        pwbox.remove(ids, all)?
    } else if let Some((category, account)) = by_account {
        pwbox.remove_by_account(&category, &account, all)?
    } else {
        let count = pwbox.clear()?;
        println!("deleted {count} passwords");
        return Ok(());
    };

    println!("deleted passwords:");
    for id in deleted {
        println!("{id}");
    }
    Ok(())
}

// ── `keybox list` ─────────────────────────────────────────────────────────────

fn cmd_list(path: &Path, master: Option<String>, no_header: bool, hidden: bool) -> Result<()> {
    let pwbox = open_box(path, master)?;
    if !no_header {
        println!(
            "{}",
            format_row(["ID", "CATEGORY", "ACCOUNT", "PASSWORD", "UPDATED_AT"])
        );
    }
    for entry in pwbox.list(hidden)? {
        println!("{}", format_entry(&entry));
    }
    Ok(())
}

// ── `keybox find` ─────────────────────────────────────────────────────────────

fn cmd_find(
    path: &Path,
    master: Option<String>,
    word: &str,
    just_password: bool,
    just_first: bool,
) -> Result<()> {
    let pwbox = open_box(path, master)?;
    if just_password {
        for password in pwbox.find_passwords(word, just_first)? {
            println!("{password}");
        }
        return Ok(());
    }
    for entry in pwbox.find(word, just_first)? {
        println!("{}", format_entry(&entry));
    }
    Ok(())
}

// ── `keybox info` ─────────────────────────────────────────────────────────────

fn cmd_info(path: &Path, master: Option<String>, ids: &[String], all: bool) -> Result<()> {
    let pwbox = open_box(path, master)?;
    for detail in pwbox.inspect(ids, all)? {
        let rendered =
            serde_json::to_string_pretty(&detail).context("serializing password detail")?;
        println!("{rendered}");
    }
    Ok(())
}

// ── `keybox upgrade` ──────────────────────────────────────────────────────────

fn cmd_upgrade(path: &Path, master: Option<String>) -> Result<()> {
    let pwbox = open_box(path, master)?;
    let (from, to) = pwbox.upgrade()?;
    println!("upgrade from {from} to {to}");
    Ok(())
}

// ── `keybox generate` ─────────────────────────────────────────────────────────

fn cmd_generate(charset: &Charset, length: usize, count: usize) -> Result<()> {
    for password in generate::generate(charset, length, count)? {
        println!("{password}");
    }
    Ok(())
}

// ── `keybox config show` ──────────────────────────────────────────────────────

fn cmd_config_show(config: &KeyboxConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
