//! press-creds - Credential management tool for Presscast
//!
//! Stores, lists, deletes and tests the secrets each network needs, and runs
//! the OAuth flows for X, LinkedIn and Facebook.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use libpresscast::credentials::{self, CredentialManager};
use libpresscast::oauth::{self, OAuthHandler};
use libpresscast::platforms::{build_platform, Platform};
use libpresscast::wordpress;
use libpresscast::{Config, PlatformKind};
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing::error;

#[derive(Parser)]
#[command(name = "press-creds")]
#[command(version)]
#[command(about = "Manage Presscast platform credentials securely", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store one credential value
    Set {
        /// Platform name (x, linkedin, bluesky, facebook, wordpress)
        platform: String,

        /// Credential key, e.g. app_password or access_token
        key: String,

        /// Read the value from stdin (for automation)
        #[arg(long)]
        stdin: bool,
    },

    /// List stored credentials (without showing values)
    List {
        /// Filter by platform (optional)
        #[arg(long)]
        platform: Option<String>,
    },

    /// Delete one credential, or every credential of a platform
    Delete {
        /// Platform name (x, linkedin, bluesky, facebook, wordpress)
        platform: String,

        /// Credential key (default: every key of the platform)
        key: Option<String>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Test credentials by authenticating with the platform
    Test {
        /// Platform name, or --all for every enabled platform
        platform: Option<String>,

        /// Test all enabled platforms
        #[arg(short, long)]
        all: bool,
    },

    /// Authorize Presscast through the platform's OAuth flow
    Oauth {
        /// Platform name (x, linkedin, facebook)
        platform: String,
    },
}

/// Something `press-creds` can hold secrets for
#[derive(Debug, Clone, Copy, PartialEq)]
enum Target {
    Platform(PlatformKind),
    WordPress,
}

impl Target {
    fn parse(name: &str) -> Result<Self> {
        if name.trim().eq_ignore_ascii_case("wordpress") {
            return Ok(Target::WordPress);
        }
        name.parse::<PlatformKind>()
            .map(Target::Platform)
            .map_err(|_| {
                anyhow::anyhow!(
                    "Unknown platform: {}. Supported platforms: x, linkedin, bluesky, facebook, wordpress",
                    name
                )
            })
    }

    fn name(&self) -> &'static str {
        match self {
            Target::Platform(kind) => kind.as_str(),
            Target::WordPress => "wordpress",
        }
    }

    fn service(&self) -> String {
        match self {
            Target::Platform(kind) => kind.service(),
            Target::WordPress => wordpress::CREDENTIAL_SERVICE.to_string(),
        }
    }

    fn keys(&self) -> &'static [&'static str] {
        match self {
            Target::Platform(kind) => credentials::known_keys(*kind),
            Target::WordPress => &[wordpress::APP_PASSWORD_KEY],
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = libpresscast::logging::LoggingConfig::from_env(cli.verbose);
    if std::env::var("PRESSCAST_LOG_LEVEL").is_err() && !cli.verbose {
        logging.level = "warn".to_string();
    }
    logging.init();

    if let Err(e) = run_command(cli.command).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run_command(command: Commands) -> Result<()> {
    let config = Config::load()?;
    let manager = CredentialManager::new(config.credentials.clone())?;

    match command {
        Commands::Set {
            platform,
            key,
            stdin,
        } => set_credential(&manager, &platform, &key, stdin),
        Commands::List { platform } => list_credentials(&manager, platform.as_deref()),
        Commands::Delete {
            platform,
            key,
            force,
        } => delete_credentials(&manager, &platform, key.as_deref(), force),
        Commands::Test { platform, all } => {
            if all {
                test_all_credentials(&config, &manager).await
            } else if let Some(platform) = platform {
                test_credentials(&config, &manager, &platform).await
            } else {
                anyhow::bail!("Either specify a platform or use --all flag");
            }
        }
        Commands::Oauth { platform } => authorize(config, manager, &platform).await,
    }
}

fn set_credential(manager: &CredentialManager, platform: &str, key: &str, use_stdin: bool) -> Result<()> {
    let target = Target::parse(platform)?;
    if !target.keys().contains(&key) {
        anyhow::bail!(
            "Unknown key '{}' for {}. Known keys: {}",
            key,
            target.name(),
            target.keys().join(", ")
        );
    }
    let service = target.service();

    // If a credential already exists, require explicit confirmation before overwriting
    if manager.exists(&service, key)? {
        if use_stdin || !atty::is(atty::Stream::Stdin) {
            anyhow::bail!(
                "{}.{} already exists. Refusing to overwrite in non-interactive mode. \
                 Run interactively or delete first with 'press-creds delete {} {}'.",
                target.name(),
                key,
                target.name(),
                key
            );
        }
        println!(
            "\n⚠️  {}.{} already exists. This will OVERWRITE the existing secret.",
            target.name(),
            key
        );
        if !confirm("Type 'overwrite' to confirm (or anything else to cancel): ", "overwrite")? {
            println!("Cancelled");
            return Ok(());
        }
    }

    let value = if use_stdin {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read stdin")?;
        buffer.trim().to_string()
    } else {
        if !atty::is(atty::Stream::Stdin) {
            anyhow::bail!("Not a TTY. Use --stdin flag to read credentials from stdin for automation.");
        }
        rpassword::prompt_password(format!("Enter {} {}: ", target.name(), key))?
            .trim()
            .to_string()
    };

    if value.is_empty() {
        anyhow::bail!("Credential value cannot be empty");
    }

    manager.store(&service, key, &value)?;

    println!(
        "✓ Stored {}.{} securely using {} backend",
        target.name(),
        key,
        manager.primary_backend().unwrap_or("unknown")
    );

    Ok(())
}

fn list_credentials(manager: &CredentialManager, platform_filter: Option<&str>) -> Result<()> {
    let targets = match platform_filter {
        Some(name) => vec![Target::parse(name)?],
        None => all_targets(),
    };
    let backend = manager.primary_backend().unwrap_or("unknown");

    println!("Stored credentials:");
    println!();

    let mut found_any = false;
    for target in targets {
        let service = target.service();
        for key in target.keys() {
            if manager.exists(&service, key)? {
                println!("  ✓ {}: {} (stored in {})", target.name(), key, backend);
                found_any = true;
            }
        }

        if let Target::Platform(kind) = target {
            if let Some(token) = manager.load_oauth_token(kind)? {
                match token.expires_at {
                    Some(at) => println!(
                        "    OAuth token expires {}",
                        libpresscast::scheduling::format_timestamp(at)
                    ),
                    None => println!("    OAuth token does not expire"),
                }
            }
        }
    }

    if !found_any {
        println!("  No credentials found.");
        println!();
        println!("Use 'press-creds set <platform> <key>' to store credentials.");
    }

    Ok(())
}

fn delete_credentials(manager: &CredentialManager, platform: &str, key: Option<&str>, force: bool) -> Result<()> {
    let target = Target::parse(platform)?;
    let service = target.service();

    let keys: Vec<&str> = match key {
        Some(key) if !target.keys().contains(&key) => anyhow::bail!(
            "Unknown key '{}' for {}. Known keys: {}",
            key,
            target.name(),
            target.keys().join(", ")
        ),
        Some(key) => vec![key],
        None => target.keys().to_vec(),
    };

    let mut present = Vec::new();
    for key in keys {
        if manager.exists(&service, key)? {
            present.push(key);
        }
    }

    if present.is_empty() {
        println!("No credentials found for {}", target.name());
        return Ok(());
    }

    if !force {
        if !atty::is(atty::Stream::Stdin) {
            anyhow::bail!("Not a TTY. Use --force to delete without confirmation.");
        }
        let prompt = format!(
            "Delete {} from {}? Type 'yes' to confirm: ",
            present.join(", "),
            target.name()
        );
        if !confirm(&prompt, "yes")? {
            println!("Cancelled");
            return Ok(());
        }
    }

    for key in &present {
        manager.delete(&service, key)?;
    }

    println!("✓ Deleted {} credential(s) for {}", present.len(), target.name());
    Ok(())
}

async fn test_credentials(config: &Config, manager: &CredentialManager, platform: &str) -> Result<()> {
    let kind = match Target::parse(platform)? {
        Target::Platform(kind) => kind,
        Target::WordPress => return test_wordpress(config, manager).await,
    };

    println!("Testing {} credentials...", kind.display_name());

    let mut client = build_platform(kind, config, manager)
        .with_context(|| format!("{} credentials are incomplete", kind.display_name()))?;
    client
        .authenticate()
        .await
        .with_context(|| format!("{} rejected the credentials", kind.display_name()))?;

    println!("✓ {} credentials are valid", kind.display_name());
    Ok(())
}

async fn test_wordpress(config: &Config, manager: &CredentialManager) -> Result<()> {
    let settings = config
        .wordpress
        .as_ref()
        .context("No [wordpress] section in the config")?;

    println!("Testing WordPress credentials...");

    let client = wordpress::WordPressClient::from_config(settings, manager)?;
    client
        .check_auth()
        .await
        .context("WordPress rejected the credentials")?;

    println!("✓ WordPress credentials are valid for {}", client.site_url());
    Ok(())
}

async fn test_all_credentials(config: &Config, manager: &CredentialManager) -> Result<()> {
    println!("Testing all platform credentials...");
    println!();

    let mut passed = 0;
    let mut failed = 0;

    for kind in PlatformKind::ALL {
        if !config.is_enabled(kind) {
            continue;
        }
        match test_credentials(config, manager, kind.as_str()).await {
            Ok(()) => passed += 1,
            Err(e) => {
                println!("✗ {}: {:#}", kind.display_name(), e);
                failed += 1;
            }
        }
    }

    println!();
    println!("Summary: {} passed, {} failed", passed, failed);

    if failed > 0 {
        anyhow::bail!("{} platform(s) failed the credential test", failed);
    }

    Ok(())
}

async fn authorize(config: Config, manager: CredentialManager, platform: &str) -> Result<()> {
    let kind = match Target::parse(platform)? {
        Target::Platform(kind) => kind,
        Target::WordPress => anyhow::bail!("WordPress uses application passwords, not OAuth"),
    };

    if !atty::is(atty::Stream::Stdin) {
        anyhow::bail!("Not a TTY. The OAuth flow needs an interactive terminal.");
    }

    let handler = OAuthHandler::new(config, Arc::new(manager))?;
    let request = handler.begin(kind).await?;

    println!("Open this URL in a browser and grant access:");
    println!();
    println!("  {}", request.url);
    println!();
    if kind == PlatformKind::X {
        print!("Paste the PIN shown by X: ");
    } else {
        print!("Paste the URL you were redirected to: ");
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    if input.trim().is_empty() {
        anyhow::bail!("Nothing pasted, authorization cancelled");
    }

    let (code, state) = oauth::parse_callback(&input);
    let completed = handler.complete(&request, &code, state.as_deref()).await?;

    println!("✓ Authorized {}", kind.display_name());
    if let Some(account) = &completed.account {
        println!("  Account: {}", account);
    }
    if let Some(at) = completed.expires_at {
        println!(
            "  Token expires {}",
            libpresscast::scheduling::format_timestamp(at)
        );
    }
    Ok(())
}

fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim() == expected)
}

fn all_targets() -> Vec<Target> {
    PlatformKind::ALL
        .into_iter()
        .map(Target::Platform)
        .chain(std::iter::once(Target::WordPress))
        .collect()
}
