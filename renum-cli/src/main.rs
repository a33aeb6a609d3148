//! Renum Administration CLI
//!
//! One binary replaces the operational script sprawl: database probes,
//! migrations, password resets, schema cache reloads, and vault key
//! generation all live behind subcommands.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use renum_api::{DbConfig, Gateway, Vault};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "renum", about = "Renum backend administration", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Database operations
    #[command(subcommand)]
    Db(DbCommand),
    /// User operations (via the managed auth provider)
    #[command(subcommand)]
    User(UserCommand),
    /// Schema cache operations
    #[command(subcommand)]
    Schema(SchemaCommand),
    /// Vault key operations
    #[command(subcommand)]
    Key(KeyCommand),
}

#[derive(Subcommand)]
enum DbCommand {
    /// Check database connectivity
    Check,
    /// Apply pending SQL migrations
    Migrate {
        /// Directory holding numbered .sql files
        #[arg(long, default_value = "migrations")]
        dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    /// Reset a user's password via the managed auth provider
    ResetPassword {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

#[derive(Subcommand)]
enum SchemaCommand {
    /// Ask the provider to reload its schema cache and wait for a round-trip
    Reload,
}

#[derive(Subcommand)]
enum KeyCommand {
    /// Generate a fresh base64 ENCRYPTION_KEY
    Generate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "renum_cli=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Db(DbCommand::Check) => db_check().await,
        Command::Db(DbCommand::Migrate { dir }) => db_migrate(&dir).await,
        Command::User(UserCommand::ResetPassword { email, password }) => {
            reset_password(&email, &password).await
        }
        Command::Schema(SchemaCommand::Reload) => schema_reload().await,
        Command::Key(KeyCommand::Generate) => {
            let key = Vault::generate_key_base64().map_err(|e| anyhow!("{}", e))?;
            println!("{}", key);
            Ok(())
        }
    }
}

fn gateway() -> Result<Gateway> {
    let config = DbConfig::from_env().map_err(|e| anyhow!("{}", e))?;
    Gateway::from_config(&config).map_err(|e| anyhow!("{}", e))
}

async fn db_check() -> Result<()> {
    let db = gateway()?;
    let version = db
        .query_scalar_text("SELECT version()")
        .await
        .map_err(|e| anyhow!("{}", e))?;
    let tables = db
        .query_scalar_text(
            "SELECT count(*)::text FROM information_schema.tables WHERE table_schema = 'public'",
        )
        .await
        .map_err(|e| anyhow!("{}", e))?;
    println!("connected: {}", version);
    println!("public tables: {}", tables);
    Ok(())
}

async fn db_migrate(dir: &PathBuf) -> Result<()> {
    let db = gateway()?;

    db.batch_execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
             name text PRIMARY KEY,
             applied_at timestamptz NOT NULL DEFAULT now()
         )",
    )
    .await
    .map_err(|e| anyhow!("{}", e))?;

    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("reading migration directory {:?}", dir))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|ext| ext == "sql").unwrap_or(false))
        .collect();
    entries.sort();
    if entries.is_empty() {
        bail!("no .sql migrations found in {:?}", dir);
    }

    let mut applied = 0usize;
    for path in entries {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("unreadable file name in {:?}", path))?
            .to_string();

        let already = db
            .query_scalar_text(&format!(
                "SELECT count(*)::text FROM schema_migrations WHERE name = '{}'",
                name.replace('\'', "''")
            ))
            .await
            .map_err(|e| anyhow!("{}", e))?;
        if already != "0" {
            continue;
        }

        let sql = std::fs::read_to_string(&path)
            .with_context(|| format!("reading migration {:?}", path))?;
        tracing::info!(migration = %name, "Applying");
        db.batch_execute(&sql).await.map_err(|e| anyhow!("{}", e))?;
        db.batch_execute(&format!(
            "INSERT INTO schema_migrations (name) VALUES ('{}')",
            name.replace('\'', "''")
        ))
        .await
        .map_err(|e| anyhow!("{}", e))?;
        applied += 1;
    }

    // The provider caches column metadata separately from DDL; reload and
    // wait for a round-trip before declaring the migration done.
    db.schema_reload().await.map_err(|e| anyhow!("{}", e))?;
    println!("applied {} migration(s)", applied);
    Ok(())
}

async fn schema_reload() -> Result<()> {
    let db = gateway()?;
    db.schema_reload().await.map_err(|e| anyhow!("{}", e))?;
    println!("schema cache reload requested");
    Ok(())
}

async fn reset_password(email: &str, password: &str) -> Result<()> {
    let base_url = std::env::var("SUPABASE_URL").context("SUPABASE_URL is not set")?;
    let service_key =
        std::env::var("SUPABASE_SERVICE_ROLE_KEY").context("SUPABASE_SERVICE_ROLE_KEY is not set")?;

    let client = reqwest::Client::new();
    let base = base_url.trim_end_matches('/');

    // Look the user up by email through the admin API.
    let users: serde_json::Value = client
        .get(format!("{}/auth/v1/admin/users", base))
        .query(&[("email", email)])
        .header("apikey", &service_key)
        .header("Authorization", format!("Bearer {}", service_key))
        .send()
        .await?
        .error_for_status()
        .context("admin user lookup failed")?
        .json()
        .await?;

    let user_id = users
        .get("users")
        .and_then(|u| u.as_array())
        .and_then(|list| {
            list.iter()
                .find(|u| u.get("email").and_then(|e| e.as_str()) == Some(email))
        })
        .and_then(|u| u.get("id"))
        .and_then(|id| id.as_str())
        .ok_or_else(|| anyhow!("no user with email {}", email))?
        .to_string();

    client
        .put(format!("{}/auth/v1/admin/users/{}", base, user_id))
        .header("apikey", &service_key)
        .header("Authorization", format!("Bearer {}", service_key))
        .json(&serde_json::json!({ "password": password }))
        .send()
        .await?
        .error_for_status()
        .context("password update failed")?;

    println!("password updated for {}", email);
    Ok(())
}
