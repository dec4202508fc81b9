use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use portal_core::SchemaRegistry;
use portal_server::{AuthGate, ServerConfig};
use portal_sqlite::{Migration, Role, SeedReport, UserStore};
use rusqlite::Connection;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a tracing filter directive.
const LOG_ENV: &str = "PORTAL_LOG";

/// CLI-specific role enum with clap argument parsing support.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliRole {
    Admin,
    Client,
}

impl From<CliRole> for Role {
    fn from(role: CliRole) -> Self {
        match role {
            CliRole::Admin => Role::Admin,
            CliRole::Client => Role::Client,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "portal")]
#[command(about = "ISP portal data API server and administration")]
#[command(version)]
struct Cli {
    /// Log level for portal crates (overridden by PORTAL_LOG).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP data API.
    Serve(ServeArgs),
    /// Write a configuration file with default values.
    InitConfig(InitConfigArgs),
    /// SQLite table migration and seeding operations.
    Migrate(MigrateArgs),
    /// Manage portal accounts.
    User(UserArgs),
    /// Issue a signed session token for an account.
    Token(TokenArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// YAML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Socket address to bind (overrides the config file and PORTAL_LISTEN).
    #[arg(long)]
    listen: Option<String>,
    /// Database file path (overrides the config file and PORTAL_DB).
    #[arg(long)]
    db: Option<PathBuf>,
    /// Upload root directory.
    #[arg(long)]
    uploads: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct InitConfigArgs {
    /// Output YAML path.
    #[arg(long)]
    output: PathBuf,
    /// Overwrite an existing file.
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Args)]
struct MigrateArgs {
    #[command(subcommand)]
    operation: MigrateOperation,
}

#[derive(Debug, Subcommand)]
enum MigrateOperation {
    /// Create the portal tables.
    Up(DbArgs),
    /// Drop the portal tables.
    Down(DbArgs),
    /// Insert rows from `<table>.json` files in a directory.
    Seed(SeedArgs),
    /// Drop tables, recreate, and reseed from a directory.
    Refresh(SeedArgs),
    /// Show table status and row counts.
    Status(DbArgs),
}

#[derive(Debug, Args)]
struct DbArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
}

#[derive(Debug, Args)]
struct SeedArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Directory with `<table>.json` files.
    #[arg(long)]
    source: PathBuf,
}

#[derive(Debug, Args)]
struct UserArgs {
    #[command(subcommand)]
    operation: UserOperation,
}

#[derive(Debug, Subcommand)]
enum UserOperation {
    /// Create an active account.
    Add(UserAddArgs),
    /// Deactivate an account; its sessions stop working immediately.
    Disable(UserRefArgs),
    /// Reactivate an account.
    Enable(UserRefArgs),
    /// Change an account's role.
    Role(UserRoleArgs),
}

#[derive(Debug, Args)]
struct UserAddArgs {
    #[arg(long)]
    db: PathBuf,
    #[arg(long)]
    email: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long, value_enum, default_value = "client")]
    role: CliRole,
}

#[derive(Debug, Args)]
struct UserRefArgs {
    #[arg(long)]
    db: PathBuf,
    #[arg(long)]
    email: String,
}

#[derive(Debug, Args)]
struct UserRoleArgs {
    #[arg(long)]
    db: PathBuf,
    #[arg(long)]
    email: String,
    #[arg(long, value_enum)]
    role: CliRole,
}

#[derive(Debug, Args)]
struct TokenArgs {
    /// YAML configuration file providing the session settings.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Database file path (defaults to the configured one).
    #[arg(long)]
    db: Option<PathBuf>,
    /// Account email.
    #[arg(long)]
    email: String,
    /// Print a complete `Set-Cookie` value instead of the bare token.
    #[arg(long)]
    cookie: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let result = match cli.command {
        Command::Serve(args) => run_serve(args),
        Command::InitConfig(args) => run_init_config(args),
        Command::Migrate(args) => run_migrate(args),
        Command::User(args) => run_user(args),
        Command::Token(args) => run_token(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| {
            EnvFilter::try_new(format!(
                "portal_cli={level},portal_server={level},portal_sqlite={level}"
            ))
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

/// Loads the configuration file (or defaults) and applies environment
/// overrides.
fn load_config(path: Option<&Path>) -> Result<ServerConfig, String> {
    let mut config = match path {
        Some(path) => ServerConfig::load(path)
            .map_err(|e| format!("Failed to load config '{}': {e}", path.display()))?,
        None => ServerConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

fn open_db(path: &Path) -> Result<Connection, String> {
    Connection::open(path).map_err(|e| format!("Failed to open database '{}': {e}", path.display()))
}

fn open_migration(path: &Path) -> Result<Migration, String> {
    Migration::new(open_db(path)?, SchemaRegistry::portal())
        .map_err(|e| format!("Failed to initialize migration: {e}"))
}

// ---------------------------------------------------------------------------
// serve / init-config
// ---------------------------------------------------------------------------

fn run_serve(args: ServeArgs) -> Result<(), String> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.listen.address = listen;
    }
    if let Some(db) = args.db {
        config.database.path = db;
    }
    if let Some(uploads) = args.uploads {
        config.uploads.root = uploads;
    }
    config.validate().map_err(|e| e.to_string())?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start async runtime: {e}"))?;
    runtime
        .block_on(portal_server::serve(config))
        .map_err(|e| format!("Server failed: {e}"))
}

fn run_init_config(args: InitConfigArgs) -> Result<(), String> {
    if args.output.exists() && !args.force {
        return Err(format!(
            "'{}' already exists (use --force to overwrite)",
            args.output.display()
        ));
    }
    ServerConfig::default()
        .save(&args.output)
        .map_err(|e| format!("Failed to write config '{}': {e}", args.output.display()))?;
    println!(
        "Wrote default configuration to '{}'. Set session.secret (or PORTAL_SESSION_SECRET) before serving.",
        args.output.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// migrate command
// ---------------------------------------------------------------------------

fn run_migrate(args: MigrateArgs) -> Result<(), String> {
    match args.operation {
        MigrateOperation::Up(a) => run_migrate_up(a),
        MigrateOperation::Down(a) => run_migrate_down(a),
        MigrateOperation::Seed(a) => run_migrate_seed(a),
        MigrateOperation::Refresh(a) => run_migrate_refresh(a),
        MigrateOperation::Status(a) => run_migrate_status(a),
    }
}

fn run_migrate_up(args: DbArgs) -> Result<(), String> {
    let mut migration = open_migration(&args.db)?;
    migration
        .up()
        .map_err(|e| format!("Migration up failed: {e}"))?;
    println!(
        "Migration up complete. Tables created in '{}'.",
        args.db.display()
    );
    Ok(())
}

fn run_migrate_down(args: DbArgs) -> Result<(), String> {
    let mut migration = open_migration(&args.db)?;
    migration
        .down()
        .map_err(|e| format!("Migration down failed: {e}"))?;
    println!(
        "Migration down complete. Tables dropped from '{}'.",
        args.db.display()
    );
    Ok(())
}

fn run_migrate_seed(args: SeedArgs) -> Result<(), String> {
    let mut migration = open_migration(&args.db)?;
    let report = migration
        .seed(&args.source)
        .map_err(|e| format!("Seed failed: {e}"))?;
    println!("Seed complete:");
    print_seed_report(&report);
    Ok(())
}

fn run_migrate_refresh(args: SeedArgs) -> Result<(), String> {
    let mut migration = open_migration(&args.db)?;
    let report = migration
        .refresh(&args.source)
        .map_err(|e| format!("Refresh failed: {e}"))?;
    println!("Refresh complete (tables dropped, recreated, and reseeded):");
    print_seed_report(&report);
    Ok(())
}

fn print_seed_report(report: &SeedReport) {
    for (table, rows) in &report.rows_inserted {
        println!("  {table}: {rows} rows");
    }
    println!("  Total rows inserted: {}", report.total_rows());
    for path in &report.skipped_files {
        println!("  Skipped (no such table): {}", path.display());
    }
}

fn run_migrate_status(args: DbArgs) -> Result<(), String> {
    let migration = open_migration(&args.db)?;
    let status = migration
        .status()
        .map_err(|e| format!("Failed to get migration status: {e}"))?;
    println!("Migration Status:");
    println!(
        "  Tables exist: {}",
        if status.tables_exist { "yes" } else { "no" }
    );
    for table in &status.tables {
        if table.exists {
            println!("  {}: {} rows", table.name, table.row_count);
        } else {
            println!("  {}: missing", table.name);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// user command
// ---------------------------------------------------------------------------

fn run_user(args: UserArgs) -> Result<(), String> {
    match args.operation {
        UserOperation::Add(a) => run_user_add(a),
        UserOperation::Disable(a) => run_user_set_active(a, false),
        UserOperation::Enable(a) => run_user_set_active(a, true),
        UserOperation::Role(a) => run_user_role(a),
    }
}

fn find_user_id(store: &UserStore<'_>, email: &str) -> Result<i64, String> {
    store
        .find_by_email(email)
        .map_err(|e| format!("Failed to look up '{email}': {e}"))?
        .map(|user| user.id)
        .ok_or_else(|| format!("No account with email '{email}'"))
}

fn run_user_add(args: UserAddArgs) -> Result<(), String> {
    let conn = open_db(&args.db)?;
    let user = UserStore::new(&conn)
        .create_user(&args.email, args.name.as_deref(), args.role.into())
        .map_err(|e| format!("Failed to create account '{}': {e}", args.email))?;
    info!(user_id = user.id, role = %user.role, "Account created");
    println!("Created {} account {} ({}).", user.role, user.email, user.id);
    Ok(())
}

fn run_user_set_active(args: UserRefArgs, active: bool) -> Result<(), String> {
    let conn = open_db(&args.db)?;
    let store = UserStore::new(&conn);
    let id = find_user_id(&store, &args.email)?;
    store
        .set_active(id, active)
        .map_err(|e| format!("Failed to update '{}': {e}", args.email))?;
    println!(
        "Account {} {}.",
        args.email,
        if active { "enabled" } else { "disabled" }
    );
    Ok(())
}

fn run_user_role(args: UserRoleArgs) -> Result<(), String> {
    let conn = open_db(&args.db)?;
    let store = UserStore::new(&conn);
    let id = find_user_id(&store, &args.email)?;
    let role = Role::from(args.role);
    store
        .set_role(id, role)
        .map_err(|e| format!("Failed to update '{}': {e}", args.email))?;
    println!("Account {} is now {role}.", args.email);
    Ok(())
}

// ---------------------------------------------------------------------------
// token command
// ---------------------------------------------------------------------------

fn run_token(args: TokenArgs) -> Result<(), String> {
    let config = load_config(args.config.as_deref())?;
    config.validate().map_err(|e| e.to_string())?;
    let db = args.db.unwrap_or_else(|| config.database.path.clone());

    let conn = open_db(&db)?;
    let user = UserStore::new(&conn)
        .find_by_email(&args.email)
        .map_err(|e| format!("Failed to look up '{}': {e}", args.email))?
        .ok_or_else(|| format!("No account with email '{}'", args.email))?;
    if !user.is_active_admin() {
        eprintln!(
            "warning: {} is not an active admin; the data API will reject this token",
            user.email
        );
    }

    let gate = AuthGate::new(&config.session).map_err(|e| e.to_string())?;
    let token = gate
        .signer()
        .issue(&user)
        .map_err(|e| format!("Failed to issue token: {e}"))?;
    let claims = gate
        .signer()
        .verify(&token)
        .map_err(|e| format!("Issued token does not verify: {e}"))?;
    if let Some(expires) = chrono::DateTime::from_timestamp(claims.exp, 0) {
        eprintln!("Token for {} expires {}", user.email, expires.to_rfc3339());
    }

    if args.cookie {
        println!("{}", gate.session_cookie(&token));
    } else {
        println!("{token}");
    }
    Ok(())
}
