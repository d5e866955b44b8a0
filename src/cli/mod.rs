//! CLI module for the badgenotes command-line interface.
//!
//! Without a subcommand the binary runs the reference server. Subcommands act
//! as a client of a running server:
//! - `login` / `register` / `logout` / `whoami` - Manage the cached session
//! - `companies`, `employees`, `notes` - Browse the backend
//! - `scan` - Capture notes with a keyboard-wedge badge scanner
//! - `note <employee>` - Capture a note for an employee picked by id or number
//! - `export` - Download the note report
//! - `config check` - Validate configuration file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::capture::{CaptureState, NoteCaptureController};
use crate::client::{BackendStore, HttpBackend};
use crate::config::Config;
use crate::db::Employee;
use crate::error::Error;
use crate::scanner::{stdin_lines, Scanner, SharedLines, SymbologyDecoder, WedgeCamera};
use crate::session::{Session, SessionContext, SessionManager, SessionStore};

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "badgenotes")]
#[command(author, version, about = "Badge-scan note capture for employee records", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "badgenotes.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Backend URL to connect to (overrides client.api_url)
    #[arg(long, env = "BADGENOTES_API_URL")]
    pub api_url: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in and cache the session
    Login {
        email: String,
        /// Password (prompted for if omitted)
        #[arg(long, env = "BADGENOTES_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Create a user account in an existing company
    Register {
        email: String,
        /// Company ID to join
        #[arg(long)]
        company: String,
        /// Password (prompted for if omitted)
        #[arg(long, env = "BADGENOTES_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Forget the cached session
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Company management commands (admin)
    #[command(subcommand)]
    Companies(CompaniesCommands),

    /// Employee commands
    #[command(subcommand)]
    Employees(EmployeesCommands),

    /// Note commands
    #[command(subcommand)]
    Notes(NotesCommands),

    /// Scan badges and capture notes until interrupted
    Scan,

    /// Capture a note for an employee without scanning
    Note {
        /// Employee ID or employee number
        employee: String,
    },

    /// Download the note report as CSV
    Export {
        /// Target directory (default: client.export_dir)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Companies subcommands
#[derive(Subcommand, Debug)]
pub enum CompaniesCommands {
    /// List all companies
    List,
    /// Create a company
    Create { name: String },
    /// Show a company
    Show { id: String },
}

/// Employees subcommands
#[derive(Subcommand, Debug)]
pub enum EmployeesCommands {
    /// List the employees of your company
    List,
    /// Show an employee and their notes
    Show {
        /// Employee ID or employee number
        employee: String,
    },
}

/// Notes subcommands
#[derive(Subcommand, Debug)]
pub enum NotesCommands {
    /// List notes, newest first
    List {
        /// Only notes of this employee (ID or employee number)
        #[arg(long)]
        employee: Option<String>,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

// ============================================================================
// Client context
// ============================================================================

/// Backend connection plus the cached session
struct ClientContext {
    config: Config,
    backend: Arc<HttpBackend>,
    sessions: SessionManager,
}

impl ClientContext {
    fn connect(config: &Config) -> Result<Self> {
        let store = SessionStore::new(&config.client.session_file);
        let session = SessionContext::load(store).context("Failed to read the session file")?;
        let backend = Arc::new(
            HttpBackend::new(&config.client, session.clone())
                .context("Failed to create HTTP client")?,
        );

        Ok(Self {
            config: config.clone(),
            sessions: SessionManager::new(backend.clone(), session),
            backend,
        })
    }

    fn session(&self) -> Result<Session> {
        self.sessions
            .context()
            .require_session()
            .map_err(|_| anyhow::anyhow!("Not logged in. Run `badgenotes login <email>` first."))
    }

    /// Convert a client error for display, dropping the session when the
    /// backend refused it
    fn fail(&self, error: Error) -> anyhow::Error {
        if self.sessions.invalidate_on_auth_failure(&error) {
            return anyhow::anyhow!(
                "{}. The cached session was cleared; log in again.",
                error
            );
        }
        match error {
            Error::Network(e) => anyhow::anyhow!(
                "Failed to connect to {}: {}. {}",
                self.config.client.api_url,
                e,
                RETRY_HINT
            ),
            other if other.is_retryable() => anyhow::anyhow!("{}. {}", other, RETRY_HINT),
            other => other.into(),
        }
    }
}

const RETRY_HINT: &str = "This is usually temporary; try again.";

/// Operator-facing message, with a retry hint for transient failures
fn describe(error: &Error) -> String {
    if error.is_retryable() {
        format!("{}. {}", error, RETRY_HINT)
    } else {
        error.to_string()
    }
}

// ============================================================================
// CLI Command Handlers
// ============================================================================

/// Run a CLI command
pub async fn run_command(cli: &Cli, config: &Config) -> Result<()> {
    let Some(command) = &cli.command else {
        // No subcommand means start the server - this is handled in main.rs
        return Ok(());
    };
    if let Commands::Config(ConfigCommands::Check) = command {
        return cmd_config_check(cli).await;
    }

    let ctx = ClientContext::connect(config)?;
    match command {
        Commands::Login { email, password } => cmd_login(&ctx, email, password.as_deref()).await,
        Commands::Register {
            email,
            company,
            password,
        } => cmd_register(&ctx, email, company, password.as_deref()).await,
        Commands::Logout => cmd_logout(&ctx),
        Commands::Whoami => cmd_whoami(&ctx).await,
        Commands::Companies(CompaniesCommands::List) => cmd_companies_list(&ctx).await,
        Commands::Companies(CompaniesCommands::Create { name }) => {
            cmd_companies_create(&ctx, name).await
        }
        Commands::Companies(CompaniesCommands::Show { id }) => cmd_companies_show(&ctx, id).await,
        Commands::Employees(EmployeesCommands::List) => cmd_employees_list(&ctx).await,
        Commands::Employees(EmployeesCommands::Show { employee }) => {
            cmd_employees_show(&ctx, employee).await
        }
        Commands::Notes(NotesCommands::List { employee }) => {
            cmd_notes_list(&ctx, employee.as_deref()).await
        }
        Commands::Scan => cmd_scan(&ctx).await,
        Commands::Note { employee } => cmd_note(&ctx, employee).await,
        Commands::Export { dir } => cmd_export(&ctx, dir.as_ref()).await,
        Commands::Config(ConfigCommands::Check) => Ok(()),
    }
}

async fn cmd_login(ctx: &ClientContext, email: &str, password: Option<&str>) -> Result<()> {
    let password = match password {
        Some(password) => password.to_string(),
        None => read_password(&stdin_lines()).await?,
    };

    let session = ctx
        .sessions
        .login(email, &password)
        .await
        .map_err(|e| ctx.fail(e))?;

    println!(
        "[OK] Logged in as {} ({})",
        session.user.email,
        session.role()
    );
    Ok(())
}

async fn cmd_register(
    ctx: &ClientContext,
    email: &str,
    company_id: &str,
    password: Option<&str>,
) -> Result<()> {
    let password = match password {
        Some(password) => password.to_string(),
        None => read_password(&stdin_lines()).await?,
    };

    let session = ctx
        .sessions
        .register(email, &password, company_id)
        .await
        .map_err(|e| ctx.fail(e))?;

    println!(
        "[OK] Registered {} in company {}",
        session.user.email, session.user.company_id
    );
    Ok(())
}

fn cmd_logout(ctx: &ClientContext) -> Result<()> {
    ctx.sessions.logout()?;
    println!("[OK] Logged out");
    Ok(())
}

async fn cmd_whoami(ctx: &ClientContext) -> Result<()> {
    ctx.session()?;
    let user = ctx.sessions.current_user().await.map_err(|e| ctx.fail(e))?;

    println!();
    println!("Email:    {}", user.email);
    println!("Role:     {}", user.role);
    println!("User ID:  {}", user.id);
    println!("Company:  {}", user.company_id);
    println!("Server:   {}", ctx.backend.base_url());
    println!();
    Ok(())
}

/// List all companies
async fn cmd_companies_list(ctx: &ClientContext) -> Result<()> {
    ctx.session()?;
    let companies = ctx.backend.list_companies().await.map_err(|e| ctx.fail(e))?;

    if companies.is_empty() {
        println!("No companies found.");
        return Ok(());
    }

    println!();
    println!("{:<36}  {:<40}  {:<25}", "ID", "NAME", "CREATED");
    println!("{}", "-".repeat(105));
    for company in companies {
        println!(
            "{:<36}  {:<40}  {:<25}",
            company.id,
            truncate(&company.name, 40),
            company.created_at
        );
    }
    println!();
    Ok(())
}

async fn cmd_companies_create(ctx: &ClientContext, name: &str) -> Result<()> {
    ctx.session()?;
    let company = ctx
        .backend
        .create_company(name)
        .await
        .map_err(|e| ctx.fail(e))?;

    println!("[OK] Created company {}", company.name);
    println!("ID: {}", company.id);
    Ok(())
}

async fn cmd_companies_show(ctx: &ClientContext, id: &str) -> Result<()> {
    let company = ctx.backend.get_company(id).await.map_err(|e| ctx.fail(e))?;

    println!();
    println!("=== Company: {} ===", company.name);
    println!();
    println!("ID:       {}", company.id);
    println!("Created:  {}", company.created_at);
    println!();
    Ok(())
}

/// List the employees of the session's company
async fn cmd_employees_list(ctx: &ClientContext) -> Result<()> {
    ctx.session()?;
    let employees = ctx.backend.list_employees().await.map_err(|e| ctx.fail(e))?;

    if employees.is_empty() {
        println!("No employees found.");
        return Ok(());
    }

    println!();
    println!("{:<36}  {:<20}  {:<40}", "ID", "NUMBER", "NAME");
    println!("{}", "-".repeat(100));
    for employee in employees {
        println!(
            "{:<36}  {:<20}  {:<40}",
            employee.id,
            truncate(&employee.employee_number, 20),
            truncate(&employee.name, 40)
        );
    }
    println!();
    Ok(())
}

async fn cmd_employees_show(ctx: &ClientContext, identifier: &str) -> Result<()> {
    ctx.session()?;
    let employee = find_employee(ctx, identifier).await?;
    let notes = ctx
        .backend
        .list_employee_notes(&employee.id)
        .await
        .map_err(|e| ctx.fail(e))?;

    println!();
    println!("=== Employee: {} ===", employee.name);
    println!();
    println!("ID:       {}", employee.id);
    println!("Number:   {}", employee.employee_number);
    println!("Created:  {}", employee.created_at);
    println!("Notes:    {}", notes.len());
    for note in notes {
        println!("  [{}] {}", note.timestamp, note.note_text);
    }
    println!();
    Ok(())
}

async fn cmd_notes_list(ctx: &ClientContext, employee: Option<&str>) -> Result<()> {
    ctx.session()?;
    let notes = match employee {
        Some(identifier) => {
            let employee = find_employee(ctx, identifier).await?;
            ctx.backend.list_employee_notes(&employee.id).await
        }
        None => ctx.backend.list_notes().await,
    }
    .map_err(|e| ctx.fail(e))?;

    if notes.is_empty() {
        println!("No notes found.");
        return Ok(());
    }

    println!();
    println!("{:<32}  {:<36}  {:<50}", "TIMESTAMP", "EMPLOYEE", "NOTE");
    println!("{}", "-".repeat(122));
    for note in notes {
        println!(
            "{:<32}  {:<36}  {:<50}",
            note.timestamp,
            note.employee_id,
            truncate(&note.note_text.replace('\n', " "), 50)
        );
    }
    println!();
    Ok(())
}

/// Scan badges until the input ends or Ctrl+C is pressed
async fn cmd_scan(ctx: &ClientContext) -> Result<()> {
    let session = ctx.session()?;
    let lines = stdin_lines();
    let scanner = Scanner::new(
        Arc::new(WedgeCamera::new(lines.clone())),
        Arc::new(SymbologyDecoder::new(&ctx.config.scanner)),
        &ctx.config.scanner,
    );
    let mut controller =
        NoteCaptureController::new(&session, ctx.backend.clone(), scanner).map_err(|e| ctx.fail(e))?;

    println!("Logged in as {}. Press Ctrl+C to stop.", session.user.email);
    loop {
        println!();
        println!("Scan a badge...");
        controller.start_scan().map_err(|e| ctx.fail(e))?;

        let scanned = tokio::select! {
            result = controller.await_scan() => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(result) = scanned else {
            controller.reset().await;
            println!("Stopped.");
            return Ok(());
        };
        if let Err(e) = result {
            if e.is_auth_failure() {
                return Err(ctx.fail(e));
            }
            println!("[!!] {}", describe(&e));
        }

        // A failed lookup keeps the barcode; offer to repeat it
        let mut skipped = false;
        while matches!(controller.state(), CaptureState::BarcodeCaptured { .. }) {
            match prompt(&lines, "Retry lookup? [Y/n] ").await? {
                Some(answer) if !answer.trim().eq_ignore_ascii_case("n") => {
                    if let Err(e) = controller.retry_resolve().await {
                        if e.is_auth_failure() {
                            return Err(ctx.fail(e));
                        }
                        println!("[!!] {}", describe(&e));
                    }
                }
                _ => {
                    controller.reset().await;
                    skipped = true;
                }
            }
        }

        if controller.state() == &CaptureState::Idle {
            if skipped || controller.last_error().is_some() {
                continue;
            }
            println!("Scanner input ended.");
            return Ok(());
        }

        if let CaptureState::EmployeeNeedsCreation { barcode } = controller.state() {
            println!("Badge {} is not registered.", barcode);
            if !register_scanned_employee(ctx, &mut controller, &lines).await? {
                controller.reset().await;
                continue;
            }
        }

        if !capture_note(ctx, &mut controller, &lines).await? {
            controller.reset().await;
        }
    }
}

/// Capture a note for an employee picked by id or badge number
async fn cmd_note(ctx: &ClientContext, identifier: &str) -> Result<()> {
    let session = ctx.session()?;
    let employee = find_employee(ctx, identifier).await?;

    let lines = stdin_lines();
    let scanner = Scanner::new(
        Arc::new(WedgeCamera::new(lines.clone())),
        Arc::new(SymbologyDecoder::new(&ctx.config.scanner)),
        &ctx.config.scanner,
    );
    let mut controller =
        NoteCaptureController::new(&session, ctx.backend.clone(), scanner).map_err(|e| ctx.fail(e))?;
    controller
        .select_employee(employee)
        .map_err(|e| ctx.fail(e))?;

    if !capture_note(ctx, &mut controller, &lines).await? {
        println!("No note saved.");
    }
    Ok(())
}

/// Ask for the name of an unknown badge's owner. Returns false if the
/// operator gave up.
async fn register_scanned_employee(
    ctx: &ClientContext,
    controller: &mut NoteCaptureController,
    lines: &SharedLines,
) -> Result<bool> {
    loop {
        let Some(name) = prompt(lines, "Employee name (empty to skip): ").await? else {
            return Ok(false);
        };
        if name.trim().is_empty() {
            return Ok(false);
        }

        match controller.create_employee(&name).await {
            Ok(employee) => {
                println!(
                    "[OK] Registered {} ({})",
                    employee.name, employee.employee_number
                );
                return Ok(true);
            }
            Err(e) if e.is_auth_failure() => return Err(ctx.fail(e)),
            Err(Error::Conflict(_)) => {
                println!("[!!] This badge was just registered by someone else. Scan it again.");
                return Ok(false);
            }
            Err(e) => println!("[!!] {}", describe(&e)),
        }
    }
}

/// Note form for the selected employee. Returns false if nothing was saved.
async fn capture_note(
    ctx: &ClientContext,
    controller: &mut NoteCaptureController,
    lines: &SharedLines,
) -> Result<bool> {
    if let Some(employee) = controller.state().employee() {
        println!("Employee: {} ({})", employee.name, employee.employee_number);
    }
    controller.open_note_form().map_err(|e| ctx.fail(e))?;

    loop {
        let Some(text) = prompt(lines, "Note (empty to skip): ").await? else {
            return Ok(false);
        };
        if text.trim().is_empty() {
            return Ok(false);
        }

        match controller.submit_note(&text).await {
            Ok(note) => {
                println!("[OK] Note saved at {}", note.timestamp);
                return Ok(true);
            }
            Err(e) if e.is_auth_failure() => return Err(ctx.fail(e)),
            Err(e) => println!("[!!] {}", describe(&e)),
        }
    }
}

async fn cmd_export(ctx: &ClientContext, dir: Option<&PathBuf>) -> Result<()> {
    let session = ctx.session()?;
    let dir = dir.unwrap_or(&ctx.config.client.export_dir);

    let path = crate::export::export_notes(ctx.backend.as_ref(), &session, dir)
        .await
        .map_err(|e| ctx.fail(e))?;

    println!("[OK] Notes exported to {}", path.display());
    Ok(())
}

async fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!(
            "[!!] Configuration file not found: {}",
            config_path.display()
        );
        println!();
        println!("The default configuration will be used.");
        return Ok(());
    }

    match Config::load(config_path) {
        Ok(config) => {
            println!("[OK] Configuration file is valid!");
            println!();
            println!("=== Configuration Summary ===");
            println!();
            println!("Server:");
            println!("  Host:         {}", config.server.host);
            println!("  Port:         {}", config.server.port);
            println!("  Data Dir:     {}", config.server.data_dir.display());
            println!("  CORS:         {}", config.server.cors_origins.join(", "));
            println!();
            println!("Auth:");
            println!("  Admin:        {}", config.auth.admin_email);
            println!("  Company:      {}", config.auth.admin_company);
            println!("  Token TTL:    {} days", config.auth.token_ttl_days);
            println!();
            println!("Client:");
            println!("  API URL:      {}", config.client.api_url);
            println!("  Session File: {}", config.client.session_file.display());
            println!("  Export Dir:   {}", config.client.export_dir.display());
            println!();
            println!("Scanner:");
            println!("  Frame Rate:   {} fps", config.scanner.fps);
            println!(
                "  Code Length:  {}-{}",
                config.scanner.min_length, config.scanner.max_length
            );
            println!();

            if config.server.cors_origins.iter().any(|o| o == "*") {
                println!("Warnings:");
                println!("  [!] CORS allows any origin");
                println!();
            }
            Ok(())
        }
        Err(e) => {
            println!("[!!] Configuration file is invalid!");
            println!();
            println!("Error: {:#}", e);
            println!();
            println!("Please check the configuration file syntax and try again.");
            anyhow::bail!("Invalid configuration file");
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Look an employee up by ID, falling back to the badge number
async fn find_employee(ctx: &ClientContext, identifier: &str) -> Result<Employee> {
    match ctx.backend.get_employee(identifier).await {
        Ok(employee) => return Ok(employee),
        Err(Error::NotFound(_)) => {}
        Err(e) => return Err(ctx.fail(e)),
    }

    match ctx.backend.find_employee_by_number(identifier).await {
        Ok(employee) => Ok(employee),
        Err(Error::NotFound(_)) => anyhow::bail!("Employee not found: {}", identifier),
        Err(e) => Err(ctx.fail(e)),
    }
}

/// Print `message` and read one line. `None` on end of input or Ctrl+C.
async fn prompt(lines: &SharedLines, message: &str) -> Result<Option<String>> {
    print!("{}", message);
    std::io::stdout().flush()?;

    let mut input = lines.lock().await;
    tokio::select! {
        line = input.next_line() => Ok(line.context("Failed to read input")?),
        _ = tokio::signal::ctrl_c() => {
            println!();
            Ok(None)
        }
    }
}

async fn read_password(lines: &SharedLines) -> Result<String> {
    prompt(lines, "Password: ")
        .await?
        .context("No password given")
}

/// Truncate a string to max length with ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
