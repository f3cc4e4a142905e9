use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::{ProfileUpdate, Registration, VillageClient};
use shared::{
    domain::{
        HelpCategory, HelpPriority, HelpRequestId, HelpStatus, SuggestionId, UserRole, VillageId,
    },
    records::{HelpRequest, Suggestion, Village, VillageLocation},
    Resource,
};
use storage::Fields;
use tokio::sync::watch;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

#[derive(Parser, Debug)]
#[command(name = "village", about = "Village administration client")]
#[command(disable_help_subcommand = true)]
struct Args {
    /// Settings file; missing files are ignored.
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Overrides the configured database.
    #[arg(long)]
    database_url: Option<String>,
    /// Sign in as this account before running the command.
    #[arg(long, global = true, requires = "pass")]
    user: Option<String>,
    #[arg(long, global = true)]
    pass: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account and its profile.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long, default_value = "RESIDENT", value_parser = parse_role)]
        role: UserRole,
        #[arg(long, default_value = "")]
        village: String,
    },
    /// Sign in with --user/--pass and show the profile.
    Login,
    /// Record a password reset request for an account.
    ResetPassword { email: String },
    /// Show the signed-in profile, or change it when fields are given.
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        photo: Option<String>,
    },
    #[command(subcommand)]
    Villages(VillageCommand),
    #[command(subcommand)]
    Help(HelpCommand),
    #[command(subcommand)]
    Suggest(SuggestCommand),
    /// Print live snapshots until Ctrl-C.
    #[command(subcommand)]
    Watch(WatchCommand),
}

#[derive(Subcommand, Debug)]
enum VillageCommand {
    List,
    Search { prefix: String },
    Show { id: String },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value_t = 0.0)]
        latitude: f64,
        #[arg(long, default_value_t = 0.0)]
        longitude: f64,
        #[arg(long, default_value = "")]
        address: String,
        #[arg(long, default_value_t = 0)]
        population: i64,
        #[arg(long, default_value = "")]
        area: String,
        #[arg(long, default_value = "")]
        admin_name: String,
        #[arg(long, default_value = "")]
        admin_contact: String,
    },
    /// Patch name and/or description.
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Delete { id: String },
    Population { id: String, population: i64 },
}

#[derive(Subcommand, Debug)]
enum HelpCommand {
    List { village: String },
    Submit {
        #[arg(long)]
        village: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "OTHER", value_parser = parse_category)]
        category: HelpCategory,
        /// 0 (low) to 3 (critical).
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(i64).range(0..=3))]
        priority: i64,
    },
    Status {
        id: String,
        #[arg(value_parser = parse_status)]
        status: HelpStatus,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum SuggestCommand {
    List { village: String },
    Submit {
        #[arg(long)]
        village: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        category: String,
    },
    Upvote { id: String },
    Respond {
        id: String,
        response: String,
        #[arg(long)]
        implemented: bool,
    },
}

#[derive(Subcommand, Debug)]
enum WatchCommand {
    Villages,
    Help { village: String },
    Suggestions { village: String },
}

fn parse_code<T: Copy>(raw: &str, all: &[T], code: fn(&T) -> &'static str) -> Result<T, String> {
    all.iter()
        .copied()
        .find(|value| code(value).eq_ignore_ascii_case(raw))
        .ok_or_else(|| {
            let known: Vec<_> = all.iter().map(code).collect();
            format!("expected one of {}", known.join(", "))
        })
}

fn parse_role(raw: &str) -> Result<UserRole, String> {
    parse_code(raw, UserRole::ALL, UserRole::as_code)
}

fn parse_category(raw: &str) -> Result<HelpCategory, String> {
    parse_code(raw, HelpCategory::ALL, HelpCategory::as_code)
}

fn parse_status(raw: &str) -> Result<HelpStatus, String> {
    parse_code(raw, HelpStatus::ALL, HelpStatus::as_code)
}

/// Prints a controller error and clears it. Returns whether there was one.
fn show_error(error: Option<String>, clear: impl FnOnce()) -> bool {
    match error {
        Some(message) => {
            eprintln!("error: {message}");
            clear();
            true
        }
        None => false,
    }
}

fn outcome(failed: bool) -> ExitCode {
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let mut settings = config::load_settings(&args.config);
    if let Some(url) = &args.database_url {
        settings.database_url = config::normalize_database_url(url);
    }

    let filter =
        EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    debug!(?settings, "settings loaded");

    let client = VillageClient::open(&settings.database_url).await?;

    if let (Some(user), Some(pass)) = (&args.user, &args.pass) {
        client.auth.login(user, pass).await;
        let state = client.auth.state();
        if show_error(state.error, || client.auth.clear_error()) {
            return Ok(ExitCode::FAILURE);
        }
    } else {
        client.auth.restore().await;
    }

    let code = match args.command {
        Command::Register {
            email,
            password,
            name,
            phone,
            role,
            village,
        } => {
            client
                .auth
                .register(Registration {
                    email,
                    password,
                    name,
                    phone,
                    role,
                    village_id: VillageId::new(village),
                })
                .await;
            let state = client.auth.state();
            if let Some(user) = &state.user {
                render::user(user);
            }
            outcome(show_error(state.error, || client.auth.clear_error()))
        }
        Command::Login => match client.auth.state().user {
            Some(user) => {
                render::user(&user);
                ExitCode::SUCCESS
            }
            None => {
                eprintln!("error: pass --user and --pass to sign in");
                ExitCode::FAILURE
            }
        },
        Command::ResetPassword { email } => {
            match client.auth.request_password_reset(&email).await {
                Resource::Success(()) => {
                    println!("Password reset email sent");
                    ExitCode::SUCCESS
                }
                Resource::Error(message) => {
                    eprintln!("error: {message}");
                    ExitCode::FAILURE
                }
                Resource::Loading => ExitCode::SUCCESS,
            }
        }
        Command::Profile { name, phone, photo } => {
            let update = ProfileUpdate {
                name,
                phone,
                profile_photo_url: photo,
            };
            if update != ProfileUpdate::default() {
                client.auth.update_profile(update).await;
            }
            let state = client.auth.state();
            let failed = show_error(state.error, || client.auth.clear_error());
            match &state.user {
                Some(user) => render::user(user),
                None if !failed => eprintln!("error: No user logged in"),
                None => {}
            }
            outcome(failed || state.user.is_none())
        }
        Command::Villages(command) => run_villages(&client, command).await,
        Command::Help(command) => run_help(&client, command).await,
        Command::Suggest(command) => run_suggest(&client, command).await,
        Command::Watch(command) => run_watch(&client, command).await?,
    };

    client.auth.logout();
    Ok(code)
}

async fn run_villages(client: &VillageClient, command: VillageCommand) -> ExitCode {
    let controller = &client.villages;
    match command {
        VillageCommand::List => {
            controller.load_villages().await;
            render::villages(&controller.state().villages);
        }
        VillageCommand::Search { prefix } => {
            controller.search_villages(&prefix).await;
            render::villages(&controller.state().villages);
        }
        VillageCommand::Show { id } => {
            controller.load_village(&VillageId::new(id)).await;
            if let Some(village) = &controller.state().selected_village {
                render::village_detail(village);
            }
        }
        VillageCommand::Create {
            name,
            description,
            latitude,
            longitude,
            address,
            population,
            area,
            admin_name,
            admin_contact,
        } => {
            let admin_id = client.session.user_id().unwrap_or_default();
            let village = Village {
                name,
                description,
                location: VillageLocation {
                    latitude,
                    longitude,
                    address,
                },
                admin_id,
                admin_name,
                admin_contact,
                population,
                area,
                ..Village::default()
            };
            if let Resource::Success(id) = controller.create_village(&village).await {
                info!(village_id = %id, "created");
                println!("{id}");
            }
        }
        VillageCommand::Update {
            id,
            name,
            description,
        } => {
            let mut fields = Fields::new();
            if let Some(name) = name {
                fields.insert("name".to_string(), name.into());
            }
            if let Some(description) = description {
                fields.insert("description".to_string(), description.into());
            }
            if fields.is_empty() {
                eprintln!("error: nothing to update");
                return ExitCode::FAILURE;
            }
            let _ = controller.update_village(&VillageId::new(id), fields).await;
        }
        VillageCommand::Delete { id } => {
            let _ = controller.delete_village(&VillageId::new(id)).await;
        }
        VillageCommand::Population { id, population } => {
            let _ = controller
                .update_population(&VillageId::new(id), population)
                .await;
        }
    }
    outcome(show_error(controller.state().error, || {
        controller.clear_error()
    }))
}

async fn run_help(client: &VillageClient, command: HelpCommand) -> ExitCode {
    let controller = &client.help;
    match command {
        HelpCommand::List { village } => {
            let village = VillageId::new(village);
            let mut rx = controller.subscribe();
            controller.load_help_requests(&village);
            first_settled(&mut rx, |s| s.is_loading).await;
            controller.stop_observing();
            render::help_requests(&controller.state().requests);
        }
        HelpCommand::Submit {
            village,
            title,
            description,
            category,
            priority,
        } => {
            let draft = HelpRequest {
                village_id: VillageId::new(village),
                title,
                description,
                category,
                priority: HelpPriority::from_ordinal(priority),
                ..HelpRequest::default()
            };
            if let Resource::Success(id) = controller.create_help_request(draft).await {
                println!("{id}");
            }
        }
        HelpCommand::Status { id, status, notes } => {
            let _ = controller
                .update_status(&HelpRequestId::new(id), status, notes)
                .await;
        }
    }
    outcome(show_error(controller.state().error, || {
        controller.clear_error()
    }))
}

async fn run_suggest(client: &VillageClient, command: SuggestCommand) -> ExitCode {
    let controller = &client.suggestions;
    match command {
        SuggestCommand::List { village } => {
            let village = VillageId::new(village);
            let mut rx = controller.subscribe();
            controller.load_suggestions(&village);
            first_settled(&mut rx, |s| s.is_loading).await;
            controller.stop_observing();
            render::suggestions(&controller.state().suggestions);
        }
        SuggestCommand::Submit {
            village,
            title,
            description,
            category,
        } => {
            let draft = Suggestion {
                village_id: VillageId::new(village),
                title,
                description,
                category,
                ..Suggestion::default()
            };
            if let Resource::Success(id) = controller.create_suggestion(draft).await {
                println!("{id}");
            }
        }
        SuggestCommand::Upvote { id } => {
            if let Resource::Success(upvoted) = controller.upvote(&SuggestionId::new(id)).await {
                println!("{}", if upvoted { "upvoted" } else { "vote withdrawn" });
            }
        }
        SuggestCommand::Respond {
            id,
            response,
            implemented,
        } => {
            let _ = controller
                .respond(&SuggestionId::new(id), &response, implemented)
                .await;
        }
    }
    outcome(show_error(controller.state().error, || {
        controller.clear_error()
    }))
}

/// Waits for the first live item after `Loading` to land in state. `rx` must
/// be subscribed before the observation starts.
async fn first_settled<S>(rx: &mut watch::Receiver<S>, is_loading: impl Fn(&S) -> bool) {
    while rx.changed().await.is_ok() {
        if !is_loading(&rx.borrow_and_update()) {
            return;
        }
    }
}

/// Prints every state change until Ctrl-C, then disposes the subscription.
async fn follow<S>(
    mut rx: watch::Receiver<S>,
    mut print: impl FnMut(&S),
    stop: impl FnOnce(),
) -> Result<()> {
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                print(&rx.borrow_and_update());
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }
    stop();
    info!("watch stopped");
    Ok(())
}

async fn run_watch(client: &VillageClient, command: WatchCommand) -> Result<ExitCode> {
    match command {
        WatchCommand::Villages => {
            let controller = &client.villages;
            let rx = controller.subscribe();
            controller.observe_villages();
            follow(
                rx,
                |s| match &s.error {
                    Some(message) => eprintln!("error: {message}"),
                    None if !s.is_loading => {
                        println!("--");
                        render::villages(&s.villages);
                    }
                    None => {}
                },
                || controller.stop_observing(),
            )
            .await?;
        }
        WatchCommand::Help { village } => {
            let controller = &client.help;
            let rx = controller.subscribe();
            controller.load_help_requests(&VillageId::new(village));
            follow(
                rx,
                |s| match &s.error {
                    Some(message) => eprintln!("error: {message}"),
                    None if !s.is_loading => {
                        println!("--");
                        render::help_requests(&s.requests);
                    }
                    None => {}
                },
                || controller.stop_observing(),
            )
            .await?;
        }
        WatchCommand::Suggestions { village } => {
            let controller = &client.suggestions;
            let rx = controller.subscribe();
            controller.load_suggestions(&VillageId::new(village));
            follow(
                rx,
                |s| match &s.error {
                    Some(message) => eprintln!("error: {message}"),
                    None if !s.is_loading => {
                        println!("--");
                        render::suggestions(&s.suggestions);
                    }
                    None => {}
                },
                || controller.stop_observing(),
            )
            .await?;
        }
    }
    Ok(ExitCode::SUCCESS)
}
