use std::{
    fs,
    io::{self, Write},
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Args;
use rpassword::prompt_password;
use session::{
    AuthGateway, AuthSession, FileStore, MemoryStore, Navigator, ReqwestTransport, SessionStore,
    TokenStore,
    navigation::{DASHBOARD_ROUTE, LOGIN_ROUTE},
    tokens::{DEFAULT_EXPIRY_BUFFER, is_token_expiring_soon, token_expiration},
};
use shared::{
    config::Config,
    models::{LoginRequest, ProfilePatch, RegisterRequest, UserProfile},
};

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Name shown instead of the username
    #[arg(long)]
    pub display_name: Option<String>,
}

#[derive(Args, Debug)]
pub struct ProfileArgs {
    #[arg(long)]
    pub display_name: Option<String>,
    /// Avatar image URL
    #[arg(long)]
    pub avatar: Option<String>,
    /// UI theme, e.g. `light` or `dark`
    #[arg(long)]
    pub theme: Option<String>,
    /// ISO currency code used for item values
    #[arg(long)]
    pub default_currency: Option<String>,
}

impl ProfileArgs {
    fn into_patch(self) -> ProfilePatch {
        ProfilePatch {
            display_name: self.display_name.map(Some),
            avatar: self.avatar.map(Some),
            theme: self.theme.map(Some),
            default_currency: self.default_currency.map(Some),
            ..ProfilePatch::default()
        }
    }
}

/// Navigator for a terminal: a redirect to the login view becomes a hint on stderr.
#[derive(Debug)]
pub struct TerminalNavigator {
    path: Mutex<String>,
}

impl TerminalNavigator {
    fn new(path: &str) -> Self {
        Self {
            path: Mutex::new(path.to_string()),
        }
    }
}

impl Navigator for TerminalNavigator {
    fn current_path(&self) -> String {
        self.path
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn redirect(&self, path: &str) {
        if path == LOGIN_ROUTE {
            eprintln!("Your session has expired. Run `storykeep login` to sign in again.");
        }
        *self.path.lock().unwrap_or_else(PoisonError::into_inner) = path.to_string();
    }
}

/// Wires an [`AuthSession`] to the configured API and token file.
///
/// # Errors
///
/// Returns an error if the token directory cannot be created or the HTTP
/// client cannot be built.
pub fn connect(config: &Config) -> Result<AuthSession> {
    let token_path = config.storage.resolved_token_path();
    ensure_parent(&token_path)?;

    let transport = ReqwestTransport::new(&config.api)
        .with_context(|| format!("invalid API base URL {}", config.api.base_url))?;
    let tokens = TokenStore::new(
        Arc::new(FileStore::new(&token_path)),
        Arc::new(MemoryStore::new()),
    );
    let gateway = AuthGateway::new(
        Arc::new(transport),
        tokens,
        Arc::new(TerminalNavigator::new(DASHBOARD_ROUTE)),
        SessionStore::new(),
    );
    Ok(AuthSession::new(Arc::new(gateway)))
}

pub async fn login(config: &Config) -> Result<()> {
    let session = connect(config)?;

    let email = prompt("Email: ")?;
    let password = prompt_password("Password: ")?;
    if password.trim().is_empty() {
        bail!("password must not be empty");
    }

    let user = session
        .login(&LoginRequest { email, password })
        .await
        .map_err(|err| anyhow::anyhow!("login failed: {}", err.display_or("Login failed")))?;

    println!("Logged in as {}", user.label());
    println!(
        "credentials stored at {}",
        config.storage.resolved_token_path().display()
    );
    Ok(())
}

pub async fn register(config: &Config, args: RegisterArgs) -> Result<()> {
    let session = connect(config)?;

    let email = prompt("Email: ")?;
    let username = prompt("Username: ")?;
    let password = prompt_password("Password: ")?;
    let password_confirm = prompt_password("Confirm password: ")?;
    if password.trim().is_empty() {
        bail!("password must not be empty");
    }

    let user = session
        .register(&RegisterRequest {
            email,
            username,
            password,
            password_confirm,
            display_name: args.display_name,
        })
        .await
        .map_err(|err| {
            anyhow::anyhow!("registration failed: {}", err.display_or("Registration failed"))
        })?;

    println!("Registered and logged in as {}", user.label());
    Ok(())
}

pub async fn logout(config: &Config) -> Result<()> {
    let session = connect(config)?;
    let token_path = config.storage.resolved_token_path();

    session.logout().await;

    println!("Signed out. Removed credentials at {}", token_path.display());
    Ok(())
}

pub async fn me(config: &Config) -> Result<()> {
    let session = connect(config)?;

    let state = session.check_auth_status().await;
    let Some(user) = state.user.filter(|_| state.is_authenticated) else {
        bail!("no active session; run `storykeep login` first");
    };

    print_profile(&user);
    Ok(())
}

/// Reports whether stored credentials are still accepted. Never fails on a signed-out session.
pub async fn status(config: &Config) -> Result<()> {
    let session = connect(config)?;

    let state = session.check_auth_status().await;
    let Some(user) = state.user.filter(|_| state.is_authenticated) else {
        println!("Not signed in");
        return Ok(());
    };

    println!("Signed in as {}", user.label());
    let access = session.gateway().tokens().access_token().ok().flatten();
    if let Some((token, expires_at)) =
        access.and_then(|token| token_expiration(&token).map(|expires_at| (token, expires_at)))
    {
        let note = if is_token_expiring_soon(&token, DEFAULT_EXPIRY_BUFFER, Utc::now()) {
            " (expiring soon, renewed on the next request)"
        } else {
            ""
        };
        println!("access token expires at {expires_at}{note}");
    }
    Ok(())
}

pub async fn profile(config: &Config, args: ProfileArgs) -> Result<()> {
    let patch = args.into_patch();
    if patch.is_empty() {
        bail!("nothing to update; pass at least one profile option");
    }

    let session = connect(config)?;
    if !session.check_auth_status().await.is_authenticated {
        bail!("no active session; run `storykeep login` first");
    }

    let state = session
        .update_profile(&patch)
        .await
        .map_err(|err| {
            anyhow::anyhow!("profile update failed: {}", err.display_or("Profile update failed"))
        })?;

    if let Some(user) = state.user {
        print_profile(&user);
    }
    Ok(())
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush().ok();
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let trimmed = input.trim().to_string();
    if trimmed.is_empty() {
        bail!("input must not be empty");
    }
    Ok(trimmed)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!("failed to create credentials directory {}", parent.display())
        })?;
    }
    Ok(())
}

fn print_profile(user: &UserProfile) {
    println!("Logged in as {}", user.label());
    println!("email: {}", user.email);
    if let Some(display) = &user.display_name {
        println!("display name: {display}");
    }
    if let Some(currency) = &user.default_currency {
        println!("default currency: {currency}");
    }
    if let Some(theme) = &user.theme {
        println!("theme: {theme}");
    }
    if let Some(created_at) = user.created_at {
        println!("member since: {}", created_at.format("%Y-%m-%d"));
    }
}
