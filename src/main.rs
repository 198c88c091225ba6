use clap::{Parser, Subcommand};
use color_eyre::Result;
use futures::StreamExt;
use serde::{de::DeserializeOwned, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use shopsync::cache::{CacheLayer, SqliteStorage};
use shopsync::config::{self, Config};
use shopsync::kv::{SharedKv, SqliteKv};
use shopsync::paging::{ListLoader, LoadMoreState, Settle, UiState};
use shopsync::session::{AuthTokens, SessionStore};
use shopsync::shop::{lists, AccountRepository, HttpClient, PagedRepository, ProfileRepository};
use shopsync::{logging, Resource};

#[derive(Parser, Debug)]
#[command(name = "shopsync")]
#[command(about = "Offline-first sync client for the shop API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/shopsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Start a session with the tokens from SHOPSYNC_TOKEN and SHOPSYNC_REFRESH_TOKEN
  Login {
    #[arg(long)]
    user_id: i64,
    /// Access token lifetime in seconds
    #[arg(long, default_value_t = 7200)]
    expire: i64,
    /// Refresh token lifetime in seconds
    #[arg(long, default_value_t = 604800)]
    refresh_expire: i64,
  },
  /// Show the cached profile, then the network copy
  Profile,
  /// Reload the profile from the network only
  RefreshProfile,
  /// Change the nickname optimistically
  SetNickname { nickname: String },
  /// List browsing history
  Footprints {
    #[arg(long, default_value_t = 1)]
    pages: u32,
  },
  /// List chat conversations
  Conversations {
    #[arg(long, default_value_t = 1)]
    pages: u32,
  },
  /// End the session and purge the cache
  Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config::data_dir()?.join("logs"))?;

  let kv: SharedKv = Arc::new(SqliteKv::open(&config.storage.kv_path()?)?);
  let session = SessionStore::restore(Arc::clone(&kv)).await?;
  let cache = CacheLayer::new(SqliteStorage::open(&config.storage.cache_path()?)?);
  let api = Arc::new(HttpClient::new(&config.api, session.clone())?);

  let account = AccountRepository::new(Arc::clone(&api), cache.clone(), session.clone());
  if !matches!(args.command, Command::Login { .. } | Command::Logout) {
    if let Err(e) = account.ensure_fresh_token().await {
      warn!(error = %e, "Token refresh failed, continuing with current token");
    }
  }

  let settle = Settle::from_millis(config.paging.settle_delay_ms);
  let page_size = config.paging.page_size;

  match args.command {
    Command::Login {
      user_id,
      expire,
      refresh_expire,
    } => {
      let refresh_token = Config::get_refresh_token();
      if refresh_token.is_none() {
        warn!("SHOPSYNC_REFRESH_TOKEN not set, the session cannot be refreshed");
      }
      let tokens = login_tokens(Config::get_api_token()?, refresh_token, expire, refresh_expire);
      account.login(tokens, user_id).await?;
      println!("Logged in as {}", user_id);
    }
    Command::Profile => {
      let profiles = ProfileRepository::new(api, cache, session, kv);
      let mut updates = Box::pin(profiles.profile());
      while let Some(resource) = updates.next().await {
        match resource {
          Resource::Success(p) => println!("{}\t{}", p.user_id, p.nickname),
          Resource::Error(e) => eprintln!("Error: {}", e),
          Resource::Loading => {}
        }
      }
    }
    Command::RefreshProfile => {
      let profiles = ProfileRepository::new(api, cache, session, kv);
      match profiles.refresh_profile().await {
        Resource::Success(p) => println!("{}\t{}", p.user_id, p.nickname),
        Resource::Error(e) => eprintln!("Error: {}", e),
        Resource::Loading => {}
      }
    }
    Command::SetNickname { nickname } => {
      let profiles = ProfileRepository::new(api, cache, session, kv);
      let outcome = profiles.update_nickname(nickname).await?;
      println!("{}\t{}", outcome.subject_id, outcome.value.nickname);
      // The process is about to exit; give the background sync a chance to land
      if let Err(e) = outcome.sync.await {
        warn!(error = %e, "Background profile sync did not finish");
      }
    }
    Command::Footprints { pages } => {
      let repo = lists::footprints(api, cache, session, page_size);
      print_pages(&repo, pages, settle, |f| {
        format!("{}\t{}\t{:.2}", f.goods_id, f.goods_name, f.price as f64 / 100.0)
      })
      .await;
    }
    Command::Conversations { pages } => {
      let repo = lists::conversations(api, cache, session, page_size);
      print_pages(&repo, pages, settle, |c| {
        format!(
          "{}\t{}\t{}\t{}",
          c.id,
          c.peer_name,
          c.unread,
          c.last_message.as_deref().unwrap_or("")
        )
      })
      .await;
    }
    Command::Logout => {
      account.logout().await?;
      println!("Logged out");
    }
  }

  Ok(())
}

/// Tokens for a fresh login. Without a refresh token the session can only
/// expire.
fn login_tokens(
  token: String,
  refresh_token: Option<String>,
  expire: i64,
  refresh_expire: i64,
) -> AuthTokens {
  match refresh_token {
    Some(refresh_token) => AuthTokens {
      token,
      refresh_token,
      expire,
      refresh_expire,
    },
    None => AuthTokens {
      token,
      refresh_token: String::new(),
      expire,
      refresh_expire: 0,
    },
  }
}

async fn print_pages<T, S>(
  repo: &PagedRepository<T, S>,
  pages: u32,
  settle: Settle,
  render: impl Fn(&T) -> String,
) where
  T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
  S: shopsync::cache::LocalStore,
{
  let loader = ListLoader::new(settle);
  loader.retry(|p| repo.page(p)).await;

  for _ in 1..pages {
    if !loader.load_more(|p| repo.page(p)).await {
      break;
    }
    loader.commit_pending();
    if loader.snapshot().load_more_state() == LoadMoreState::Error {
      break;
    }
  }

  let state = loader.snapshot();
  match state.ui_state() {
    UiState::Empty => println!("Nothing here yet."),
    UiState::Error => {
      if let Some(e) = state.last_error() {
        eprintln!("Error: {}", e);
      }
    }
    _ => {
      for item in state.items() {
        println!("{}", render(item));
      }
    }
  }
}
