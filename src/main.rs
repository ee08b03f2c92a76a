use anyhow::{Context, Result};
use gameshelf::{
    app::App,
    identity::{self, Identity},
    view::SortKey,
};
use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gameshelf=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let mut data_dir: Option<PathBuf> = None;
    let mut backend_url = DEFAULT_BACKEND_URL.to_string();
    let mut link_paths = Vec::new();
    let mut unlink_ids = Vec::new();
    let mut list_accounts = false;
    let mut search_term: Option<String> = None;
    let mut sort_key: Option<SortKey> = None;
    let mut sort_ascending = true;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--data-dir" => data_dir = args.next().map(PathBuf::from),
            "--backend" => {
                if let Some(url) = args.next() {
                    backend_url = url;
                } else {
                    eprintln!("--backend requires a URL");
                }
            }
            "--link" | "-l" => {
                if let Some(path) = args.next() {
                    link_paths.push(PathBuf::from(path));
                } else {
                    eprintln!("--link requires a path");
                }
            }
            "--unlink" => {
                if let Some(id) = args.next() {
                    unlink_ids.push(id);
                } else {
                    eprintln!("--unlink requires an account id");
                }
            }
            "--accounts" | "-a" => list_accounts = true,
            "--search" | "-s" => search_term = args.next(),
            "--sort" => {
                let raw = args.next().unwrap_or_default();
                match SortKey::parse(&raw) {
                    Some(key) => sort_key = Some(key),
                    None => eprintln!("unknown sort key: {raw}"),
                }
            }
            "--desc" => sort_ascending = false,
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => eprintln!("unknown argument: {other}"),
        }
    }

    let mut app = App::initialize(data_dir, &backend_url)?;

    for path in &link_paths {
        let identity = read_identity_file(path)
            .with_context(|| format!("import identity from {}", path.display()))?;
        let name = identity.display_name.clone();
        if app.link_identity(identity) {
            println!("Linked {name}");
        } else {
            eprintln!("Linked {name}, but saving the account list failed");
        }
    }
    for id in &unlink_ids {
        app.unlink_identity(id);
        println!("Unlinked {id}");
    }

    if list_accounts {
        print_accounts(&app);
        return Ok(());
    }

    if app.identities().is_empty() {
        println!("No accounts linked yet.");
        println!("Complete the Steam login flow and pass the exported record via --link.");
        return Ok(());
    }

    if let Some(key) = sort_key {
        app.view.set_sort(key, sort_ascending);
    } else if !sort_ascending {
        let key = app.view.state().sort_key;
        app.view.set_sort(key, false);
    }
    if let Some(term) = &search_term {
        app.view.set_search_term(term);
    }

    app.seed_from_cache();
    if link_paths.is_empty() && unlink_ids.is_empty() {
        app.start_sync();
    }

    while app.sync_active() {
        app.pump();
        thread::sleep(Duration::from_millis(25));
    }
    app.pump();

    if let Some(error) = app.load_error() {
        eprintln!("Failed to load game library: {error}");
        eprintln!("Check that the backend at {backend_url} is reachable, then run again to retry.");
        std::process::exit(1);
    }

    render(&app);
    Ok(())
}

fn print_help() {
    println!("GameShelf");
    println!("  --data-dir <path>   Override the data directory");
    println!("  --backend <url>     Companion service base URL (default {DEFAULT_BACKEND_URL})");
    println!("  --link <file>       Link an account from an exported identity record");
    println!("  --unlink <id>       Remove a linked account");
    println!("  --accounts          List linked accounts");
    println!("  --search <term>     Filter the library (aliases like 'cs' expand)");
    println!("  --sort <key>        name | playtime | popularity | compatibility");
    println!("  --desc              Flip the sort direction");
}

fn read_identity_file(path: &Path) -> Result<Identity> {
    let raw = fs::read_to_string(path).context("read identity record")?;
    let value = serde_json::from_str(&raw).context("parse identity record")?;
    identity::validate_record(value, identity::unix_now()).context("validate identity record")
}

fn print_accounts(app: &App) {
    if app.identities().is_empty() {
        println!("No accounts linked.");
        return;
    }
    let format = time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]");
    for identity in app.identities() {
        let synced = OffsetDateTime::from_unix_timestamp(identity.last_synced_at)
            .ok()
            .and_then(|stamp| stamp.format(&format).ok())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{}  {}  {} games  last synced {synced}",
            identity.id,
            identity.display_name,
            identity.games.len()
        );
    }
}

fn render(app: &App) {
    let state = app.view.state();
    println!("{}", app.status);
    println!(
        "Sort: {} ({})",
        state.sort_key.label(),
        if state.sort_ascending { "asc" } else { "desc" }
    );
    if let Some((raw, expanded)) = app.view.search_terms() {
        if raw == expanded {
            println!("Search: \"{raw}\" ({} matches)", app.view.matched_count());
        } else {
            println!(
                "Search: \"{raw}\" -> \"{expanded}\" ({} matches)",
                app.view.matched_count()
            );
        }
    }
    println!();

    for row in app.view.rows() {
        if !row.matched {
            continue;
        }
        let entry = row.entry;
        let tier = match entry.surfaced_tier(&app.settings) {
            Some(tier) => tier.label(),
            None => "-",
        };
        let launch = if entry.launch_available(&app.settings) {
            "[launch]"
        } else {
            ""
        };
        println!(
            "{:<44} {:<9} {:>10} online  {:>8.1} hrs  {} {}",
            truncated(&entry.name, 43),
            tier,
            format_count(entry.active_players),
            entry.playtime_hours(),
            entry.owner_names().join(", "),
            launch
        );
    }

    let hidden = app.view.rows().len() - app.view.matched_count();
    if hidden > 0 {
        println!("\n({hidden} games hidden by search)");
    }
    if app.prefetched_covers() > 0 {
        println!("Cached {} new covers", app.prefetched_covers());
    }
}

fn truncated(name: &str, max: usize) -> String {
    if name.chars().count() <= max {
        return name.to_string();
    }
    let mut out: String = name.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn format_count(count: i64) -> String {
    let raw = count.to_string();
    let mut out = String::new();
    for (index, ch) in raw.chars().rev().enumerate() {
        if index > 0 && index % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out.chars().rev().collect()
}
