//! Administration commands for a GU-TAP deployment.
//!
//! Usage:
//!   tapctl add-user <email> <name> <roles> [password]
//!   tapctl list-users
//!   tapctl export <worksheet> <file.csv|file.xlsx>
//!   tapctl next-id <worksheet>

use gutap::app::AppState;
use gutap::config::Config;
use gutap::downloader::ExportFormat;
use gutap::login::{Role, UserDirectory};
use gutap::mailer::generate_password;
use std::env;
use std::fs;

fn usage(program: &str) {
    eprintln!("Usage:");
    eprintln!("  {} add-user <email> <name> <roles> [password]", program);
    eprintln!("      roles is a comma-separated list of: coordinator, staff, assistant");
    eprintln!("  {} list-users", program);
    eprintln!("  {} export <worksheet> <file.csv|file.xlsx>", program);
    eprintln!("  {} next-id <worksheet>", program);
}

fn parse_roles(raw: &str) -> Result<Vec<Role>, String> {
    raw.split(',')
        .filter(|r| !r.trim().is_empty())
        .map(|r| Role::parse(r).ok_or_else(|| format!("unknown role '{}'", r.trim())))
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("tapctl");
    let Some(command) = args.get(1) else {
        usage(program);
        return Ok(());
    };
    let config = Config::load()?;

    match (command.as_str(), &args[2..]) {
        ("add-user", [email, name, roles, rest @ ..]) => {
            let roles = parse_roles(roles)?;
            let (password, generated) = match rest.first() {
                Some(p) => (p.clone(), false),
                None => (generate_password(), true),
            };
            let users = UserDirectory::load(&config.users_file)?;
            users.add_user(email, name, &roles, &password)?;
            println!("Added {} ({})", email, name);
            if generated {
                println!("Temporary password: {}", password);
            }
        }
        ("list-users", []) => {
            let users = UserDirectory::load(&config.users_file)?;
            for user in users.all() {
                let roles: Vec<&str> = user.roles.iter().map(|r| r.as_str()).collect();
                println!("{}\t{}\t{}", user.email, user.name, roles.join(", "));
            }
        }
        ("export", [worksheet, file]) => {
            let format = ExportFormat::parse(file).ok_or("file must end in .csv or .xlsx")?;
            let state = AppState::from_config(&config)?;
            let bytes = state.service.export(worksheet, format)?;
            fs::write(file, bytes)?;
            println!("Wrote {} to {}", worksheet, file);
        }
        ("next-id", [worksheet]) => {
            let state = AppState::from_config(&config)?;
            println!("{}", state.service.next_id(worksheet)?);
        }
        _ => usage(program),
    }

    Ok(())
}
