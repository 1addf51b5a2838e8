use std::env;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use diesel::prelude::*;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use recruitment::{
    auth::password::hash_password, config::AppConfig, db, resume_parser::ResumeParser,
    schema::resumes, state::AppState,
};

const USAGE: &str = "Usage: maintenance <reparse-resumes | hash-password <password>>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("reparse-resumes") => reparse_resumes().await?,
        Some("hash-password") => {
            let password = args.next().context(USAGE)?;
            println!("{}", hash_password(&password)?);
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn reparse_resumes() -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        pool_size = 1,
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let state = AppState::from_config(pool, config)?;
    let Some(parser) = state.resume_parser.clone() else {
        bail!("API_KEY must be set to parse resumes");
    };

    let pending: Vec<Uuid> = {
        let mut conn = state.pool.get().context("failed to get database connection")?;
        resumes::table
            .filter(resumes::parsed.is_null())
            .select(resumes::user_id)
            .load(&mut conn)
            .context("failed to load unparsed resumes")?
    };

    if pending.is_empty() {
        println!("No unparsed resumes.");
        return Ok(());
    }

    println!("Parsing {} resumes…", pending.len());
    let mut failures = 0usize;

    for user_id in &pending {
        if let Err(err) = reparse_one(&state, parser.as_ref(), *user_id).await {
            failures += 1;
            eprintln!("Failed to parse resume of user {user_id}: {err:#}");
        }
    }

    println!(
        "Done: {} parsed, {} failed.",
        pending.len() - failures,
        failures
    );
    Ok(())
}

async fn reparse_one(state: &AppState, parser: &dyn ResumeParser, user_id: Uuid) -> Result<()> {
    let (checksum, pdf): (String, Vec<u8>) = {
        let mut conn = state.pool.get().context("failed to get database connection")?;
        resumes::table
            .find(user_id)
            .select((resumes::checksum, resumes::pdf))
            .first(&mut conn)
            .context("failed to load resume")?
    };

    let parsed = parser.parse_pdf(&pdf).await?;

    let mut conn = state.pool.get().context("failed to get database connection")?;
    diesel::update(
        resumes::table
            .find(user_id)
            .filter(resumes::checksum.eq(&checksum)),
    )
    .set((
        resumes::parsed.eq(Some(parsed)),
        resumes::parsed_at.eq(Some(Utc::now().naive_utc())),
    ))
    .execute(&mut conn)
    .context("failed to store parsed resume")?;

    tracing::info!(user_id = %user_id, "resume parsed");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
