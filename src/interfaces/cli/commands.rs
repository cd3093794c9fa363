use std::time::Duration;

use colored::Colorize;

use crate::config::StaticConfig;
use crate::errors::{Result, ShortenerError};
use crate::services::short_url;
use crate::system::lifetime::startup::AppContext;

/// How long `retire` waits for its batches before returning.
const RETIRE_WAIT_SECS: u64 = 10;

pub async fn shorten_urls(
    ctx: &AppContext,
    urls: &[String],
    owner: Option<i64>,
    base_url: &str,
) -> Result<()> {
    let owner_id = match owner {
        Some(id) => id,
        None => {
            let identity = ctx.identity.identify(None)?;
            println!(
                "{} Issued visitor id {} ({}={})",
                "ℹ".bold().blue(),
                identity.id.to_string().cyan(),
                ctx.identity.cookie_name(),
                identity.token.dimmed()
            );
            identity.id
        }
    };

    let items = ctx.service.shorten_batch(urls, owner_id).await?;
    for item in &items {
        let status = if item.conflict {
            "exists".yellow()
        } else {
            "created".green()
        };
        println!(
            "  [{}] {} -> {}",
            status,
            short_url(base_url, &item.short_key).cyan(),
            item.original_url.blue().underline()
        );
    }
    Ok(())
}

pub async fn resolve_key(ctx: &AppContext, short_key: &str) -> Result<()> {
    let resolved = ctx.service.resolve(short_key).await?;
    if resolved.retired {
        println!(
            "{} {} -> {} {}",
            "⚠".bold().yellow(),
            short_key.cyan(),
            resolved.original_url.blue(),
            "(retired)".dimmed().red()
        );
    } else {
        println!(
            "{} {} -> {}",
            "✓".bold().green(),
            short_key.cyan(),
            resolved.original_url.blue().underline()
        );
    }
    Ok(())
}

pub async fn list_owner_urls(
    ctx: &AppContext,
    owner_id: i64,
    json: bool,
    base_url: &str,
) -> Result<()> {
    let urls = ctx.service.urls_of(owner_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&urls)?);
        return Ok(());
    }

    if urls.is_empty() {
        println!("{} No URLs found for owner {}", "ℹ".bold().blue(), owner_id);
        return Ok(());
    }

    println!("{}", format!("URLs of owner {}:", owner_id).bold().green());
    println!();
    for url in &urls {
        println!(
            "  {} -> {}",
            short_url(base_url, &url.short_key).cyan(),
            url.original_url.blue().underline()
        );
    }
    println!();
    println!(
        "{} Total {} URLs",
        "ℹ".bold().blue(),
        urls.len().to_string().green()
    );
    Ok(())
}

pub async fn retire_keys(ctx: &AppContext, owner_id: i64, short_keys: &[String]) -> Result<()> {
    let report = ctx.service.retire(short_keys, owner_id).await;
    println!(
        "{} Submitted {} batch(es), {} dropped",
        "ℹ".bold().blue(),
        report.queued.to_string().green(),
        report.dropped.to_string().yellow()
    );

    if !ctx
        .service
        .wait_for_retirements(Duration::from_secs(RETIRE_WAIT_SECS))
        .await
    {
        return Err(ShortenerError::timeout(format!(
            "Retirement still pending after {} seconds",
            RETIRE_WAIT_SECS
        )));
    }

    let stats = ctx.service.deletion_stats();
    if stats.failed > 0 {
        return Err(ShortenerError::database_operation(format!(
            "{} retirement batch(es) failed, see logs",
            stats.failed
        )));
    }
    println!("{} Retirement applied", "✓".bold().green());
    Ok(())
}

pub fn identify_visitor(ctx: &AppContext, token: Option<&str>) -> Result<()> {
    let identity = ctx.identity.identify(token)?;
    let label = if identity.fresh {
        "issued".green()
    } else {
        "valid".cyan()
    };
    println!(
        "{} visitor {} ({} .. {})",
        label,
        identity.id,
        identity.issued_at.format("%Y-%m-%d %H:%M:%S UTC"),
        identity.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if identity.fresh {
        println!("{}={}", ctx.identity.cookie_name(), identity.token);
    }
    Ok(())
}

pub async fn health(ctx: &AppContext) -> Result<()> {
    ctx.service.health_check().await?;
    let caps = ctx.service.capabilities();
    println!(
        "{} {} backend healthy (persistent: {}, persists retirement: {}, persists owner: {})",
        "✓".bold().green(),
        ctx.service.store().backend_name().cyan(),
        caps.persistent,
        caps.persists_retirement,
        caps.persists_owner
    );
    Ok(())
}

pub fn print_config_sample() {
    print!("{}", StaticConfig::generate_sample_config());
}
