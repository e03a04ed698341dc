use std::sync::Arc;

use anyhow::{bail, Context, Result};
use shellcache_core::{
    Coordinator, CoordinatorConfig, DiskStore, HttpFetcher, LifecycleHooks, Method, Request,
    RequestMode, Routed, StoreManager,
};
use tracing::{info, warn};

use crate::cli::{Cli, Command};
use crate::settings;

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::InitConfig { force } => init_config(&cli, force),
        Command::ShowConfig => show_config(&cli),
        Command::Install => install(&cli).await,
        Command::Stores => list_stores(&cli).await,
        Command::Get {
            ref url,
            navigate,
            ref method,
            no_wait,
            ref output,
        } => {
            let mode = if navigate {
                RequestMode::Navigate
            } else {
                RequestMode::Subresource
            };
            let request = Request::parse(Method::parse(method), url)?.with_mode(mode);
            get(&cli, request, no_wait, output.as_deref()).await
        }
    }
}

fn build_coordinator(cli: &Cli, config: CoordinatorConfig) -> Result<Coordinator> {
    let root = settings::store_dir(cli)?;
    let stores = StoreManager::new(Arc::new(DiskStore::new(root)));
    let fetcher = HttpFetcher::new().context("Failed to build HTTP client")?;
    Coordinator::new(config, stores, Arc::new(fetcher)).context("Invalid configuration")
}

fn init_config(cli: &Cli, force: bool) -> Result<()> {
    let path = settings::config_path(cli)?;
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    CoordinatorConfig::default().save_to(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn show_config(cli: &Cli) -> Result<()> {
    let config = settings::load_config(cli)?;
    config.validate()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!("core store:    {}", config.core_store_name());
    println!("dynamic store: {}", config.dynamic_store_name());
    println!("store dir:     {}", settings::store_dir(cli)?.display());
    Ok(())
}

async fn install(cli: &Cli) -> Result<()> {
    let config = settings::load_config(cli)?;
    let coordinator = build_coordinator(cli, config)?;
    info!(version = %coordinator.config().version, "Installing");

    let report = coordinator.install().await;

    match report.commit {
        Ok(ref commit) => {
            for name in &commit.deleted {
                println!("deleted   {}", name);
            }
            for name in &commit.failed {
                println!("kept      {} (delete failed)", name);
            }
        }
        Err(ref e) => warn!(error = %e, "Commit failed"),
    }

    match report.provision {
        Ok(provision) => {
            println!(
                "provisioned {} shell resource(s) into {} (activation: {:?})",
                provision.stored, provision.core_store, provision.activation
            );
            report.commit?;
            Ok(())
        }
        Err(e) => Err(e).context("Provisioning failed; version not activated"),
    }
}

async fn list_stores(cli: &Cli) -> Result<()> {
    let config = settings::load_config(cli)?;
    let stores = StoreManager::new(Arc::new(DiskStore::new(settings::store_dir(cli)?)));
    let names = stores.list_store_names().await?;
    if names.is_empty() {
        println!("No stores");
        return Ok(());
    }

    let current = [config.core_store_name(), config.dynamic_store_name()];
    for name in names {
        let count = stores.handle(&name).keys().await?.len();
        let marker = if current.contains(&name) { "*" } else { " " };
        println!("{} {:<32} {:>6} entries", marker, name, count);
    }
    Ok(())
}

async fn get(
    cli: &Cli,
    request: Request,
    no_wait: bool,
    output: Option<&std::path::Path>,
) -> Result<()> {
    let config = settings::load_config(cli)?;
    let coordinator = build_coordinator(cli, config)?;
    let url = request.url.to_string();

    let mut served = match coordinator.on_request(request).await? {
        Routed::PassThrough => {
            println!("pass-through: {} is not intercepted", url);
            return Ok(());
        }
        Routed::Served(served) => served,
    };

    println!(
        "{} {} bytes from {} ({:?})",
        served.response.status,
        served.response.body.len(),
        served.source,
        served.class
    );
    if let Some(path) = output {
        std::fs::write(path, &served.response.body)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    // Exiting the runtime cancels detached tasks, so wait unless told not to
    if let Some(revalidation) = served.take_revalidation() {
        if !no_wait {
            let outcome = revalidation.settled().await;
            println!("revalidation: {:?}", outcome);
        }
    }
    Ok(())
}
