use std::sync::{Arc, RwLock};

use clap::Parser;

mod app;
mod cli;
mod config;
mod posts;
mod semantic;
mod web;

use config::Config;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();

    let config = Arc::new(RwLock::new(Config::load()));
    let app_mgr = app::AppLocal::new(config.clone())?;

    match args.command {
        cli::Command::Daemon {} => {
            web::start_daemon(app_mgr);
            Ok(())
        }

        cli::Command::List {} => {
            let posts = app_mgr.list_posts()?;
            println!("{}", serde_json::to_string_pretty(&posts)?);
            Ok(())
        }

        cli::Command::Add { username, text } => {
            let post = app_mgr.create_post(posts::PostCreate {
                username,
                post_text: text,
            })?;
            println!("{}", serde_json::to_string_pretty(&post)?);
            Ok(())
        }

        cli::Command::Search {
            query,
            threshold,
            plain,
        } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;

            let outcome = runtime.block_on(async {
                if plain {
                    app_mgr.plain_search(&query)
                } else {
                    app_mgr.search_posts_once(&query, threshold).await
                }
            })?;

            println!("{}", serde_json::to_string_pretty(&outcome.posts)?);
            Ok(())
        }
    }
}
