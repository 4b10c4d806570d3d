mod config;
mod telemetry;
mod terminal;

use std::sync::Arc;

use prep_core::model::{ExamConfig, SessionId};
use services::{
    CatalogService, Clock, EngineSettings, ExamResultView, ExamSessionEngine, ResultsService,
};
use storage::repository::{ResultStore, Storage};
use storage::rest::RestRepository;

use config::{Backend, Command, Settings, print_usage};

async fn open_storage(backend: &Backend) -> Result<Storage, Box<dyn std::error::Error>> {
    match backend {
        Backend::Sqlite { db_url, user_id } => {
            let storage = Storage::sqlite(db_url, *user_id).await?;
            tracing::info!(db_url = %db_url, signed_in = user_id.is_some(), "opened sqlite storage");
            Ok(storage)
        }
        Backend::Rest(rest) => {
            tracing::info!(base_url = %rest.base_url, "using rest storage");
            Ok(Storage::from_repository(RestRepository::new(rest.clone())))
        }
    }
}

fn results_service(storage: &Storage) -> ResultsService {
    ResultsService::new(
        Clock::system(),
        Arc::clone(&storage.questions),
        Arc::clone(&storage.results),
        Arc::clone(&storage.history),
    )
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_process().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    if settings.command == Command::Help {
        print_usage();
        return Ok(());
    }

    telemetry::init_tracing(&settings.telemetry)?;
    let storage = open_storage(&settings.backend).await?;

    match settings.command {
        Command::Exam {
            category,
            count,
            shuffle,
        } => {
            let config = ExamConfig::new(category, count, SessionId::random());
            let session_id = config.session_id();
            let engine = ExamSessionEngine::with_settings(
                config,
                Arc::clone(&storage.questions),
                Arc::clone(&storage.results),
                Clock::system(),
                EngineSettings::default()
                    .with_persist_timeout(settings.persist_timeout)
                    .with_shuffle(shuffle),
            );
            engine.load().await?;

            match terminal::run_exam(&engine).await? {
                Some(_) => {
                    let view = results_service(&storage).result(session_id).await?;
                    terminal::render_result(&view);
                    println!();
                    println!("Review answers with: exam-prep review {session_id}");
                }
                None => println!("Exam abandoned; nothing was saved."),
            }
        }
        Command::Results(session_id) => {
            let view = results_service(&storage).result(session_id).await?;
            terminal::render_result(&view);
        }
        Command::Review(session_id) => {
            let service = results_service(&storage);
            let view = service.result(session_id).await?;
            terminal::render_result(&view);
            terminal::render_review(&service.review(session_id).await?);
        }
        Command::Stats => {
            let stats = results_service(&storage).current_user_stats().await?;
            terminal::render_stats(&stats);
            let user_id = storage.results.current_identity().await?;
            if let Some(user_id) = user_id {
                let recent: Vec<ExamResultView> =
                    results_service(&storage).recent_results(user_id, 5).await?;
                for view in &recent {
                    println!(
                        "  {}  {:<4} {:>3}%  {}",
                        view.submitted_at.format("%Y-%m-%d %H:%M"),
                        view.category,
                        view.percentage,
                        view.session_id
                    );
                }
            }
        }
        Command::Categories => {
            let categories = CatalogService::new(Arc::clone(&storage.questions))
                .categories()
                .await?;
            if categories.is_empty() {
                println!("No questions yet. Seed some with: cargo run -p storage --bin seed");
            }
            for category in categories {
                println!("{category}");
            }
        }
        Command::Help => print_usage(),
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
