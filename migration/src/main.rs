use std::io::{self, Write};
use std::time::Instant;
use std::{env, fs, path::Path};

use colored::Colorize;
use sea_orm_migration::prelude::*;

use common::config::Config;
use common::logger::init_logger;
use migration::Migrator;

#[tokio::main]
async fn main() {
    let config = Config::init(".env");
    init_logger(&config.log_level, &config.log_file);

    let db_path = config.database_path.clone();
    let url = format!("sqlite://{db_path}?mode=rwc");
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("clean") => {
            remove_db_file(&db_path);
        }
        Some("fresh") => {
            remove_db_file(&db_path);
            create_db_dir(&db_path);
            apply_all(&url).await;
        }
        _ => {
            create_db_dir(&db_path);
            apply_all(&url).await;
        }
    }
}

async fn apply_all(url: &str) {
    let db = sea_orm::Database::connect(url)
        .await
        .expect("DB connection failed");
    let manager = SchemaManager::new(&db);

    println!("Applying migrations to {url}");
    for migration in <Migrator as MigratorTrait>::migrations() {
        print!("  {:<56}", migration.name());
        io::stdout().flush().ok();

        let started = Instant::now();
        match migration.up(&manager).await {
            Ok(()) => {
                let elapsed = format!("({:.2?})", started.elapsed());
                println!("{} {}", "ok".green(), elapsed.dimmed());
            }
            Err(e) => {
                println!("{}", "failed".red());
                eprintln!("{e}");
                std::process::exit(1);
            }
        }
    }
}

fn remove_db_file(path: &str) {
    let db_path = Path::new(path);
    if db_path.exists() {
        fs::remove_file(db_path).expect("Failed to delete DB file");
        println!("Deleted DB: {}", db_path.display());
    } else {
        println!("DB file does not exist: {}", db_path.display());
    }

    // Enrolled face embeddings go with the accounts that own them.
    let embedding_root = &Config::get().embedding_storage_root;
    let embedding_path = Path::new(embedding_root);
    if embedding_path.exists() {
        fs::remove_dir_all(embedding_path).expect("Failed to delete face embeddings");
        println!("Deleted face embeddings: {}", embedding_path.display());
    } else {
        println!(
            "Embedding storage does not exist: {}",
            embedding_path.display()
        );
    }
}

fn create_db_dir(path: &str) {
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent).expect("Failed to create DB directory");
    }
}
