//! Example: Blog Application Migrations
//!
//! This example shows the whole migration cycle for a blog application:
//! declaring models, generating migrations from them, applying them to an
//! in-memory SQLite database, evolving a model and rolling back.
//!
//! Run with: cargo run --example blog_migrations -p keel-migrate

use keel_migrate::prelude::*;
use keel_orm::fields::DateTimeField;
use keel_orm::{Field, ModelDeclaration, SqliteEngine};

fn models_v1() -> Vec<ModelDeclaration> {
    vec![
        ModelDeclaration::new("Author")
            .field("username", Field::char(100).unique())
            .field("email", Field::char(255)),
        ModelDeclaration::new("Post")
            .field("author_id", Field::integer().index())
            .field("title", Field::char(200))
            .field("body", Field::text())
            .field("created_at", Field::DateTimeField(DateTimeField::new().auto_now_add())),
    ]
}

fn models_v2() -> Vec<ModelDeclaration> {
    vec![
        ModelDeclaration::new("Author")
            .field("username", Field::char(100).unique())
            .field("email", Field::char(255))
            .field("bio", Field::text().null()),
        ModelDeclaration::new("Post")
            .field("author_id", Field::integer().index())
            .field("title", Field::char(200))
            .field("body", Field::text())
            .field("created_at", Field::DateTimeField(DateTimeField::new().auto_now_add()))
            .field("published", Field::boolean().default(false))
            .index("blog_post_published_created", ["published", "created_at"]),
    ]
}

fn make(loader: &MigrationLoader, models: &[ModelDeclaration]) -> Result<()> {
    if let Some(migration) = make_migration("blog", models, loader, None)? {
        println!("    {}:", migration.name);
        for operation in &migration.operations {
            println!("      - {}", operation.description());
        }
        loader.write(&migration)?;
    }
    Ok(())
}

async fn show(executor: &mut MigrationExecutor<SqliteEngine>, loader: &MigrationLoader) -> Result<()> {
    for status in executor.status("blog", &loader.load_app("blog")?).await? {
        let mark = if status.applied { "X" } else { " " };
        println!("    [{mark}] blog/{}", status.name);
    }
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!(" KEEL-MIGRATE: Blog Application Example");
    println!("{}", "=".repeat(70));
    println!();

    let dir = tempfile::tempdir()?;
    let loader = MigrationLoader::new(dir.path(), OperationRegistry::default());

    println!("[1] Generating the initial migration...");
    make(&loader, &models_v1())?;
    println!();

    let mut executor = MigrationExecutor::new(SqliteEngine::connect("sqlite::memory:").await?);
    println!("[2] Initializing migration system...");
    executor.init().await?;
    println!("    Created {LEDGER_TABLE} table\n");

    println!("[3] Applying migrations...");
    executor.apply("blog", &loader.load_app("blog")?, None).await?;
    show(&mut executor, &loader).await?;

    println!("[4] Evolving the models...");
    make(&loader, &models_v2())?;
    println!();

    let migrations = loader.load_app("blog")?;
    println!("[5] SQL for 0002_auto:");
    println!("{}", "-".repeat(70));
    for sql in migration_sql("sqlite", "blog", &migrations, "0002_auto", false).await? {
        println!("{sql};");
    }
    println!("{}", "-".repeat(70));
    println!();

    println!("[6] Applying the new migration...");
    executor.apply("blog", &migrations, None).await?;
    show(&mut executor, &loader).await?;

    println!("[7] Rolling back to 0001...");
    executor.rollback("blog", &migrations, "0001").await?;
    show(&mut executor, &loader).await?;

    println!("{}", "=".repeat(70));
    println!(" Done.");
    println!("{}", "=".repeat(70));
    Ok(())
}
