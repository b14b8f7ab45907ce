use migration::Migrator;
use sea_orm_migration::sea_orm::Database;
use sea_orm_migration::{DbErr, MigratorTrait};

#[tokio::main]
async fn main() -> Result<(), DbErr> {
    let url = std::env::var("DATABASE_URL")
        .map_err(|_| DbErr::Custom("DATABASE_URL is required".to_string()))?;

    let db = Database::connect(&url).await?;
    Migrator::up(&db, None).await?;

    println!("Migrations applied");
    Ok(())
}
