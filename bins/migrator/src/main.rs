//! Schema migrations for the Rampart database.
//!
//! The sea-orm CLI reads `DATABASE_URL` (or `-u <url>`), not the
//! `RAMPART__DATABASE__URL` the server uses. The server also migrates on
//! startup; this binary is for rollbacks and inspection.
//!
//!   migrator up | down | status | fresh | refresh | reset

use rampart_db::migration::Migrator;
use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    cli::run_cli(Migrator).await;
}
