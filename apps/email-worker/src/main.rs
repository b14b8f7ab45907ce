//! Email worker: consumes `email.queue` and delivers via SMTP.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    email_worker::run().await
}
