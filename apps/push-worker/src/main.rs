//! Push worker: consumes `push.queue` and delivers via FCM.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    push_worker::run().await
}
