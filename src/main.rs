#[tokio::main]
async fn main() -> eyre::Result<()> {
    outbox_relay::run().start().await
}
