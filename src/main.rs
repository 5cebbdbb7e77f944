#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tazkarti_events_lib::run().await
}
