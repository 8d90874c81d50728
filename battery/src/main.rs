#[tokio::main]
async fn main() -> anyhow::Result<()> {
    smartnode_battery::host::run().await
}
