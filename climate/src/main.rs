#[tokio::main]
async fn main() -> anyhow::Result<()> {
    smartnode_climate::host::run().await
}
