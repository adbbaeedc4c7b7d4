#[tokio::main]
async fn main() -> anyhow::Result<()> {
    beachwatch_lib::run().await
}
