use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    gpt_autogen::run().await
}
