#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = testverse_exam::run().await {
        eprintln!("testverse-exam fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
