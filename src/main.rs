#[tokio::main]
async fn main() {
    if let Err(e) = vprov_lib::run().await {
        tracing::error!("vprov exited with error: {}", e);
        eprintln!("vprov: {e}");
        std::process::exit(1);
    }
}
