#[tokio::main]
async fn main() {
    if let Err(e) = led_race::run_with_config().await {
        tracing::error!(error = %e, "race server stopped");
        std::process::exit(1);
    }
}
