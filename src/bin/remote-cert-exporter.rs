use remote_cert_exporter::cli::start;

#[tokio::main]
async fn main() {
    if let Err(e) = start::start().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
