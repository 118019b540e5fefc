use fluxa_x402_facilitator::run;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("fluxa-x402-facilitator failed: {e}");
        std::process::exit(1);
    }
}
