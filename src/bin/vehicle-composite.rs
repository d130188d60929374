//! Vehicle compositing CLI tool
//!
//! Places a vehicle photo onto a background with shadow, reflection and
//! plate redaction.

#[cfg(feature = "cli")]
use vehicle_composite::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
