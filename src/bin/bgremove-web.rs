//! Background removal web server
//!
//! Serves a single page where an uploaded image is run through a
//! segmentation model and the cut-out comes back as a transparent PNG.

#[cfg(feature = "cli")]
use bgremove_web::cli;

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
