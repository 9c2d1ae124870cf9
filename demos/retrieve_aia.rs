use anyhow::Result;
use jsocapi::{Attr, Client, GetOptions};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Configure a registered notification address via JSOC_NOTIFY or a `.jsocrc` file.
    let client = Client::from_env()?;

    let query = Attr::time("2014-01-01T00:00:00", "2014-01-01T00:01:00")?
        & Attr::series("aia.lev1_euv_12s")
        & Attr::wavelength(304.0)
        & Attr::Segment("image".into());

    let mut response = client.query(&query, &[])?;
    println!("{} record(s) matched", response.len());

    let results = client.get(&mut response, &GetOptions::default())?;
    for path in results.paths() {
        println!("{}", path.display());
    }
    for (key, reason) in results.failures() {
        eprintln!("failed: {key}: {reason}");
    }
    Ok(())
}
