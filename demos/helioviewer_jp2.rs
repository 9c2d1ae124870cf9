use anyhow::Result;
use jsocapi::helioviewer::{DEFAULT_API, DataSource, HelioviewerClient};
use jsocapi::time::parse_time;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let hv = HelioviewerClient::connect(DEFAULT_API)?;
    let source = DataSource::Named {
        observatory: "SDO".into(),
        instrument: "HMI".into(),
        detector: None,
        measurement: Some("continuum".into()),
    };
    let date = parse_time("2012/07/03 14:30:00")?;

    let closest = hv.get_closest_image(date, &source)?;
    println!("closest image: {}", closest.date);

    let path = hv.download_jp2(date, &source, None, false)?;
    println!("{}", path.display());
    Ok(())
}
