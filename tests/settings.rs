use std::io::Write;
use std::path::PathBuf;

use pointdash::settings::{Settings, SettingsError};

fn toml_file(contents: &str) -> anyhow::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[test]
fn missing_file_falls_back_to_defaults() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let settings = Settings::load(Some(&dir.path().join("absent.toml")))?;

    assert_eq!(settings.server.bind, "0.0.0.0:5000");
    assert_eq!(settings.server.addr()?.port(), 5000);
    assert_eq!(settings.data.prices, PathBuf::from("data/processed/prices.csv"));
    assert_eq!(settings.data.changepoints, PathBuf::from("models/changepoints.csv"));
    assert_eq!(settings.data.events, PathBuf::from("data/event/events.csv"));

    Ok(())
}

#[test]
fn toml_file_overrides_defaults() -> anyhow::Result<()> {
    let file = toml_file(
        "[server]\nbind = \"127.0.0.1:8081\"\n\n[data]\nprices = \"/srv/brent/prices.csv\"\n",
    )?;
    let settings = Settings::load(Some(file.path()))?;

    assert_eq!(settings.server.addr()?.to_string(), "127.0.0.1:8081");
    assert_eq!(settings.data.prices, PathBuf::from("/srv/brent/prices.csv"));
    assert_eq!(settings.data.events, PathBuf::from("data/event/events.csv"));

    Ok(())
}

#[test]
fn unparseable_bind_address_is_rejected() -> anyhow::Result<()> {
    let file = toml_file("[server]\nbind = \"localhost-ish\"\n")?;

    let error = Settings::load(Some(file.path())).expect_err("bind must be a socket address");
    assert!(matches!(error, SettingsError::Invalid(ref message) if message.contains("localhost-ish")));

    Ok(())
}
