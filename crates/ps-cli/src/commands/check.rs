//! Check-login command: a credential probe with no side effects.

use std::io::Write;

use anyhow::{Context, Result};

use ps_api::TConnectApi;

use crate::Config;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let api = TConnectApi::new(&config.tconnect_email, &config.tconnect_password)?;
    api.login().context("t:connect login failed")?;
    writeln!(writer, "Login successful for {}", config.tconnect_email)?;
    Ok(())
}
