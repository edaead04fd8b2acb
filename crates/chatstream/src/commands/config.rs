use super::Command;
use crate::error::Error;
use async_trait::async_trait;
use chatstream_core::preferences::Preferences;
use eyre::Result;
use std::io::Write;
use std::path::PathBuf;

pub struct ConfigCommand {
    pub action: ConfigAction,
    /// Preferences file; the platform default when unset.
    pub path: Option<PathBuf>,
}

pub enum ConfigAction {
    Path,
    Show,
    Init { force: bool },
}

#[async_trait]
impl Command for ConfigCommand {
    async fn execute(&self) -> Result<()> {
        let mut stdout = std::io::stdout();
        self.run(&mut stdout).map_err(Into::into)
    }
}

impl ConfigCommand {
    pub fn run(&self, out: &mut impl Write) -> std::result::Result<(), Error> {
        let path = self.resolve_path()?;
        match self.action {
            ConfigAction::Path => {
                writeln!(out, "{}", path.display())?;
            }
            ConfigAction::Show => {
                let prefs = Preferences::load_from(&path)?;
                writeln!(out, "Preferences file: {}", path.display())?;
                writeln!(out, "\n{}", toml::to_string_pretty(&prefs)?)?;
            }
            ConfigAction::Init { force } => {
                if path.exists() && !force {
                    return Err(Error::Config(format!(
                        "{} already exists; pass --force to overwrite",
                        path.display()
                    )));
                }
                Preferences::default().save_to(&path)?;
                tracing::info!(
                    target: "chatstream::config",
                    path = %path.display(),
                    "Wrote default preferences"
                );
                writeln!(out, "Wrote {}", path.display())?;
            }
        }
        Ok(())
    }

    fn resolve_path(&self) -> std::result::Result<PathBuf, Error> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Preferences::config_path()?),
        }
    }
}
