pub mod db;
pub mod images;
pub mod models;
pub mod platform;
pub mod quiz;
pub mod settings;
pub mod theme;

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("cannot prepare database location")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Platform(#[from] platform::PlatformError),
    #[error(transparent)]
    Settings(#[from] settings::SettingsError),
    #[error(transparent)]
    Image(#[from] images::ImageLoadError),
    #[error("no subjects!")]
    NoSubjects,
    #[cfg(feature = "gui")]
    #[error("gui error: {0}")]
    Gui(#[from] eframe::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
