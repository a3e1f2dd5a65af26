//! Host platform capabilities, resolved once at startup.
//!
//! Mobile hosts hand us an [`AppContext`] exactly once through an
//! [`AppContextHolder`]; desktop hosts need nothing beyond a memory budget.
//! Everything platform dependent (database location, image cache budget,
//! dynamic color) is asked of the [`Platform`] value instead of being
//! branched on at the call sites.

use crate::db::DatabaseBuilder;
use crate::theme::{Color, ThemeHost};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::OnceLock;
use sysinfo::System;
use thiserror::Error;

/// First mobile platform version that can extract dynamic colors.
pub const DYNAMIC_COLOR_MIN_VERSION: u32 = 31;

const DATABASES_DIR: &str = "databases";

/// Used when the host reports no memory at all.
pub const FALLBACK_MEMORY_BUDGET: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("application context has not been initialized")]
    Uninitialized,
    #[error("application context is already initialized")]
    AlreadyInitialized,
}

/// Environment handle a mobile host provides at process start.
#[derive(Debug, Clone, PartialEq)]
pub struct AppContext {
    /// Application-private files directory.
    pub files_dir: PathBuf,
    /// Memory the host allows this process to use, in bytes.
    pub memory_class: u64,
    pub platform_version: u32,
    /// Seed color extracted by the host, if it supports it.
    pub dynamic_seed: Option<Color>,
}

/// Write-once holder for the [`AppContext`].
#[derive(Debug)]
pub struct AppContextHolder {
    cell: OnceLock<AppContext>,
}

impl AppContextHolder {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    pub fn init(&self, context: AppContext) -> Result<(), PlatformError> {
        match self.cell.set(context) {
            Ok(()) => {
                info!("[Platform] Application context initialized");
                Ok(())
            }
            Err(_) => Err(PlatformError::AlreadyInitialized),
        }
    }

    pub fn get(&self) -> Result<&AppContext, PlatformError> {
        self.cell.get().ok_or(PlatformError::Uninitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl Default for AppContextHolder {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide holder for hosts that can only reach us through a global.
pub static APP_CONTEXT: AppContextHolder = AppContextHolder::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesktopEnv {
    /// Memory budget reported for this process, in bytes.
    pub memory_budget: u64,
}

impl DesktopEnv {
    /// Budget from the host's available memory, or its total memory when
    /// availability is not reported.
    pub fn from_host() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        let memory_budget = match (system.available_memory(), system.total_memory()) {
            (0, 0) => {
                warn!("[Platform] Host reports no memory, using {} bytes", FALLBACK_MEMORY_BUDGET);
                FALLBACK_MEMORY_BUDGET
            }
            (0, total) => total,
            (available, _) => available,
        };
        debug!("[Platform] Desktop memory budget {} bytes", memory_budget);
        Self { memory_budget }
    }

    /// `override_mib` wins over the host's report.
    pub fn resolve(override_mib: Option<u64>) -> Self {
        match override_mib {
            Some(mib) => Self {
                memory_budget: mib_to_bytes(mib),
            },
            None => Self::from_host(),
        }
    }
}

pub fn mib_to_bytes(mib: u64) -> u64 {
    mib.saturating_mul(1024 * 1024)
}

#[derive(Debug, Clone, Copy)]
pub enum Platform<'a> {
    Mobile(&'a AppContextHolder),
    Desktop(DesktopEnv),
}

impl Platform<'static> {
    /// The platform this binary was compiled for.
    pub fn current(desktop: DesktopEnv) -> Self {
        cfg_if::cfg_if! {
            if #[cfg(any(target_os = "android", target_os = "ios"))] {
                let _ = desktop;
                Platform::Mobile(&APP_CONTEXT)
            } else {
                Platform::Desktop(desktop)
            }
        }
    }
}

impl Platform<'_> {
    pub fn is_mobile(&self) -> bool {
        matches!(self, Platform::Mobile(_))
    }

    pub fn database_builder(&self, name: &str) -> Result<DatabaseBuilder, PlatformError> {
        match self {
            Platform::Mobile(holder) => mobile_database_builder(holder, name),
            Platform::Desktop(_) => Ok(desktop_database_builder(name)),
        }
    }

    pub fn memory_budget(&self) -> Result<u64, PlatformError> {
        match self {
            Platform::Mobile(holder) => Ok(holder.get()?.memory_class),
            Platform::Desktop(env) => Ok(env.memory_budget),
        }
    }

    /// Theme inputs for the current system dark mode state.
    pub fn theme_host(&self, dark_mode: bool) -> ThemeHost {
        match self {
            Platform::Mobile(holder) => match holder.get() {
                Ok(context) => ThemeHost {
                    platform_version: Some(context.platform_version),
                    dynamic_seed: context.dynamic_seed,
                    dark_mode,
                },
                Err(_) => ThemeHost::plain(dark_mode),
            },
            Platform::Desktop(_) => ThemeHost::plain(dark_mode),
        }
    }
}

pub fn mobile_database_builder(
    holder: &AppContextHolder,
    name: &str,
) -> Result<DatabaseBuilder, PlatformError> {
    let context = holder.get()?;
    let path = context.files_dir.join(DATABASES_DIR).join(name);
    debug!("[Platform] Mobile database '{}' at {:?}", name, path);
    Ok(DatabaseBuilder::new(name, path))
}

pub fn desktop_database_builder(name: &str) -> DatabaseBuilder {
    debug!("[Platform] Desktop database at '{}'", name);
    DatabaseBuilder::new(name, PathBuf::from(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(version: u32) -> AppContext {
        AppContext {
            files_dir: PathBuf::from("/data/user/0/quiz/files"),
            memory_class: 256 * 1024 * 1024,
            platform_version: version,
            dynamic_seed: Some(Color(0xFF3A6EA5)),
        }
    }

    #[test]
    fn test_mobile_builder_requires_context() {
        let holder = AppContextHolder::new();
        let platform = Platform::Mobile(&holder);

        assert_eq!(
            platform.database_builder("quiz.db").unwrap_err(),
            PlatformError::Uninitialized
        );
        assert_eq!(platform.memory_budget(), Err(PlatformError::Uninitialized));

        holder.init(context(34)).unwrap();
        let builder = platform.database_builder("quiz.db").unwrap();
        assert_eq!(builder.name(), "quiz.db");
        assert_eq!(
            builder.path(),
            PathBuf::from("/data/user/0/quiz/files/databases/quiz.db").as_path()
        );
    }

    #[test]
    fn test_context_is_single_assignment() {
        let holder = AppContextHolder::new();
        assert!(!holder.is_initialized());
        holder.init(context(30)).unwrap();
        assert_eq!(holder.init(context(34)), Err(PlatformError::AlreadyInitialized));
        assert_eq!(holder.get().unwrap().platform_version, 30);
    }

    #[test]
    fn test_desktop_builder_needs_no_init() {
        let platform = Platform::Desktop(DesktopEnv { memory_budget: 1024 });
        let builder = platform.database_builder("quiz.db").unwrap();

        assert_eq!(builder.name(), "quiz.db");
        assert_eq!(builder.path(), PathBuf::from("quiz.db").as_path());
        assert_eq!(platform.memory_budget(), Ok(1024));
    }

    #[test]
    fn test_desktop_budget_comes_from_host() {
        let env = DesktopEnv::resolve(None);
        assert!(env.memory_budget > 0);
        assert_eq!(env, DesktopEnv { memory_budget: env.memory_budget });
        assert_eq!(Platform::Desktop(env).memory_budget(), Ok(env.memory_budget));
    }

    #[test]
    fn test_desktop_budget_override_saturates() {
        assert_eq!(DesktopEnv::resolve(Some(512)).memory_budget, 512 * 1024 * 1024);
        assert_eq!(DesktopEnv::resolve(Some(u64::MAX)).memory_budget, u64::MAX);
        assert_eq!(mib_to_bytes(u64::MAX / 2), u64::MAX);
    }

    #[test]
    fn test_theme_host_per_platform() {
        let holder = AppContextHolder::new();
        holder.init(context(33)).unwrap();

        let mobile = Platform::Mobile(&holder).theme_host(true);
        assert_eq!(mobile.platform_version, Some(33));
        assert!(mobile.supports_dynamic_color());

        let desktop = Platform::Desktop(DesktopEnv { memory_budget: 0 }).theme_host(false);
        assert!(!desktop.supports_dynamic_color());
        assert!(!desktop.dark_mode);
    }
}
