//! App contract and the App Registry.
//!
//! An App is a named unit of periodic work. The registry is a dense table
//! built once at startup: indices are handed out in registration order and
//! never change afterwards.

use core::fmt;

use arrayvec::ArrayString;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AppError, AppResult, RegistrationError};

pub const MAX_APPS: usize = 32;
pub const APP_NAME_LEN: usize = 32;

pub type AppName = ArrayString<APP_NAME_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(pub u16);

impl AppId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A schedulable unit of periodic work. State is owned by the implementor
/// and never touched by the core.
pub trait App {
    fn name(&self) -> &str;

    /// Called exactly once, before the first scheduled `update`.
    fn init(&mut self) -> AppResult;

    fn update(&mut self) -> AppResult;

    /// Snapshot of owned state for telemetry collection.
    fn report(&self) -> Option<serde_json::Value> {
        None
    }
}

/// App assembled from a name and two callables.
pub struct FnApp<I, U>
where
    I: FnMut() -> AppResult,
    U: FnMut() -> AppResult,
{
    name: &'static str,
    init: I,
    update: U,
}

impl<I, U> FnApp<I, U>
where
    I: FnMut() -> AppResult,
    U: FnMut() -> AppResult,
{
    pub fn new(name: &'static str, init: I, update: U) -> Self {
        Self { name, init, update }
    }
}

impl<I, U> App for FnApp<I, U>
where
    I: FnMut() -> AppResult,
    U: FnMut() -> AppResult,
{
    fn name(&self) -> &str {
        self.name
    }

    fn init(&mut self) -> AppResult {
        (self.init)()
    }

    fn update(&mut self) -> AppResult {
        (self.update)()
    }
}

/// What to do with an App whose `init` failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitPolicy {
    /// Keep scheduling its updates.
    #[default]
    Tolerant,
    /// Report `AppError::NotInitialized` instead of calling `update`.
    SkipUpdates,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AppStats {
    pub initialized: bool,
    pub init_error: Option<AppError>,
    pub update_count: u32,
    pub failure_count: u32,
    pub last_error: Option<AppError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppReport {
    pub id: AppId,
    pub name: AppName,
    pub stats: AppStats,
    pub state: Option<serde_json::Value>,
}

/// Result of `init_all`: how many Apps came up and which did not.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InitSummary {
    pub initialized: u16,
    pub failed: Vec<(AppId, AppError), MAX_APPS>,
}

struct AppEntry {
    name: AppName,
    app: alloc::boxed::Box<dyn App>,
    stats: AppStats,
}

pub struct AppRegistry {
    entries: Vec<AppEntry, MAX_APPS>,
    policy: InitPolicy,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::with_policy(InitPolicy::default())
    }

    pub fn with_policy(policy: InitPolicy) -> Self {
        Self {
            entries: Vec::new(),
            policy,
        }
    }

    pub fn set_policy(&mut self, policy: InitPolicy) {
        self.policy = policy;
    }

    pub fn policy(&self) -> InitPolicy {
        self.policy
    }

    /// Register an App under the next free index.
    pub fn register(&mut self, app: alloc::boxed::Box<dyn App>) -> Result<AppId, RegistrationError> {
        let name = AppName::from(app.name())
            .map_err(|_| RegistrationError::NameTooLong(app.name().into()))?;

        if self.entries.iter().any(|entry| entry.name == name) {
            return Err(RegistrationError::DuplicateName(name.as_str().into()));
        }

        let id = AppId(self.entries.len() as u16);
        self.entries
            .push(AppEntry {
                name,
                app,
                stats: AppStats::default(),
            })
            .map_err(|_| RegistrationError::CapacityExceeded)?;

        Ok(id)
    }

    /// Run every App's `init` in registration order. A failing `init` is
    /// recorded and the remaining Apps are still initialized.
    pub fn init_all(&mut self) -> InitSummary {
        let mut summary = InitSummary::default();

        for (index, entry) in self.entries.iter_mut().enumerate() {
            let id = AppId(index as u16);
            match entry.app.init() {
                Ok(()) => {
                    entry.stats.initialized = true;
                    entry.stats.init_error = None;
                    summary.initialized += 1;
                    info!(app = %entry.name, index, "app initialized");
                }
                Err(e) => {
                    entry.stats.initialized = false;
                    entry.stats.init_error = Some(e);
                    // Capacity equals MAX_APPS, so this never overflows.
                    let _ = summary.failed.push((id, e));
                    warn!(app = %entry.name, index, error = %e, "app init failed");
                }
            }
        }

        summary
    }

    /// Run one App's `update` and fold the outcome into its statistics.
    pub fn update(&mut self, id: AppId) -> Result<AppResult, RegistrationError> {
        let policy = self.policy;
        let entry = self
            .entries
            .get_mut(id.index())
            .ok_or(RegistrationError::NotFound(id))?;

        let result = if policy == InitPolicy::SkipUpdates && entry.stats.init_error.is_some() {
            Err(AppError::NotInitialized)
        } else {
            entry.app.update()
        };

        entry.stats.update_count = entry.stats.update_count.wrapping_add(1);
        if let Err(e) = result {
            entry.stats.failure_count = entry.stats.failure_count.wrapping_add(1);
            entry.stats.last_error = Some(e);
        }

        Ok(result)
    }

    pub fn get(&self, id: AppId) -> Result<&dyn App, RegistrationError> {
        self.entries
            .get(id.index())
            .map(|entry| entry.app.as_ref())
            .ok_or(RegistrationError::NotFound(id))
    }

    pub fn stats(&self, id: AppId) -> Option<&AppStats> {
        self.entries.get(id.index()).map(|entry| &entry.stats)
    }

    pub fn name_of(&self, id: AppId) -> Option<&str> {
        self.entries.get(id.index()).map(|entry| entry.name.as_str())
    }

    pub fn find_by_name(&self, name: &str) -> Option<AppId> {
        self.entries
            .iter()
            .position(|entry| entry.name.as_str() == name)
            .map(|index| AppId(index as u16))
    }

    pub fn contains(&self, id: AppId) -> bool {
        id.index() < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn reports(&self) -> alloc::vec::Vec<AppReport> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| AppReport {
                id: AppId(index as u16),
                name: entry.name,
                stats: entry.stats.clone(),
                state: entry.app.report(),
            })
            .collect()
    }
}

impl Default for AppRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AppRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppRegistry")
            .field("apps", &self.entries.iter().map(|e| e.name.as_str()).collect::<alloc::vec::Vec<_>>())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;

    fn ok_app(name: &'static str) -> Box<dyn App> {
        Box::new(FnApp::new(name, || Ok(()), || Ok(())))
    }

    #[test]
    fn test_indices_follow_registration_order() {
        let mut registry = AppRegistry::new();
        assert_eq!(registry.register(ok_app("update_adc")).unwrap(), AppId(0));
        assert_eq!(registry.register(ok_app("update_gpio")).unwrap(), AppId(1));
        assert_eq!(registry.find_by_name("update_gpio"), Some(AppId(1)));
        assert_eq!(registry.name_of(AppId(0)), Some("update_adc"));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = AppRegistry::new();
        registry.register(ok_app("update_adc")).unwrap();
        let result = registry.register(ok_app("update_adc"));
        assert_eq!(result, Err(RegistrationError::DuplicateName("update_adc".into())));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_out_of_range_is_not_found() {
        let registry = AppRegistry::new();
        assert!(matches!(registry.get(AppId(3)), Err(RegistrationError::NotFound(AppId(3)))));
    }

    #[test]
    fn test_init_failure_does_not_stop_remaining_inits() {
        let mut registry = AppRegistry::new();
        registry
            .register(Box::new(FnApp::new("broken", || Err(AppError::Failed("no hw")), || Ok(()))))
            .unwrap();
        registry.register(ok_app("fine")).unwrap();

        let summary = registry.init_all();
        assert_eq!(summary.initialized, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0], (AppId(0), AppError::Failed("no hw")));
        assert!(registry.stats(AppId(1)).unwrap().initialized);
    }

    #[test]
    fn test_skip_updates_policy() {
        let mut registry = AppRegistry::with_policy(InitPolicy::SkipUpdates);
        registry
            .register(Box::new(FnApp::new("broken", || Err(AppError::Failed("no hw")), || Ok(()))))
            .unwrap();
        registry.init_all();

        let result = registry.update(AppId(0)).unwrap();
        assert_eq!(result, Err(AppError::NotInitialized));
        assert_eq!(registry.stats(AppId(0)).unwrap().failure_count, 1);

        registry.set_policy(InitPolicy::Tolerant);
        assert_eq!(registry.update(AppId(0)).unwrap(), Ok(()));
    }
}
