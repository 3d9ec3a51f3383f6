//! App Core for Tab Groups.
//!
//! The session object behind every command: it owns the group store, the settings,
//! the branch tracker and the last used group name, and reaches the editor through
//! the host and user-interaction capabilities.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::database::{Database, KeyValueStore, SqliteKeyValueStore};
use crate::host::{EditorHost, UserInteraction};
use crate::managers::branch_tracker::{BranchState, BranchTracker};
use crate::managers::editor_probe::{EditorProbe, ProbeConfig};
use crate::managers::group_store::{GroupStore, GroupStoreTrait, UndoOutcome};
use crate::managers::restore_engine::{RestoreEngine, RestoreReport};
use crate::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use crate::types::errors::{CommandError, StoreError};
use crate::types::settings::ExtensionSettings;
use crate::types::snapshot::Snapshot;

pub const NO_SAVED_GROUPS: &str = "No saved groups";
pub const NO_LAST_GROUP: &str = "No last group";
pub const NOTHING_TO_UNDO: &str = "Nothing to undo";

const NAME_PROMPT: &str = "Enter name for group or empty for default name";
const OVERWRITE_PROMPT: &str = "Tab group already exists. Do you want to overwrite? (y/n)";

/// What a command ended up doing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum CommandOutcome {
    Done,
    /// The user dismissed a prompt.
    Cancelled,
    /// A precondition failed and the user was told so.
    Notified { message: String },
    Saved { name: String },
    Restored { name: String, report: RestoreReport },
}

/// Central application struct: one per editor window.
pub struct App {
    host: Arc<dyn EditorHost>,
    ui: Arc<dyn UserInteraction>,
    pub store: GroupStore,
    pub settings_engine: SettingsEngine,
    probe: EditorProbe,
    restorer: RestoreEngine,
    branch: BranchTracker,
    latest_group: Option<String>,
}

impl App {
    /// Creates an App over the given capabilities and loads the stored groups.
    pub fn new(
        host: Arc<dyn EditorHost>,
        ui: Arc<dyn UserInteraction>,
        kv: Arc<dyn KeyValueStore>,
        settings_engine: SettingsEngine,
        probe_config: ProbeConfig,
    ) -> Result<Self, StoreError> {
        let settings = settings_engine.shared();
        let store = GroupStore::new(kv, Arc::clone(&settings))?;
        let probe = EditorProbe::new(Arc::clone(&host), probe_config);
        let restorer = RestoreEngine::new(Arc::clone(&host), settings);

        Ok(Self {
            host,
            ui,
            store,
            settings_engine,
            probe,
            restorer,
            branch: BranchTracker::new(),
            latest_group: None,
        })
    }

    /// Creates an App persisting into `data_dir`: the groups in `tabgroups.db`
    /// under `workspace`, the settings in `settings.json`.
    pub fn open(
        host: Arc<dyn EditorHost>,
        ui: Arc<dyn UserInteraction>,
        data_dir: &Path,
        workspace: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let db = Arc::new(Database::open(data_dir.join("tabgroups.db"))?);
        let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::new(db, workspace));

        let config_path = data_dir.join("settings.json");
        let mut settings_engine = SettingsEngine::new(&config_path.to_string_lossy());
        if let Err(e) = settings_engine.load() {
            warn!("Using default settings: {}", e);
        }

        Ok(Self::new(host, ui, kv, settings_engine, ProbeConfig::default())?)
    }

    pub fn settings(&self) -> ExtensionSettings {
        self.settings_engine.get_settings()
    }

    pub fn latest_group(&self) -> Option<&str> {
        self.latest_group.as_deref()
    }

    pub fn branch_state(&self) -> &BranchState {
        self.branch.state()
    }

    async fn capture(&self) -> Result<Snapshot, CommandError> {
        Ok(self.probe.snapshot().await?)
    }

    async fn notify_info(&self, message: &str) -> CommandOutcome {
        self.ui.show_info(message).await;
        CommandOutcome::Notified {
            message: message.to_string(),
        }
    }

    async fn notify_warning(&self, message: &str) -> CommandOutcome {
        self.ui.show_warning(message).await;
        CommandOutcome::Notified {
            message: message.to_string(),
        }
    }

    /// Asks for a group name; an empty answer picks the default name.
    async fn prompt_name(&self) -> Option<String> {
        let answer = self.ui.input_name(NAME_PROMPT).await?;
        let name = answer.trim();
        if name.is_empty() {
            Some(self.store.new_default_name())
        } else {
            Some(name.to_string())
        }
    }

    async fn pick(&self, placeholder: &str) -> Option<String> {
        self.ui.pick_group(&self.store.list_names(), placeholder).await
    }

    // --- Save / update ---

    /// Save: name the live layout, asking before overwriting.
    pub async fn save(&mut self) -> Result<CommandOutcome, CommandError> {
        let Some(name) = self.prompt_name().await else {
            return Ok(CommandOutcome::Cancelled);
        };
        if self.store.contains(&name) {
            let answer = self.ui.confirm(OVERWRITE_PROMPT).await;
            let confirmed = answer.is_some_and(|a| a.trim().to_lowercase().starts_with('y'));
            if !confirmed {
                return Ok(CommandOutcome::Cancelled);
            }
        }

        let snapshot = self.capture().await?;
        self.store.add(&name, snapshot)?;
        info!("Saved tab group {:?}", name);
        self.latest_group = Some(name.clone());
        Ok(CommandOutcome::Saved { name })
    }

    pub async fn save_and_close_all(&mut self) -> Result<CommandOutcome, CommandError> {
        let outcome = self.save().await?;
        if matches!(outcome, CommandOutcome::Saved { .. }) {
            self.host.close_all().await?;
        }
        Ok(outcome)
    }

    /// Replaces a stored group with the live layout.
    async fn update_group(&mut self, name: &str, create: bool) -> Result<CommandOutcome, CommandError> {
        let snapshot = self.capture().await?;
        if self.store.update(name, snapshot, create)? {
            Ok(CommandOutcome::Saved {
                name: name.to_string(),
            })
        } else {
            Err(StoreError::NotFound(name.to_string()).into())
        }
    }

    pub async fn update(&mut self) -> Result<CommandOutcome, CommandError> {
        if self.store.count() == 0 {
            return Ok(self.notify_info(NO_SAVED_GROUPS).await);
        }
        let Some(name) = self.pick("Which tab group would you like to update?").await else {
            return Ok(CommandOutcome::Cancelled);
        };
        self.latest_group = Some(name.clone());
        self.update_group(&name, false).await
    }

    pub async fn update_last(&mut self) -> Result<CommandOutcome, CommandError> {
        let Some(name) = self.latest_group.clone() else {
            return Ok(self.notify_warning(NO_LAST_GROUP).await);
        };
        self.update_group(&name, false).await
    }

    /// Save button of the sidebar: on a group it updates that group, elsewhere it
    /// saves a new one.
    pub async fn save_from_view(&mut self, group: Option<&str>) -> Result<CommandOutcome, CommandError> {
        match group {
            None => self.save().await,
            Some(name) => {
                self.latest_group = Some(name.to_string());
                self.update_group(name, false).await
            }
        }
    }

    // --- Restore ---

    async fn restore_named(&mut self, name: &str, close_others: bool) -> Result<CommandOutcome, CommandError> {
        let snapshot = self
            .store
            .get(name)
            .map(|g| g.snapshot.clone())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        self.stop_tracking().await?;
        if close_others {
            self.host.close_all().await?;
        }

        let report = self.restorer.restore(&snapshot).await;
        info!(
            "Restored tab group {:?}: {} opened, {} failed",
            name,
            report.opened,
            report.failed.len()
        );
        Ok(CommandOutcome::Restored {
            name: name.to_string(),
            report,
        })
    }

    async fn pick_and_restore(&mut self, close_others: bool) -> Result<CommandOutcome, CommandError> {
        if self.store.count() == 0 {
            return Ok(self.notify_info(NO_SAVED_GROUPS).await);
        }
        let Some(name) = self.pick("Which tab group would you like to restore?").await else {
            return Ok(CommandOutcome::Cancelled);
        };
        self.latest_group = Some(name.clone());
        self.restore_named(&name, close_others).await
    }

    pub async fn restore(&mut self) -> Result<CommandOutcome, CommandError> {
        self.pick_and_restore(false).await
    }

    pub async fn restore_and_close_others(&mut self) -> Result<CommandOutcome, CommandError> {
        self.pick_and_restore(true).await
    }

    /// Restore from the sidebar, following `sidebarRestoreStyle`.
    pub async fn restore_from_view(&mut self, name: &str) -> Result<CommandOutcome, CommandError> {
        let settings = self.settings();
        if settings.sidebar_updates_current() {
            if let Some(current) = self.latest_group.clone().filter(|c| c != name) {
                if self.store.contains(&current) {
                    self.update_group(&current, false).await?;
                }
            }
        }
        self.latest_group = Some(name.to_string());
        self.restore_named(name, settings.sidebar_closes_others()).await
    }

    // --- Rename / delete ---

    async fn rename_group(&mut self, old_name: &str) -> Result<CommandOutcome, CommandError> {
        let Some(new_name) = self.prompt_name().await else {
            return Ok(CommandOutcome::Cancelled);
        };
        if !self.store.rename(old_name, &new_name)? {
            return Err(StoreError::NotFound(old_name.to_string()).into());
        }
        if self.latest_group.as_deref() == Some(old_name) {
            self.latest_group = Some(new_name);
        }
        Ok(CommandOutcome::Done)
    }

    pub async fn rename(&mut self) -> Result<CommandOutcome, CommandError> {
        if self.store.count() == 0 {
            return Ok(self.notify_info(NO_SAVED_GROUPS).await);
        }
        let Some(old_name) = self.pick("Which tab group would you like to rename?").await else {
            return Ok(CommandOutcome::Cancelled);
        };
        self.rename_group(&old_name).await
    }

    pub async fn rename_from_view(&mut self, name: &str) -> Result<CommandOutcome, CommandError> {
        self.latest_group = Some(name.to_string());
        self.rename_group(name).await
    }

    fn delete_group(&mut self, name: &str) -> Result<CommandOutcome, CommandError> {
        if !self.store.remove(name, false)? {
            return Err(StoreError::NotFound(name.to_string()).into());
        }
        if self.latest_group.as_deref() == Some(name) {
            self.latest_group = None;
        }
        Ok(CommandOutcome::Done)
    }

    pub async fn delete(&mut self) -> Result<CommandOutcome, CommandError> {
        if self.store.count() == 0 {
            return Ok(self.notify_info(NO_SAVED_GROUPS).await);
        }
        let Some(name) = self.pick("Which tab group would you like to delete?").await else {
            return Ok(CommandOutcome::Cancelled);
        };
        self.delete_group(&name)
    }

    pub async fn delete_from_view(&mut self, name: &str) -> Result<CommandOutcome, CommandError> {
        self.delete_group(name)
    }

    pub async fn delete_file_from_group(
        &mut self,
        name: &str,
        group_index: u32,
        document_key: &str,
    ) -> Result<CommandOutcome, CommandError> {
        self.latest_group = Some(name.to_string());
        if self.store.remove_tab(name, group_index, document_key)? {
            Ok(CommandOutcome::Done)
        } else {
            Err(StoreError::NotFound(format!("{} in {} split {}", document_key, name, group_index)).into())
        }
    }

    pub async fn delete_split_from_group(
        &mut self,
        name: &str,
        group_index: u32,
    ) -> Result<CommandOutcome, CommandError> {
        self.latest_group = Some(name.to_string());
        if self.store.remove_split(name, group_index)? {
            Ok(CommandOutcome::Done)
        } else {
            Err(StoreError::NotFound(format!("{} split {}", name, group_index)).into())
        }
    }

    // --- Editors ---

    /// Opens one stored tab without touching the rest of the layout.
    pub async fn open_file_from_view(
        &mut self,
        name: &str,
        group_index: u32,
        document_key: &str,
    ) -> Result<CommandOutcome, CommandError> {
        let tab = self
            .store
            .get(name)
            .and_then(|g| {
                g.snapshot
                    .groups
                    .iter()
                    .filter(|group| group.group_index == group_index)
                    .flat_map(|group| group.tabs.iter())
                    .find(|t| t.document_key() == document_key)
            })
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{} in {}", document_key, name)))?;
        self.restorer.open_one(&tab).await?;
        Ok(CommandOutcome::Done)
    }

    pub async fn close_all_editors(&mut self) -> Result<CommandOutcome, CommandError> {
        self.host.close_all().await?;
        Ok(CommandOutcome::Done)
    }

    // --- Undo / tracking ---

    pub async fn undo(&mut self) -> Result<CommandOutcome, CommandError> {
        match self.store.undo()? {
            UndoOutcome::Undone => {
                if self
                    .latest_group
                    .as_deref()
                    .is_some_and(|name| !self.store.contains(name))
                {
                    self.latest_group = None;
                }
                Ok(CommandOutcome::Done)
            }
            UndoOutcome::NothingToUndo => Ok(self.notify_info(NOTHING_TO_UNDO).await),
        }
    }

    /// Starts tracking `name`, or the last used group.
    pub async fn track(&mut self, name: Option<&str>) -> Result<CommandOutcome, CommandError> {
        let Some(name) = name.map(str::to_string).or_else(|| self.latest_group.clone()) else {
            return Ok(self.notify_warning(NO_LAST_GROUP).await);
        };
        if !self.store.contains(&name) {
            return Err(StoreError::NotFound(name).into());
        }
        self.store.track(&name)?;
        info!("Tracking tab group {:?}", name);
        Ok(CommandOutcome::Done)
    }

    /// Stops tracking and writes the live layout into the group that was tracked.
    pub async fn stop_tracking(&mut self) -> Result<CommandOutcome, CommandError> {
        let Some(group) = self.store.track("")? else {
            return Ok(CommandOutcome::Done);
        };
        info!("Stopped tracking tab group {:?}", group.name);
        self.update_group(&group.name, false).await
    }

    /// The editor layout changed: keep the tracked group current.
    pub async fn layout_changed(&mut self) -> Result<CommandOutcome, CommandError> {
        if self.store.tracking_name().is_none() {
            return Ok(CommandOutcome::Done);
        }
        let snapshot = self.capture().await?;
        self.store.refresh_tracked(snapshot)?;
        Ok(CommandOutcome::Done)
    }

    // --- Branches ---

    /// A branch change from the VCS. `None` is a detached HEAD.
    pub async fn branch_changed(&mut self, branch: Option<&str>) -> Result<CommandOutcome, CommandError> {
        let policy = self.settings().git_branch_groups;
        let plan = self.branch.on_branch(branch, policy);
        if plan.is_empty() {
            return Ok(CommandOutcome::Done);
        }
        debug!("Branch plan: {:?}", plan);

        self.stop_tracking().await?;
        if let Some(save) = &plan.save {
            self.update_group(save, true).await?;
        }
        if plan.close_all {
            self.host.close_all().await?;
        }
        match plan.restore {
            Some(name) if self.store.contains(&name) => self.restore_named(&name, false).await,
            Some(name) => {
                debug!("No saved group {:?} to restore", name);
                Ok(CommandOutcome::Done)
            }
            None => Ok(CommandOutcome::Done),
        }
    }

    /// Handles branch changes from a channel until it closes. Each change is
    /// finished before the next is read.
    pub async fn run_branch_events(&mut self, mut events: mpsc::Receiver<Option<String>>) {
        while let Some(branch) = events.recv().await {
            if let Err(e) = self.branch_changed(branch.as_deref()).await {
                warn!("Branch change to {:?} failed: {}", branch, e);
            }
        }
    }

    // --- Settings / lifecycle ---

    /// Updates one setting. A change of `saveGlobally` reloads the groups from
    /// the newly selected storage.
    pub fn set_setting(&mut self, key: &str, value: serde_json::Value) -> Result<(), Box<dyn std::error::Error>> {
        let before = self.settings();
        self.settings_engine.set_value(key, value)?;
        let after = self.settings();

        if before.save_globally != after.save_globally {
            info!("Storage scope is now {}", after.storage_scope().as_str());
            self.store.reload()?;
        }
        if before.git_branch_groups != after.git_branch_groups {
            debug!("Branch groups policy is now {:?}", after.git_branch_groups);
        }
        Ok(())
    }

    /// Shutdown sequence: stop tracking so the tracked group keeps the final layout.
    pub async fn shutdown(&mut self) -> Result<(), CommandError> {
        self.stop_tracking().await?;
        Ok(())
    }
}
